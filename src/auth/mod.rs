//! Pluggable authentication schemes.
//!
//! `AuthProtocol` is the capability every [`crate::entity::WebEntity`]
//! registers zero or more of, keyed by scheme name. `Digest` is the one
//! concrete scheme the core ships; credential storage is delegated to a
//! caller-supplied [`CredentialLookup`].

pub mod digest;

use crate::request::RequestDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;

pub use digest::Digest;

/// A scalar reason value carried in a [`VerifyResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl std::fmt::Display for ReasonValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonValue::Str(s) => write!(f, "{s}"),
            ReasonValue::Int(i) => write!(f, "{i}"),
            ReasonValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The structured outcome of authentication.
///
/// `ok=false` with `scheme=None` means "no scheme matched this request" —
/// the router responds with the union of every registered protocol's
/// challenge. `ok=false` with `scheme=Some(_)` means a specific protocol
/// rejected the attempt; the router starts from that protocol's own
/// challenge and appends `reason` as extra auth-params.
#[derive(Debug, Clone, Default)]
pub struct VerifyResult {
    pub ok: bool,
    pub scheme: Option<String>,
    pub status: Option<u16>,
    pub reason: Option<HashMap<String, ReasonValue>>,
}

impl VerifyResult {
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn no_scheme_matched() -> Self {
        Self::default()
    }

    pub fn failed(scheme: impl Into<String>) -> Self {
        Self {
            ok: false,
            scheme: Some(scheme.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_reason(mut self, key: impl Into<String>, value: ReasonValue) -> Self {
        self.reason
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Capability for an authentication scheme.
#[async_trait]
pub trait AuthProtocol: Send + Sync {
    /// The scheme name this protocol handles, e.g. `"Digest"`.
    fn scheme(&self) -> &str;

    /// Verify `request`'s credentials for this scheme.
    async fn verify(&self, request: &RequestDescriptor) -> VerifyResult;

    /// The `WWW-Authenticate` challenge value for this scheme (no leading
    /// scheme name is stripped — callers use it as-is).
    async fn get_challenge(&self) -> String;
}

/// External credential storage capability: the
/// core only consumes this trait, it never implements a backend.
#[async_trait]
pub trait CredentialLookup: Send + Sync {
    /// Fetch the stored secret (e.g. a password or HA1) for `username`,
    /// optionally scoped to a table/projection the concrete implementation
    /// defines the meaning of.
    async fn lookup(
        &self,
        table: Option<&str>,
        projection: Option<&str>,
        username: &str,
    ) -> Option<String>;
}
