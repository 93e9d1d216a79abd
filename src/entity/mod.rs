//! Endpoint types.
//!
//! `WebApi` dispatches a request by HTTP method to a table of handlers.
//! `WebResource` serves static content with Accept negotiation.
//! Both share an ordered `scheme → AuthProtocol` map via [`AuthProtocols`].

use crate::auth::{AuthProtocol, VerifyResult};
use crate::content_type::{content_type_matches, ContentTypeRegistry};
use crate::error::{RetryAfter, WebApiError};
use crate::headers::HeaderDescriptor;
use crate::pattern::{Extraction, Pattern};
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An ordered `scheme → AuthProtocol` map, shared by
/// `WebApi` and `WebResource` through composition rather than inheritance.
#[derive(Default)]
pub struct AuthProtocols {
    entries: Vec<(String, Arc<dyn AuthProtocol>)>,
}

impl AuthProtocols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration order is preserved.
    pub fn register(&mut self, protocol: Arc<dyn AuthProtocol>) {
        let scheme = protocol.scheme().to_ascii_lowercase();
        self.entries.push((scheme, protocol));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `verify` returns ok when no protocols are registered; otherwise reads
    /// the first `authorization` descriptor, dispatches by scheme, and
    /// reports "no scheme matched" when the header is absent or unknown.
    pub async fn verify(&self, request: &RequestDescriptor) -> VerifyResult {
        if self.entries.is_empty() {
            return VerifyResult::success();
        }
        let Some(header) = request.header("authorization") else {
            return VerifyResult::no_scheme_matched();
        };
        let scheme = header.param("scheme").unwrap_or(&header.value).to_ascii_lowercase();
        match self.entries.iter().find(|(s, _)| *s == scheme) {
            Some((_, protocol)) => protocol.verify(request).await,
            None => VerifyResult::no_scheme_matched(),
        }
    }

    /// Await every registered protocol's challenge in parallel, joined by
    /// `", "` for `WWW-Authenticate`.
    pub async fn get_challenges(&self) -> String {
        let futures = self.entries.iter().map(|(_, p)| p.get_challenge());
        let challenges = futures_util::future::join_all(futures).await;
        challenges
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The challenge of the protocol registered for `scheme`, if any —
    /// used when a `VerifyResult` names the scheme that rejected the
    /// request.
    pub async fn challenge_for(&self, scheme: &str) -> Option<String> {
        let scheme = scheme.to_ascii_lowercase();
        let protocol = self.entries.iter().find(|(s, _)| *s == scheme)?.1.clone();
        Some(protocol.get_challenge().await)
    }
}

// ---------------------------------------------------------------------------
// WebApi
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Methods whose envelope may include request-body content merged into
    /// handler params.
    pub fn carries_body_params(self) -> bool {
        !matches!(self, Method::Get | Method::Head | Method::Delete)
    }
}

/// A user-supplied method handler. `params` is the merged
/// query + path-parameter + (for body-carrying methods) body map. The
/// return value is the raw envelope object — the router performs the
/// status/header/body translation.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(
        &self,
        request: &RequestDescriptor,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, WebApiError>;
}

/// Adapt a plain async closure into a [`Handler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RequestDescriptor, HashMap<String, serde_json::Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, WebApiError>> + Send,
{
    async fn call(
        &self,
        request: &RequestDescriptor,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, WebApiError> {
        (self.0)(request.clone(), params).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("WebApi requires an exact (non-wildcard) path pattern")]
    ApiPatternMustBeExact,
}

/// Method-dispatched endpoint. `supports(method)` is a
/// direct table lookup — a handler either is or isn't registered, with no
/// string-compare "is this the default implementation" trick needed.
pub struct WebApi {
    path: Pattern,
    auth: AuthProtocols,
    handlers: HashMap<Method, Arc<dyn Handler>>,
}

impl WebApi {
    pub fn new(path: Pattern) -> Result<Self, EntityError> {
        if !path.is_exact() {
            return Err(EntityError::ApiPatternMustBeExact);
        }
        Ok(Self {
            path,
            auth: AuthProtocols::new(),
            handlers: HashMap::new(),
        })
    }

    pub fn on(mut self, method: Method, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    pub fn with_auth(mut self, protocol: Arc<dyn AuthProtocol>) -> Self {
        self.auth.register(protocol);
        self
    }

    pub fn path(&self) -> &Pattern {
        &self.path
    }

    pub fn auth(&self) -> &AuthProtocols {
        &self.auth
    }

    pub fn supports(&self, method: Method) -> bool {
        self.handlers.contains_key(&method)
    }

    pub fn handler(&self, method: Method) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(&method)
    }
}

// ---------------------------------------------------------------------------
// WebResource
// ---------------------------------------------------------------------------

pub enum ResourceBody {
    Bytes(Vec<u8>),
    Text(String),
}

/// A non-filesystem content provider, e.g. one backed by a database or an
/// in-memory map.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn get(
        &self,
        extraction: &Extraction,
        content_type: &str,
    ) -> Result<ResourceBody, WebApiError>;
}

pub enum ResourceTarget {
    FileSystem(PathBuf),
    Custom(Arc<dyn ResourceProvider>),
}

/// Static-content endpoint with Accept negotiation.
/// Only `GET` is ever dispatched to it.
pub struct WebResource {
    path: Pattern,
    auth: AuthProtocols,
    default_content_type: String,
    allowed_types: Option<Vec<String>>,
    target: ResourceTarget,
}

impl WebResource {
    pub fn new(path: Pattern, default_content_type: impl Into<String>, target: ResourceTarget) -> Self {
        Self {
            path,
            auth: AuthProtocols::new(),
            default_content_type: default_content_type.into(),
            allowed_types: None,
            target,
        }
    }

    pub fn with_allowed_types(mut self, types: Vec<String>) -> Self {
        self.allowed_types = Some(types);
        self
    }

    pub fn with_auth(mut self, protocol: Arc<dyn AuthProtocol>) -> Self {
        self.auth.register(protocol);
        self
    }

    pub fn path(&self) -> &Pattern {
        &self.path
    }

    pub fn auth(&self) -> &AuthProtocols {
        &self.auth
    }

    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    fn get_allowed_type(
        &self,
        accept_type: &str,
        extension: &str,
        registry: &dyn ContentTypeRegistry,
    ) -> Option<String> {
        let owned;
        let allowed: &[String] = match &self.allowed_types {
            Some(types) => types,
            None => {
                owned = vec![self.default_content_type.clone()];
                &owned
            }
        };
        for candidate in allowed {
            if candidate.contains('*') {
                if let Some(resolved) = registry.resolve_allowed(candidate, extension) {
                    if content_type_matches(accept_type, &resolved) {
                        return Some(resolved);
                    }
                }
            } else if content_type_matches(accept_type, candidate) {
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Accept negotiation: parse each descriptor's `q` (default
    /// 1, clamped to `[0,1]`), sort stably by descending `q`, return the
    /// first type for which `getAllowedType` resolves a concrete type, or
    /// the full rejected list on failure.
    pub fn negotiate(
        &self,
        accept: &[HeaderDescriptor],
        extension: &str,
        registry: &dyn ContentTypeRegistry,
    ) -> Result<String, Vec<String>> {
        if accept.is_empty() {
            return Ok(self.default_content_type.clone());
        }

        let mut weighted: Vec<(f64, &HeaderDescriptor)> = accept
            .iter()
            .map(|d| {
                let q = d
                    .param("q")
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);
                (q, d)
            })
            .collect();
        weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        for (_, desc) in &weighted {
            if let Some(resolved) = self.get_allowed_type(&desc.value, extension, registry) {
                return Ok(resolved);
            }
        }
        Err(weighted.into_iter().map(|(_, d)| d.value.clone()).collect())
    }

    /// Fetch the content for `extraction` (the matched path's wildcard tail
    /// and bound parameters) at the negotiated `content_type`.
    pub async fn get(
        &self,
        extraction: &Extraction,
        content_type: &str,
    ) -> Result<ResourceBody, WebApiError> {
        match &self.target {
            ResourceTarget::FileSystem(root) => read_confined_file(root, &extraction.last).await,
            ResourceTarget::Custom(provider) => provider.get(extraction, content_type).await,
        }
    }
}

/// Confine file reads to `root`: the resolved path must be the
/// root itself or lie strictly under it. Missing or directory → 404 (never
/// 403, so as not to leak directory existence); traversal outside root →
/// 403; resource exhaustion → 503 + `Retry-After: 120`; other OS errors →
/// 400.
async fn read_confined_file(root: &Path, tail: &[String]) -> Result<ResourceBody, WebApiError> {
    let start = std::time::Instant::now();
    let result = read_confined_file_inner(root, tail).await;
    metrics::histogram!("resource_file_read_duration_seconds").record(start.elapsed().as_secs_f64());
    result
}

async fn read_confined_file_inner(root: &Path, tail: &[String]) -> Result<ResourceBody, WebApiError> {
    let mut candidate = root.to_path_buf();
    for segment in tail {
        candidate.push(segment);
    }

    let root_canon = match tokio::fs::canonicalize(root).await {
        Ok(p) => p,
        Err(e) => return Err(os_error_to_status(&e)),
    };
    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WebApiError::not_found("resource not found"))
        }
        Err(e) => return Err(os_error_to_status(&e)),
    };

    if resolved != root_canon && !resolved.starts_with(&root_canon) {
        return Err(WebApiError::forbidden("path escapes resource root"));
    }

    let metadata = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| os_error_to_status(&e))?;
    if metadata.is_dir() {
        return Err(WebApiError::not_found("resource not found"));
    }

    match tokio::fs::read(&resolved).await {
        Ok(bytes) => Ok(ResourceBody::Bytes(bytes)),
        Err(e) => Err(os_error_to_status(&e)),
    }
}

fn os_error_to_status(e: &std::io::Error) -> WebApiError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::NotFound => WebApiError::not_found("resource not found"),
        ErrorKind::PermissionDenied => WebApiError::forbidden("permission denied"),
        _ => {
            if e.raw_os_error() == Some(24) {
                // EMFILE / ENFILE
                WebApiError::service_unavailable(
                    "too many open files",
                    RetryAfter::MillisFromNow(120_000),
                )
            } else {
                WebApiError::bad_request(format!("resource I/O error: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WebEntity
// ---------------------------------------------------------------------------

/// The two endpoint kinds a `PatternMap` stores.
pub enum WebEntity {
    Api(WebApi),
    Resource(WebResource),
}

impl WebEntity {
    pub fn pattern(&self) -> &Pattern {
        match self {
            WebEntity::Api(api) => api.path(),
            WebEntity::Resource(res) => res.path(),
        }
    }

    pub fn auth(&self) -> &AuthProtocols {
        match self {
            WebEntity::Api(api) => api.auth(),
            WebEntity::Resource(res) => res.auth(),
        }
    }

    pub async fn verify(&self, request: &RequestDescriptor) -> VerifyResult {
        self.auth().verify(request).await
    }

    pub async fn get_challenges(&self) -> String {
        self.auth().get_challenges().await
    }

    pub fn supports_method(&self, method: &str) -> bool {
        match self {
            WebEntity::Api(api) => Method::parse(method)
                .map(|m| api.supports(m))
                .unwrap_or(false),
            WebEntity::Resource(_) => method.eq_ignore_ascii_case("GET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webapi_requires_exact_pattern() {
        let p = Pattern::new("/static/*", true).unwrap();
        assert!(matches!(
            WebApi::new(p),
            Err(EntityError::ApiPatternMustBeExact)
        ));
    }

    #[test]
    fn webapi_supports_reflects_registered_handlers_only() {
        struct Noop;
        #[async_trait]
        impl Handler for Noop {
            async fn call(
                &self,
                _r: &RequestDescriptor,
                _p: HashMap<String, serde_json::Value>,
            ) -> Result<serde_json::Value, WebApiError> {
                Ok(serde_json::json!({}))
            }
        }
        let api = WebApi::new(Pattern::new("/x", true).unwrap())
            .unwrap()
            .on(Method::Get, Arc::new(Noop));
        assert!(api.supports(Method::Get));
        assert!(!api.supports(Method::Post));
    }

    #[test]
    fn resource_negotiation_picks_highest_q_acceptable_type() {
        let registry = crate::content_type::StaticContentTypeRegistry::new();
        let resource = WebResource::new(
            Pattern::new("/page", true).unwrap(),
            "text/html",
            ResourceTarget::FileSystem(PathBuf::from("/tmp")),
        );
        let accept = crate::headers::parse_generic("application/pdf;q=0.9, text/html;q=0.5").unwrap();
        let resolved = resource.negotiate(&accept, "html", &registry).unwrap();
        assert_eq!(resolved, "text/html");
    }

    #[test]
    fn resource_negotiation_rejects_when_nothing_acceptable() {
        let registry = crate::content_type::StaticContentTypeRegistry::new();
        let resource = WebResource::new(
            Pattern::new("/page", true).unwrap(),
            "text/html",
            ResourceTarget::FileSystem(PathBuf::from("/tmp")),
        );
        let accept = crate::headers::parse_generic("application/pdf").unwrap();
        let err = resource.negotiate(&accept, "html", &registry).unwrap_err();
        assert_eq!(err, vec!["application/pdf".to_string()]);
    }

    #[tokio::test]
    async fn file_read_confines_to_root() {
        let dir = tempdir("confine");
        std::fs::write(dir.join("hello.txt"), b"hi").unwrap();
        let body = read_confined_file(&dir, &["hello.txt".to_string()])
            .await
            .unwrap();
        match body {
            ResourceBody::Bytes(b) => assert_eq!(b, b"hi"),
            _ => panic!("expected bytes"),
        }

        let err = read_confined_file(&dir, &["..".to_string(), "etc".to_string(), "passwd".to_string()])
            .await
            .unwrap_err();
        assert!(err.status_code() == 403 || err.status_code() == 404);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn directory_reads_as_404_not_403() {
        let dir = tempdir("directory");
        std::fs::create_dir(dir.join("sub")).unwrap();
        let err = read_confined_file(&dir, &["sub".to_string()]).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir(label: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut dir = std::env::temp_dir();
        dir.push(format!("webframe-entity-test-{label}-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
