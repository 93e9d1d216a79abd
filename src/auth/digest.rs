//! RFC 7616 Digest authentication — the one concrete `AuthProtocol` the
//! core ships.

use super::{AuthProtocol, CredentialLookup, VerifyResult};
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use base64::Engine;
use md5::{Digest as _, Md5};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// `qop` values a Digest challenge may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qop {
    Auth,
    AuthInt,
    Both,
}

impl Qop {
    fn wire(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::Both => "auth,auth-int",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha256,
}

impl Algorithm {
    fn wire(self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Sha256 => "SHA-256",
        }
    }

    fn hash_hex(self, input: &str) -> String {
        match self {
            Algorithm::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(input.as_bytes());
                hex(&hasher.finalize())
            }
            Algorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(input.as_bytes());
                hex(&hasher.finalize())
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constructor parameters.
pub struct DigestConfig {
    pub qop: Qop,
    pub secret_data: Vec<u8>,
    pub realm: Option<String>,
    pub domain: Option<String>,
    pub algorithm: Algorithm,
    pub opaque_length: usize,
    pub credentials_table_name: Option<String>,
    pub credentials_projection: Option<String>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            qop: Qop::Auth,
            secret_data: Vec::new(),
            realm: None,
            domain: None,
            algorithm: Algorithm::Md5,
            opaque_length: 32,
            credentials_table_name: None,
            credentials_projection: None,
        }
    }
}

pub struct Digest {
    qop: Qop,
    secret_data: Vec<u8>,
    realm: Option<String>,
    domain: Option<String>,
    algorithm: Algorithm,
    opaque: String,
    credentials_table_name: Option<String>,
    credentials_projection: Option<String>,
    credentials: Arc<dyn CredentialLookup>,
}

impl Digest {
    pub fn new(config: DigestConfig, credentials: Arc<dyn CredentialLookup>) -> Self {
        let mut opaque_bytes = vec![0u8; config.opaque_length];
        rand::thread_rng().fill_bytes(&mut opaque_bytes);
        let opaque = base64::engine::general_purpose::STANDARD.encode(&opaque_bytes);

        Self {
            qop: config.qop,
            secret_data: config.secret_data,
            realm: config.realm,
            domain: config.domain,
            algorithm: config.algorithm,
            opaque,
            credentials_table_name: config.credentials_table_name,
            credentials_projection: config.credentials_projection,
            credentials,
        }
    }

    /// `base64(H(now_ms ":" secretData))`, recomputed per challenge so no
    /// shared mutable hash state is needed across calls.
    fn make_nonce(&self) -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let material = format!("{now_ms}:{}", String::from_utf8_lossy(&self.secret_data));
        let digest = self.algorithm.hash_hex(&material);
        base64::engine::general_purpose::STANDARD.encode(digest.as_bytes())
    }
}

#[async_trait]
impl AuthProtocol for Digest {
    fn scheme(&self) -> &str {
        "Digest"
    }

    async fn get_challenge(&self) -> String {
        let nonce = self.make_nonce();
        let mut members = Vec::new();
        if let Some(realm) = &self.realm {
            members.push(format!(r#"realm="{realm}""#));
        }
        if let Some(domain) = &self.domain {
            members.push(format!(r#"domain="{domain}""#));
        }
        members.push(format!(r#"nonce="{nonce}""#));
        members.push(format!(r#"opaque="{}""#, self.opaque));
        members.push(format!("algorithm={}", self.algorithm.wire()));
        members.push(format!(r#"qop="{}""#, self.qop.wire()));
        format!("Digest {}", members.join(", "))
    }

    async fn verify(&self, request: &RequestDescriptor) -> VerifyResult {
        let Some(header) = request.header("authorization") else {
            return VerifyResult::failed("Digest");
        };
        if header.param("scheme") != Some("digest") {
            return VerifyResult::no_scheme_matched();
        }

        let get = |name: &str| header.param(name).map(str::to_string);
        let (Some(username), Some(realm), Some(nonce), Some(uri), Some(response)) =
            (get("username"), get("realm"), get("nonce"), get("uri"), get("response"))
        else {
            return VerifyResult::failed("Digest");
        };
        let nc = get("nc").unwrap_or_default();
        let cnonce = get("cnonce").unwrap_or_default();
        let qop = get("qop").unwrap_or_default();

        let Some(password) = self
            .credentials
            .lookup(
                self.credentials_table_name.as_deref(),
                self.credentials_projection.as_deref(),
                &username,
            )
            .await
        else {
            return VerifyResult::failed("Digest");
        };

        let ha1 = self
            .algorithm
            .hash_hex(&format!("{username}:{realm}:{password}"));
        let ha2 = self.algorithm.hash_hex(&format!("{}:{uri}", request.method));
        let expected = self
            .algorithm
            .hash_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

        VerifyResult {
            ok: expected == response,
            scheme: Some("Digest".to_string()),
            status: None,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Body;
    use std::collections::HashMap;

    struct StaticCredentials(HashMap<String, String>);

    #[async_trait]
    impl CredentialLookup for StaticCredentials {
        async fn lookup(&self, _table: Option<&str>, _proj: Option<&str>, username: &str) -> Option<String> {
            self.0.get(username).cloned()
        }
    }

    fn descriptor_with_auth(header: &str) -> RequestDescriptor {
        let headers = crate::headers::parse_header("authorization", header).unwrap();
        let mut map = HashMap::new();
        map.insert("authorization".to_string(), headers);
        RequestDescriptor {
            method: "GET".to_string(),
            path: "/secret".to_string(),
            headers: map,
            query: HashMap::new(),
            body: Body::Empty,
        }
    }

    fn digest_with_password(username: &str, password: &str) -> Digest {
        let mut creds = HashMap::new();
        creds.insert(username.to_string(), password.to_string());
        Digest::new(
            DigestConfig {
                secret_data: b"server-secret".to_vec(),
                realm: Some("test@realm".to_string()),
                ..Default::default()
            },
            Arc::new(StaticCredentials(creds)),
        )
    }

    #[tokio::test]
    async fn challenge_quotes_exactly_the_expected_members() {
        let digest = digest_with_password("alice", "hunter2");
        let challenge = digest.get_challenge().await;
        assert!(challenge.starts_with("Digest "));
        assert!(challenge.contains(r#"realm="test@realm""#));
        assert!(challenge.contains("nonce=\""));
        assert!(challenge.contains("opaque=\""));
        assert!(challenge.contains("algorithm=MD5"));
        assert!(challenge.contains(r#"qop="auth""#));
    }

    #[tokio::test]
    async fn verify_succeeds_with_correctly_computed_response() {
        let digest = digest_with_password("alice", "hunter2");
        let realm = "test@realm";
        let nonce = "abc123";
        let uri = "/secret";
        let nc = "00000001";
        let cnonce = "xyz";
        let qop = "auth";

        let ha1 = Algorithm::Md5.hash_hex(&format!("alice:{realm}:hunter2"));
        let ha2 = Algorithm::Md5.hash_hex(&format!("GET:{uri}"));
        let response = Algorithm::Md5.hash_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

        let header = format!(
            r#"Digest username="alice", realm="{realm}", nonce="{nonce}", uri="{uri}", qop={qop}, nc={nc}, cnonce="{cnonce}", response="{response}""#
        );
        let request = descriptor_with_auth(&header);
        let result = digest.verify(&request).await;
        assert!(result.ok);
        assert_eq!(result.scheme.as_deref(), Some("Digest"));
    }

    #[tokio::test]
    async fn verify_fails_with_wrong_response() {
        let digest = digest_with_password("alice", "hunter2");
        let header = r#"Digest username="alice", realm="test@realm", nonce="n", uri="/secret", qop=auth, nc=00000001, cnonce="c", response="deadbeef""#;
        let request = descriptor_with_auth(header);
        let result = digest.verify(&request).await;
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn verify_fails_for_unknown_user_without_panicking() {
        let digest = digest_with_password("alice", "hunter2");
        let header = r#"Digest username="mallory", realm="test@realm", nonce="n", uri="/secret", qop=auth, nc=1, cnonce="c", response="x""#;
        let request = descriptor_with_auth(header);
        let result = digest.verify(&request).await;
        assert!(!result.ok);
        assert_eq!(result.scheme.as_deref(), Some("Digest"));
    }

    #[tokio::test]
    async fn verify_declares_no_scheme_matched_for_different_scheme() {
        let digest = digest_with_password("alice", "hunter2");
        let request = descriptor_with_auth("Basic QWxhZGRpbjpvcGVuc2VzYW1l");
        let result = digest.verify(&request).await;
        assert!(!result.ok);
        assert!(result.scheme.is_none());
    }
}
