use serde::{Deserialize, Serialize};

/// How the router normalises a request path's trailing slash before
/// `PatternMap` lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlashPolicy {
    AsIs,
    Add,
    Remove,
}

impl Default for TrailingSlashPolicy {
    fn default() -> Self {
        TrailingSlashPolicy::Remove
    }
}

impl std::str::FromStr for TrailingSlashPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asis" | "as-is" => Ok(TrailingSlashPolicy::AsIs),
            "add" => Ok(TrailingSlashPolicy::Add),
            "remove" => Ok(TrailingSlashPolicy::Remove),
            other => Err(format!("unknown trailing slash policy: '{other}'")),
        }
    }
}

/// Top-level router/server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Normalise the request path before lookup; default `remove`.
    #[serde(default)]
    pub trailing_slash_policy: TrailingSlashPolicy,

    /// Honour `X-HTTP-Method(-Override)` / `X-Method-Override` on `POST`
    /// only; default `false`.
    #[serde(default)]
    pub allows_post_method_override: bool,

    /// Try to JSON-parse each raw query value, falling back to the raw
    /// string and logging a warning on failure; default `true`.
    #[serde(default = "default_parses_query_as_json")]
    pub parses_query_as_json: bool,

    /// Maximum accepted request body size in bytes; default 2 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Address the HTTP front-end binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Address the admin surface (`/health`, `/ready`, `/metrics`) binds to.
    #[serde(default = "default_admin_listen_addr")]
    pub admin_listen_addr: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            trailing_slash_policy: TrailingSlashPolicy::default(),
            allows_post_method_override: false,
            parses_query_as_json: default_parses_query_as_json(),
            max_body_bytes: default_max_body_bytes(),
            listen_addr: default_listen_addr(),
            admin_listen_addr: default_admin_listen_addr(),
        }
    }
}

fn default_parses_query_as_json() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_admin_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}
