pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl RouterConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used — allowing the server to start with zero configuration for
    /// local development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: RouterConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            RouterConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded router configuration");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEBFRAME_TRAILING_SLASH_POLICY") {
            match v.parse() {
                Ok(policy) => self.trailing_slash_policy = policy,
                Err(e) => tracing::warn!("ignoring WEBFRAME_TRAILING_SLASH_POLICY: {e}"),
            }
        }
        if let Ok(v) = std::env::var("WEBFRAME_ALLOWS_POST_METHOD_OVERRIDE") {
            self.allows_post_method_override = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("WEBFRAME_PARSES_QUERY_AS_JSON") {
            self.parses_query_as_json = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("WEBFRAME_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse::<usize>() {
                self.max_body_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("WEBFRAME_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("WEBFRAME_ADMIN_LISTEN_ADDR") {
            self.admin_listen_addr = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than zero");
        }
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("listen_addr '{}' is not a valid socket address", self.listen_addr);
        }
        if self
            .admin_listen_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            anyhow::bail!(
                "admin_listen_addr '{}' is not a valid socket address",
                self.admin_listen_addr
            );
        }
        Ok(())
    }
}
