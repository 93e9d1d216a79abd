#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use webframe::auth::digest::{Digest, DigestConfig};
use webframe::auth::CredentialLookup;
use webframe::content_type::StaticContentTypeRegistry;
use webframe::entity::{Handler, HandlerFn, Method, ResourceTarget, WebApi, WebEntity, WebResource};
use webframe::error::WebApiError;
use webframe::pattern::Pattern;
use webframe::request::RequestDescriptor;
use webframe::router::Router;
use webframe::server;

#[derive(Parser)]
#[command(name = "webframe-demo", about = "Embeddable HTTP application framework demo")]
struct Cli {
    /// Listen address for application routes
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Admin listen address (health/readiness/metrics)
    #[arg(long, default_value = "0.0.0.0:8081")]
    admin_listen: String,

    /// Directory served by the static resource example
    #[arg(long, default_value = "./demos/static")]
    static_dir: PathBuf,

    /// Path to the router config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

/// In-memory username → HA1 (or password) lookup for the digest example.
struct StaticCredentials(HashMap<String, String>);

#[async_trait]
impl CredentialLookup for StaticCredentials {
    async fn lookup(&self, _table: Option<&str>, _projection: Option<&str>, username: &str) -> Option<String> {
        self.0.get(username).cloned()
    }
}

fn echo_handler() -> Arc<dyn Handler> {
    Arc::new(HandlerFn(|request: RequestDescriptor, params: HashMap<String, serde_json::Value>| async move {
        Ok(serde_json::json!({
            "body": {
                "method": request.method,
                "path": request.path,
                "params": params,
            },
        }))
    }))
}

fn items_handler() -> Arc<dyn Handler> {
    Arc::new(HandlerFn(|_request: RequestDescriptor, params: HashMap<String, serde_json::Value>| async move {
        let id = params.get("id").cloned().unwrap_or(serde_json::Value::Null);
        if id == serde_json::Value::Null {
            return Err(WebApiError::not_found("unknown item"));
        }
        Ok(serde_json::json!({ "body": { "id": id } }))
    }))
}

fn build_router(config_path: &std::path::Path, static_dir: PathBuf) -> Result<Router> {
    let config = webframe::config::RouterConfig::load(config_path)?;
    let content_types = Arc::new(StaticContentTypeRegistry::new());
    let mut router = Router::new(config, content_types);

    let echo = WebApi::new(Pattern::new("/echo", true)?)?.on(Method::Get, echo_handler());
    router.register(WebEntity::Api(echo))?;

    let items = WebApi::new(Pattern::new("/items/:id", true)?)?.on(Method::Get, items_handler());
    router.register(WebEntity::Api(items))?;

    let mut credentials = HashMap::new();
    credentials.insert("alice".to_string(), "hunter2".to_string());
    let digest = Digest::new(
        DigestConfig {
            realm: Some("webframe-demo".to_string()),
            ..DigestConfig::default()
        },
        Arc::new(StaticCredentials(credentials)),
    );
    let protected = WebApi::new(Pattern::new("/protected", true)?)?
        .with_auth(Arc::new(digest))
        .on(Method::Get, echo_handler());
    router.register(WebEntity::Api(protected))?;

    let static_files = WebResource::new(
        Pattern::new("/static/*", true)?,
        "text/plain",
        ResourceTarget::FileSystem(static_dir),
    );
    router.register(WebEntity::Resource(static_files))?;

    Ok(router)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    let router = build_router(&cli.config, cli.static_dir)?;

    rt.block_on(server::bootstrap::run(
        router,
        server::bootstrap::BootstrapArgs {
            listen: cli.listen,
            admin_listen: cli.admin_listen,
        },
    ))
}
