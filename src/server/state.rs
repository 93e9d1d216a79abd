use crate::metrics::Metrics;
use crate::router::Router;
use std::sync::Arc;

/// Shared server state, cheaply cloneable. `router` is constructed once at
/// application setup and treated as immutable thereafter.
#[derive(Clone)]
pub struct ServerState {
    pub router: Arc<Router>,
    pub metrics: Metrics,
}

impl ServerState {
    pub fn new(router: Router) -> Self {
        let metrics = Metrics::install();
        Self {
            router: Arc::new(router),
            metrics,
        }
    }
}
