use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Histogram bucket boundaries for response body size (bytes).
const SIZE_BUCKETS: &[f64] = &[
    100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0, 100000.0, 500000.0, 1000000.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full("router_response_size_bytes".to_string()),
                SIZE_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- Describe all metrics (adds HELP / TYPE lines) ---

        describe_counter!(
            "router_requests_total",
            Unit::Count,
            "Total HTTP requests processed, labelled by method and status"
        );
        describe_histogram!(
            "router_request_duration_seconds",
            Unit::Seconds,
            "Request duration from socket accept to response write"
        );
        describe_gauge!(
            "router_requests_in_flight",
            Unit::Count,
            "Number of requests currently being processed"
        );
        describe_histogram!(
            "router_response_size_bytes",
            Unit::Bytes,
            "Response body size in bytes"
        );

        describe_counter!(
            "router_auth_verify_total",
            Unit::Count,
            "Total AuthProtocol.verify invocations, labelled by scheme and outcome"
        );
        describe_counter!(
            "router_not_found_total",
            Unit::Count,
            "Total requests that matched no registered route"
        );
        describe_counter!(
            "router_method_not_allowed_total",
            Unit::Count,
            "Total requests whose method was not supported by the matched entity"
        );

        describe_gauge!(
            "router_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );
        describe_counter!(
            "router_connections_total",
            Unit::Count,
            "Total connections accepted"
        );

        describe_gauge!(
            "router_routes_registered",
            Unit::Count,
            "Number of routes currently registered in the PatternMap"
        );

        describe_histogram!(
            "resource_file_read_duration_seconds",
            Unit::Seconds,
            "Time spent reading a file-backed WebResource from disk"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
