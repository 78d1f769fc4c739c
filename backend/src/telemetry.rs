//! Prometheus metrics
//!
//! The recorder is process-global, so `install_recorder` is called once from
//! `main`; the returned handle lives in `AppState` and renders `/metrics`.

use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const REQUEST_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global Prometheus recorder
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            REQUEST_DURATION_BUCKETS,
        )
        .context("invalid histogram buckets")?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Scrapes and probes are not application traffic
fn is_excluded(path: &str) -> bool {
    path == "/metrics" || path == "/health" || path.starts_with("/health/")
}

/// Record request count, latency and in-flight requests
///
/// The `path` label is the route template, not the raw URI, so ids in paths
/// cannot blow up label cardinality.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    if is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();
    let start = Instant::now();

    metrics::gauge!("http_requests_in_flight").increment(1.0);
    let response = next.run(request).await;
    metrics::gauge!("http_requests_in_flight").decrement(1.0);

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}
