//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, route, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `api_calls_total` (counter): greeting calls by outcome
//! - runtime catalogue gauges/counters, see `runtime.rs`
//!
//! # Design Decisions
//! - One Prometheus recorder per process, rendered on `/metrics` (pull)
//! - Without an installed recorder every macro is a no-op, so the lifecycle
//!   core never depends on this module

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::http::response::Abandoned;
use crate::observability::identity::ServiceIdentity;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder, labelled with `identity`.
///
/// Only the first call installs anything; later calls return the same handle
/// and their identity is ignored.
pub fn install_recorder(identity: &ServiceIdentity) -> PrometheusHandle {
    RECORDER
        .get_or_init(|| {
            let builder = identity
                .labels()
                .into_iter()
                .fold(PrometheusBuilder::new(), |builder, (key, value)| {
                    builder.add_global_label(key, value)
                });
            let recorder = builder.build_recorder();
            let handle = recorder.handle();

            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("Metrics recorder already installed elsewhere");
            } else {
                describe_http_metrics();
                tracing::info!(instance_id = %identity.instance_id, "Prometheus recorder installed");
            }
            handle
        })
        .clone()
}

fn describe_http_metrics() {
    metrics::describe_counter!("http_requests_total", "HTTP requests served.");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request latency."
    );
    metrics::describe_counter!("api_calls_total", "Number of API calls.");
}

/// Record a finished request.
pub fn record_request(method: &str, route: &str, status: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Middleware recording count and latency for every routed request.
///
/// Abandoned requests are recorded with status `canceled`, since the client
/// never receives the placeholder response.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = if response.extensions().get::<Abandoned>().is_some() {
        "canceled".to_string()
    } else {
        response.status().as_u16().to_string()
    };
    record_request(&method, &route, &status, start);
    response
}
