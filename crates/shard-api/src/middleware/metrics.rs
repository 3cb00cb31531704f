//! # Request Metrics
//!
//! In-process atomic counters for tests and health summaries, plus
//! `shard_http_requests_total` and `shard_http_request_duration_seconds`
//! through the `metrics` facade. The facade is a no-op until the binary
//! installs the Prometheus recorder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::route_label;

#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let api_metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let route = route_label(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    metrics::counter!(
        "shard_http_requests_total",
        "method" => method.clone(),
        "route" => route,
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(
        "shard_http_request_duration_seconds",
        "method" => method,
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());

    if let Some(m) = api_metrics {
        m.request_count.fetch_add(1, Ordering::Relaxed);
        if status.is_client_error() || status.is_server_error() {
            m.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    response
}
