//! # Request/Response Tracing
//!
//! `tower_http::trace::TraceLayer` with spans that carry the route
//! template instead of the raw URI. Raw URIs of the key-redeem route
//! contain session tokens, which must not reach the logs.

use axum::body::Body;
use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::route_label;

pub type HttpTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, fn(&Request<Body>) -> Span>;

pub fn layer() -> HttpTraceLayer {
    TraceLayer::new_for_http().make_span_with(make_span as fn(&Request<Body>) -> Span)
}

fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        route = route_label(request.uri().path()),
    )
}
