//! # Middleware Modules
//!
//! Tower middleware layers for the API service.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;

/// Collapse a request path to its route template.
///
/// Used for metric labels and trace spans so artifact keys, filenames
/// and session tokens never become label values or log fields.
pub fn route_label(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    match segments.as_slice() {
        ["", "health", "liveness"] => "/health/liveness",
        ["", "health", "readiness"] => "/health/readiness",
        ["", "metrics"] => "/metrics",
        ["", "v1", "artifacts", _] => "/v1/artifacts/{key}",
        ["", "v1", "artifacts", _, "version"] => "/v1/artifacts/{key}/version",
        ["", "v1", "artifacts", _, "sessions"] => "/v1/artifacts/{key}/sessions",
        ["", "v1", "artifacts", _, "fragments", _] => "/v1/artifacts/{key}/fragments/{filename}",
        ["", "v1", "sessions", ..] => "/v1/sessions/{token}/key",
        ["", "v1", "admin", "metadata", "reload"] => "/v1/admin/metadata/reload",
        _ => "unmatched",
    }
}
