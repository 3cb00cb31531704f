//! # Health Checks and Metrics Scrape
//!
//! Mounted outside the auth layer.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(metrics_enabled: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));
    if metrics_enabled {
        router.route("/metrics", get(prometheus_metrics))
    } else {
        router
    }
}

async fn liveness() -> &'static str {
    "ok"
}

/// Ready once metadata is loaded and the cache answers a ping.
async fn readiness(State(state): State<AppState>) -> Result<&'static str, AppError> {
    let report = state.service.readiness().await;
    match report.cache {
        Ok(()) => Ok("ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            Err(AppError::service_unavailable("cache unreachable"))
        }
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => AppError::service_unavailable("metrics recorder not installed").into_response(),
    }
}
