//! # shard-api: Axum Service for Fragmented Artifact Distribution
//!
//! HTTP front of the serving path in `shard-dist`.
//!
//! ## API Surface
//!
//! | Method | Path                                        | Purpose                      |
//! |--------|---------------------------------------------|------------------------------|
//! | GET    | `/health/liveness`                          | process up                   |
//! | GET    | `/health/readiness`                         | metadata loaded, cache up    |
//! | GET    | `/metrics`                                  | Prometheus exposition        |
//! | GET    | `/v1/artifacts/{key}/version`               | version info                 |
//! | GET    | `/v1/artifacts/{key}`                       | whole unfragmented artifact  |
//! | GET    | `/v1/artifacts/{key}/fragments/{filename}`  | verified fragment bytes      |
//! | POST   | `/v1/artifacts/{key}/sessions`              | issue session grant          |
//! | GET    | `/v1/sessions/{token}/key`                  | redeem key bytes             |
//! | POST   | `/v1/admin/metadata/reload`                 | reload ledger from disk      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Health checks and `/metrics` are mounted outside the auth layer.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

pub use error::AppError;
pub use state::{AppConfig, AppState};

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let mut api = Router::new()
        .merge(routes::artifacts::router())
        .merge(routes::sessions::router())
        .merge(routes::admin::router());

    let per_minute = state.config.rate_limit_per_minute;
    if per_minute > 0 {
        api = api
            .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
            .layer(axum::Extension(RateLimiter::new(RateLimitConfig::per_minute(
                per_minute,
            ))));
    }

    let api = api
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics));

    let health = routes::health::router(state.prometheus.is_some());

    Router::new().merge(health).merge(api).with_state(state)
}
