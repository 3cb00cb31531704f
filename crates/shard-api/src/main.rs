//! # shard-api: Binary Entry Point
//!
//! Loads configuration from the environment, opens the metadata ledger,
//! installs the Prometheus recorder and serves until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use shard_api::{AppConfig, AppState};
use shard_dist::{DistributionService, MemoryCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("configuration error: {e}");
        e
    })?;
    tracing::info!(?config, "configuration loaded");
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, authentication is disabled");
    }

    let cache = Arc::new(MemoryCache::with_capacity(config.cache_max_bytes));
    let service = DistributionService::open(config.service_config(), cache)
        .await
        .map_err(|e| {
            tracing::error!("failed to open distribution service: {e}");
            e
        })?;

    let port = config.port;
    let mut state = AppState::new(config, service);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => tracing::warn!("metrics recorder not installed: {e}"),
    }

    let app = shard_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("shard API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shard API stopped");
    Ok(())
}

/// `RUST_LOG` filter (default `info`); `SHARD_LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("SHARD_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
