//! # Admin API
//!
//! Operator endpoints. Currently only the metadata hot reload, used after
//! an offline `shard fragment --apply` run.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub artifacts: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/admin/metadata/reload", post(reload_metadata))
}

async fn reload_metadata(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ReloadResponse>, AppError> {
    let artifacts = state.service.reload_metadata().await?;
    tracing::info!(subject = %caller.subject, artifacts, "metadata reloaded via admin API");
    Ok(Json(ReloadResponse { artifacts }))
}
