//! # Session API
//!
//! `POST /v1/artifacts/{key}/sessions` issues a session for a fragmented
//! artifact; `GET /v1/sessions/{token}/key` redeems it for the raw 32-byte
//! key. Key responses are never cacheable.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use shard_dist::SessionGrant;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/artifacts/{key}/sessions", post(issue_session))
        .route("/v1/sessions/{token}/key", get(redeem_key))
}

async fn issue_session(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<SessionGrant>), AppError> {
    let grant = state.service.broker().issue(&key, &caller.subject).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

async fn redeem_key(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let key = state.service.broker().redeem(&token).await?;
    let mut response = key.as_bytes().to_vec().into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}
