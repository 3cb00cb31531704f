//! # Artifact Delivery API
//!
//! Version lookup, whole-artifact delivery for unfragmented records, and
//! fragment delivery. Served bytes are immutable per version, so responses
//! carry `ETag: "<version>"` with a year-long immutable cache directive and
//! honor `If-None-Match`.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use shard_core::Version;
use shard_dist::{ServedBlob, VersionInfo};

use crate::error::AppError;
use crate::state::AppState;

pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/artifacts/{key}", get(get_artifact))
        .route("/v1/artifacts/{key}/version", get(get_version))
        .route("/v1/artifacts/{key}/fragments/{filename}", get(get_fragment))
}

async fn get_version(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<VersionInfo>, AppError> {
    Ok(Json(state.service.distributor().artifact_version(&key)?))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let dist = state.service.distributor();
    let info = dist.artifact_version(&key)?;
    if !info.is_fragmented && etag_matches(&headers, &info.version) {
        return Ok(not_modified(&info.version));
    }
    let blob = dist.fetch_artifact(&key).await?;
    Ok(blob_response(blob))
}

async fn get_fragment(
    State(state): State<AppState>,
    Path((key, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let dist = state.service.distributor();
    let version = dist.fragment_version(&key, &filename)?;
    if etag_matches(&headers, &version) {
        return Ok(not_modified(&version));
    }
    let blob = dist.fetch_fragment(&key, &filename).await?;
    Ok(blob_response(blob))
}

fn etag(version: &Version) -> String {
    format!("\"{version}\"")
}

/// Whether `If-None-Match` names the current version (or `*`).
fn etag_matches(headers: &HeaderMap, version: &Version) -> bool {
    let current = etag(version);
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == current)
}

fn cache_headers(version: &Version) -> [(header::HeaderName, String); 2] {
    [
        (header::ETAG, etag(version)),
        (header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL.to_string()),
    ]
}

fn not_modified(version: &Version) -> Response {
    (StatusCode::NOT_MODIFIED, cache_headers(version)).into_response()
}

fn blob_response(blob: ServedBlob) -> Response {
    let mut response = (StatusCode::OK, cache_headers(&blob.version), blob.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(source) = HeaderValue::from_str(blob.source.as_str()) {
        headers.insert("x-shard-source", source);
    }
    response
}
