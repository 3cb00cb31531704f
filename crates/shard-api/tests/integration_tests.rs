//! # Integration Tests for shard-api
//!
//! Drives the full router over a data root published by the offline
//! fragmenter: health checks, fragment and artifact delivery, ETag
//! handling, sessions, admin reload, authentication and rate limiting.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use shard_api::{AppConfig, AppState};
use shard_core::{ArtifactKey, ArtifactRecord, FileLayout, MetadataDocument, RunMode, Sha256Digest, Version};
use shard_crypto::decrypt_fragment;
use shard_dist::{DistributionService, MemoryCache};
use shard_pack::{FragmentPlan, Fragmenter};

struct Fixture {
    dir: tempfile::TempDir,
    doc: MetadataDocument,
    data: Vec<u8>,
}

impl Fixture {
    fn layout(&self) -> FileLayout {
        FileLayout::new(self.dir.path())
    }

    fn fragment_names(&self) -> Vec<String> {
        self.doc
            .get(&ArtifactKey::new("modelA").unwrap())
            .unwrap()
            .fragment_names()
    }

    fn write_metadata(&self) {
        std::fs::write(
            self.layout().default_metadata_file(),
            self.doc.to_json_pretty().unwrap(),
        )
        .unwrap();
    }
}

/// Publish `modelA` (fragmented, 10,000 bytes) and `font` (unfragmented).
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let layout = FileLayout::new(dir.path());
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 199) as u8).collect();

    let mut doc = MetadataDocument::new();
    let key = ArtifactKey::new("modelA").unwrap();
    let out = Fragmenter::new(layout.clone(), FragmentPlan::default(), RunMode::Apply)
        .fragment_bytes(&key, "modelA.pt", &data, Version::new(1, 0, 1))
        .unwrap();
    doc.insert(key, out.record);

    std::fs::create_dir_all(layout.full_dir()).unwrap();
    std::fs::write(layout.full_path("font.ttf"), b"glyphs").unwrap();
    doc.insert(
        ArtifactKey::new("font").unwrap(),
        ArtifactRecord {
            version: Version::new(1, 0, 0),
            original_name: "font.ttf".into(),
            sha256: Sha256Digest::of(b"glyphs"),
            is_fragmented: false,
            fragments: vec![],
            filename: Some("font.ttf".into()),
        },
    );

    let fx = Fixture { dir, doc, data };
    fx.write_metadata();
    fx
}

async fn app_with(fx: &Fixture, config: AppConfig) -> axum::Router {
    let config = AppConfig {
        data_root: fx.dir.path().to_path_buf(),
        ..config
    };
    let service = DistributionService::open(config.service_config(), Arc::new(MemoryCache::new()))
        .await
        .unwrap();
    shard_api::app(AppState::new(config, service))
}

/// Helper: build the test app with auth disabled.
async fn test_app(fx: &Fixture) -> axum::Router {
    app_with(fx, AppConfig::default()).await
}

async fn get(app: &axum::Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: &axum::Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// -- Health Checks ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_endpoint() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/health/liveness").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/health/readiness").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ready");
}

#[tokio::test]
async fn test_metrics_not_mounted_without_recorder() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/metrics").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Version Lookup -----------------------------------------------------------

#[tokio::test]
async fn test_version_lookup() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/v1/artifacts/modelA/version").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["key"], "modelA");
    assert_eq!(json["version"], "1.0.1");
    assert_eq!(json["is_fragmented"], true);
    assert_eq!(json["sha256"], Sha256Digest::of(&fx.data).to_hex());
}

#[tokio::test]
async fn test_version_lookup_unknown_is_404() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/v1/artifacts/nope/version").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

// -- Fragment Delivery --------------------------------------------------------

#[tokio::test]
async fn test_fragment_served_with_cache_headers() {
    let fx = fixture();
    let app = test_app(&fx).await;
    let name = &fx.fragment_names()[0];

    let response = get(&app, &format!("/v1/artifacts/modelA/fragments/{name}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"1.0.1\"");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    assert_eq!(response.headers()["x-shard-source"], "disk");
    assert_eq!(body_bytes(response).await, &fx.data[..2500]);

    let again = get(&app, &format!("/v1/artifacts/modelA/fragments/{name}")).await;
    assert_eq!(again.headers()["x-shard-source"], "cache");
}

#[tokio::test]
async fn test_if_none_match_returns_304() {
    let fx = fixture();
    let app = test_app(&fx).await;
    let name = &fx.fragment_names()[1];

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/artifacts/modelA/fragments/{name}"))
                .header(header::IF_NONE_MATCH, "\"1.0.1\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], "\"1.0.1\"");
    assert!(body_bytes(response).await.is_empty());

    let stale = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/artifacts/modelA/fragments/{name}"))
                .header(header::IF_NONE_MATCH, "\"1.0.0\"")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unlisted_fragment_is_404() {
    let fx = fixture();
    let app = test_app(&fx).await;
    for uri in [
        "/v1/artifacts/modelA/fragments/modelA_chunk_ab12cd34.png",
        "/v1/artifacts/modelA/fragments/..%2Fkey%2FmodelA_key.bin",
        "/v1/artifacts/font/fragments/font.ttf",
    ] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_tampered_fragment_is_integrity_error() {
    let fx = fixture();
    let app = test_app(&fx).await;
    let name = &fx.fragment_names()[2];
    let uri = format!("/v1/artifacts/modelA/fragments/{name}");
    assert_eq!(get(&app, &uri).await.status(), StatusCode::OK);

    let path = fx.layout().fragment_path(&ArtifactKey::new("modelA").unwrap(), name);
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "INTEGRITY_ERROR");
    assert!(!json["error"]["message"].as_str().unwrap().contains(name.as_str()));
}

// -- Whole Artifact Delivery --------------------------------------------------

#[tokio::test]
async fn test_unfragmented_artifact_served_whole() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/v1/artifacts/font").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ETAG], "\"1.0.0\"");
    assert_eq!(body_bytes(response).await, b"glyphs");
}

#[tokio::test]
async fn test_fragmented_artifact_not_served_whole() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/v1/artifacts/modelA").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Sessions -----------------------------------------------------------------

#[tokio::test]
async fn test_session_grant_and_key_redeem() {
    let fx = fixture();
    let app = test_app(&fx).await;

    let response = post(&app, "/v1/artifacts/modelA/sessions").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let grant = body_json(response).await;
    assert_eq!(grant["encrypted_fragment_index"], 3);
    assert_eq!(grant["fragment_names"].as_array().unwrap().len(), 4);
    let token = grant["session_token"].as_str().unwrap().to_string();
    assert!(token.starts_with("encryption_key:modelA:anonymous:"));

    let response = get(&app, &format!("/v1/sessions/{token}/key")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let key_bytes = body_bytes(response).await;
    assert_eq!(key_bytes.len(), 32);

    let name = &fx.fragment_names()[3];
    let stored = body_bytes(get(&app, &format!("/v1/artifacts/modelA/fragments/{name}")).await).await;
    let key = shard_crypto::SymmetricKey::from_slice(&key_bytes).unwrap();
    assert_eq!(decrypt_fragment(&key, &stored).unwrap(), &fx.data[7500..]);
}

#[tokio::test]
async fn test_session_for_unfragmented_is_404() {
    let fx = fixture();
    let response = post(&test_app(&fx).await, "/v1/artifacts/font/sessions").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_token_is_404() {
    let fx = fixture();
    let response = get(&test_app(&fx).await, "/v1/sessions/not-a-token/key").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Admin --------------------------------------------------------------------

#[tokio::test]
async fn test_metadata_reload_picks_up_new_artifacts() {
    let mut fx = fixture();
    let app = test_app(&fx).await;
    assert_eq!(
        get(&app, "/v1/artifacts/font2/version").await.status(),
        StatusCode::NOT_FOUND
    );

    let mut record = fx.doc.get(&ArtifactKey::new("font").unwrap()).unwrap().clone();
    record.version = Version::new(2, 0, 0);
    fx.doc.insert(ArtifactKey::new("font2").unwrap(), record);
    fx.write_metadata();

    let response = post(&app, "/v1/admin/metadata/reload").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["artifacts"], 3);
    assert_eq!(
        get(&app, "/v1/artifacts/font2/version").await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_reload_of_corrupt_ledger_is_500_and_keeps_serving() {
    let fx = fixture();
    let app = test_app(&fx).await;
    std::fs::write(fx.layout().default_metadata_file(), b"{ nope").unwrap();

    let response = post(&app, "/v1/admin/metadata/reload").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        get(&app, "/v1/artifacts/font/version").await.status(),
        StatusCode::OK
    );
}

// -- Authentication -----------------------------------------------------------

fn auth_config(token: &str) -> AppConfig {
    AppConfig {
        auth_token: Some(token.to_string()),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_auth_required_for_api_but_not_health() {
    let fx = fixture();
    let app = app_with(&fx, auth_config("s3cret")).await;

    assert_eq!(get(&app, "/health/liveness").await.status(), StatusCode::OK);
    let response = get(&app, "/v1/artifacts/font/version").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_session_records_authenticated_subject() {
    let fx = fixture();
    let app = app_with(&fx, auth_config("s3cret")).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/artifacts/modelA/sessions")
                .header(header::AUTHORIZATION, "Bearer alice:s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let grant = body_json(response).await;
    assert!(grant["session_token"]
        .as_str()
        .unwrap()
        .starts_with("encryption_key:modelA:alice:"));
}

// -- Rate Limiting ------------------------------------------------------------

#[tokio::test]
async fn test_rate_limit_per_subject() {
    let fx = fixture();
    let app = app_with(
        &fx,
        AppConfig {
            rate_limit_per_minute: 2,
            ..AppConfig::default()
        },
    )
    .await;

    for _ in 0..2 {
        assert_eq!(
            get(&app, "/v1/artifacts/font/version").await.status(),
            StatusCode::OK
        );
    }
    let response = get(&app, "/v1/artifacts/font/version").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");

    assert_eq!(get(&app, "/health/liveness").await.status(), StatusCode::OK);
}

async fn get_from(app: &axum::Router, uri: &str, peer: &str) -> Response<Body> {
    let addr: std::net::SocketAddr = peer.parse().unwrap();
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    request.extensions_mut().insert(axum::extract::ConnectInfo(addr));
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_anonymous_rate_limit_is_per_peer() {
    let fx = fixture();
    let app = app_with(
        &fx,
        AppConfig {
            rate_limit_per_minute: 2,
            ..AppConfig::default()
        },
    )
    .await;
    let uri = "/v1/artifacts/font/version";

    for _ in 0..2 {
        assert_eq!(get_from(&app, uri, "10.0.0.1:4000").await.status(), StatusCode::OK);
    }
    assert_eq!(
        get_from(&app, uri, "10.0.0.1:4001").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(get_from(&app, uri, "10.0.0.2:4000").await.status(), StatusCode::OK);
}
