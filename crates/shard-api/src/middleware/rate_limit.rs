//! # Per-Caller Rate Limiting
//!
//! Fixed-window limiter. Runs after [`crate::auth::auth_middleware`]:
//!
//! - a named caller is limited by subject (`subject:<name>`);
//! - an anonymous caller is limited by peer IP (`peer:<ip>`), taken from
//!   `ConnectInfo<SocketAddr>`;
//! - an anonymous caller with no known peer falls into one shared bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::auth::{CallerIdentity, ANONYMOUS};
use crate::error::ErrorBody;

/// Above this many buckets, expired ones are swept on the next check.
const MAX_TRACKED_CALLERS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60)
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request against `key`; false once the window is full.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        if buckets.len() > MAX_TRACKED_CALLERS {
            let window = self.config.window;
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });
        if now.duration_since(bucket.window_start) >= self.config.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

/// Bucket a request is counted against.
fn bucket_key(request: &Request) -> String {
    let subject = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|c| c.subject.as_str())
        .unwrap_or(ANONYMOUS);
    if subject != ANONYMOUS {
        return format!("subject:{subject}");
    }
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(peer)) => format!("peer:{}", peer.ip()),
        None => ANONYMOUS.to_string(),
    }
}

pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let bucket = bucket_key(&request);
        if !limiter.check(&bucket) {
            tracing::warn!(bucket = %bucket, "rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new("RATE_LIMITED", "rate limit exceeded")),
            )
                .into_response();
        }
    }

    next.run(request).await
}
