//! # Bearer Authentication
//!
//! ```text
//! Bearer {subject}:{secret}   caller identified as {subject}
//! Bearer {secret}             caller identified as "anonymous"
//! ```
//!
//! The secret is compared in constant time. When no token is configured,
//! authentication is disabled and every request runs as `anonymous`.
//! The subject keys rate limiting and is recorded as the requester of
//! issued sessions.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorBody};

pub const ANONYMOUS: &str = "anonymous";
pub const MAX_SUBJECT_LEN: usize = 64;

/// Authenticated caller, injected into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject: String,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self {
            subject: ANONYMOUS.to_string(),
        }
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        // Keep timing independent of the length match.
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn valid_subject(subject: &str) -> bool {
    !subject.is_empty()
        && subject.len() <= MAX_SUBJECT_LEN
        && subject
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'@'))
}

/// Resolve the bearer credential to a caller identity.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    if let Some((subject, secret)) = provided.split_once(':') {
        if constant_time_token_eq(secret, expected_secret) {
            if !valid_subject(subject) {
                return Err("invalid subject in bearer token".into());
            }
            return Ok(CallerIdentity {
                subject: subject.to_string(),
            });
        }
    }
    if constant_time_token_eq(provided, expected_secret) {
        return Ok(CallerIdentity::anonymous());
    }
    Err("invalid bearer token".into())
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    let Some(AuthConfig {
        token: Some(expected),
    }) = config
    else {
        request.extensions_mut().insert(CallerIdentity::anonymous());
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => match parse_bearer_token(provided, &expected) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed");
                    unauthorized_response(&msg)
                }
            },
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("UNAUTHORIZED", message))).into_response()
}
