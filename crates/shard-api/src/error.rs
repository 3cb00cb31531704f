//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps `ShardError` kinds to HTTP status codes and returns a JSON body
//! with a machine-readable code. Server-side failure details are logged,
//! never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shard_core::{ErrorKind, ShardError};
use thiserror::Error;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "INTEGRITY_ERROR").
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown artifact, unlisted fragment, missing file or key (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Stored bytes failed verification (500). Logged, not returned.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A dependency is not ready (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Anything else (500). Logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Integrity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Integrity(_) => {
                tracing::error!(error = %self, "integrity failure");
                "stored data failed integrity verification".to_string()
            }
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}

impl From<ShardError> for AppError {
    fn from(err: ShardError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(err.message().to_string()),
            ErrorKind::Integrity => Self::Integrity(err.to_string()),
            ErrorKind::Fragmentation
            | ErrorKind::Encryption
            | ErrorKind::Metadata
            | ErrorKind::Backup
            | ErrorKind::Version => Self::Internal(err.to_string()),
        }
    }
}
