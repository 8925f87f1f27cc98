//! Per-layer error enums (SPEC_FULL §4.N). Each maps to a wire response at
//! the edge; internal layers propagate with `?` and never downcast to a
//! single catch-all error.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// `(status, extra headers, body)` — mirrors this codebase's existing
/// `ApiErr` shape so `Retry-After` and trace-id headers ride alongside the
/// JSON body without a bespoke response type per handler.
pub type ApiError = (StatusCode, HeaderMap, Json<serde_json::Value>);

pub fn err(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, HeaderMap::new(), Json(json!({ "error": msg.into() })))
}

pub fn err_retry_after(status: StatusCode, wait: std::time::Duration, msg: impl Into<String>) -> ApiError {
    let mut headers = HeaderMap::new();
    let secs = wait.as_secs().max(1);
    if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
        headers.insert("Retry-After", v);
    }
    (status, headers, Json(json!({ "error": msg.into() })))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration invalid: {} issue(s)", .0.len())]
    Invalid(Vec<String>),
    #[error("environment variable missing or unparseable: {0}")]
    Env(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("payload too large")]
    TooLarge,
    #[error("invalid json body: {0}")]
    InvalidJson(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("ingest disabled")]
    KillSwitch,
    #[error("dependency failure: {0}")]
    Dependency(#[from] StreamError),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            IngestError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, self.to_string()),
            IngestError::TooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            IngestError::InvalidJson(_) | IngestError::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            IngestError::KillSwitch => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            IngestError::Dependency(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        err(status, msg).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("unexpected stream reply shape: {0}")]
    Shape(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing api key")]
    MissingKey,
    #[error("revoked api key")]
    RevokedKey,
    #[error("invalid api key")]
    InvalidKey,
}

impl AuthError {
    pub fn reason_label(&self) -> &'static str {
        match self {
            AuthError::MissingKey => "missing_key",
            AuthError::RevokedKey => "revoked_key",
            AuthError::InvalidKey => "invalid_key",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        err(StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}
