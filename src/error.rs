use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while making an admission decision.
///
/// Store failures are reported verbatim to the caller; nothing in this crate
/// turns them into an allow or deny decision.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store connection is closed")]
    StoreClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

impl ThrottlerError {
    /// True for failures talking to the shared counter store.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            ThrottlerError::Redis(_) | ThrottlerError::Timeout(_) | ThrottlerError::StoreClosed
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn internal() -> Self {
        Self::new("internal_error", "Internal server error", 500)
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        // The client only learns that something failed; details go to the log.
        tracing::error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
    }
}
