use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

use crate::rate_limiter::RateLimiterService;
use crate::response::HealthResponse;

/// Demo endpoint sitting behind the admission middleware.
pub async fn hello() -> &'static str {
    "Hello, Rate Limited World!"
}

/// Health check endpoint; reports 503 when the counter store is unreachable.
pub async fn health_check(State(limiter): State<Arc<RateLimiterService>>) -> impl IntoResponse {
    match limiter.health().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::unhealthy()))
        }
    }
}
