use crate::rate_limiter::RateLimiterService;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Header carrying the client's API token.
pub const API_KEY_HEADER: &str = "API_KEY";

pub const RATE_LIMIT_EXCEEDED_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Admission middleware: counts the request against its identity and
/// rejects it with 429 once the identity is over its limit.
///
/// Any store failure rejects the request with 500.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterService>>,
    request: Request,
    next: Next,
) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    let ip = get_client_ip(request.headers(), remote_addr.as_deref());
    let token = get_api_token(request.headers());

    let info = match limiter.allow(&ip, &token).await {
        Ok(info) => info,
        Err(err) => {
            error!(
                target: "ratelimiter::middleware",
                error = %err,
                store_error = err.is_store_error(),
                client_ip = %ip,
                "Rate limit check failed"
            );
            return err.into_response();
        }
    };

    info!(
        target: "ratelimiter::middleware",
        limit_type = info.key.kind(),
        identifier = info.key.value(),
        count = info.current_count,
        limit = info.limit,
        remaining = info.remaining(),
        allowed = info.allowed,
        "Rate limit decision"
    );

    if !info.allowed {
        warn!(
            target: "ratelimiter::middleware",
            limit_type = info.key.kind(),
            identifier = info.key.value(),
            "Rate limit exceeded"
        );
        let retry_after = limiter.limits().block_duration.as_secs();
        return too_many_requests(info.limit, retry_after);
    }

    next.run(request).await
}

fn too_many_requests(limit: u64, retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("x-ratelimit-limit", limit.to_string()),
            ("x-ratelimit-remaining", "0".to_string()),
            ("retry-after", retry_after.to_string()),
        ],
        RATE_LIMIT_EXCEEDED_MESSAGE,
    )
        .into_response()
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();

    info!(
        target: "ratelimiter::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "ratelimiter::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

/// Client IP: first `X-Forwarded-For` entry, else the peer address without
/// its port.
pub fn get_client_ip(headers: &HeaderMap, remote_addr: Option<&str>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    remote_addr
        .map(strip_port)
        .unwrap_or_else(|| "unknown".to_string())
}

/// `1.2.3.4:5678` -> `1.2.3.4`, `[::1]:8080` -> `::1`.
pub fn strip_port(addr: &str) -> String {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest).to_string();
    }
    match addr.rfind(':') {
        // A bare IPv6 address has colons but no port to strip.
        Some(idx) if addr.matches(':').count() == 1 => addr[..idx].to_string(),
        _ => addr.to_string(),
    }
}

/// API token from the `API_KEY` header; blank counts as absent.
pub fn get_api_token(headers: &HeaderMap) -> String {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}
