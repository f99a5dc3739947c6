use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use ratelimiter::middleware::RATE_LIMIT_EXCEEDED_MESSAGE;
use ratelimiter::{
    create_app, Identity, InMemoryStorage, LimitConfig, RateLimiterService, Storage,
    ThrottlerError, ThrottlerResult,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn limits(ip_limit: u64, token_limit: u64) -> LimitConfig {
    LimitConfig {
        ip_limit,
        token_limit,
        block_duration: Duration::from_secs(300),
    }
}

fn app_with_memory(ip_limit: u64, token_limit: u64) -> (Router, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new(Duration::from_secs(60)));
    let limiter = RateLimiterService::new(storage.clone(), limits(ip_limit, token_limit));
    (create_app(Arc::new(limiter)), storage)
}

fn post(ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_requests_below_limit_reach_handler() {
    let (app, _) = app_with_memory(3, 10);

    for _ in 0..3 {
        let response = app.clone().oneshot(post("192.168.1.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Hello, Rate Limited World!");
    }
}

#[tokio::test]
async fn test_request_over_limit_gets_429() {
    let (app, _) = app_with_memory(3, 10);

    for _ in 0..3 {
        let response = app.clone().oneshot(post("192.168.1.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(post("192.168.1.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "300");
    assert_eq!(body_string(response).await, RATE_LIMIT_EXCEEDED_MESSAGE);

    // A different client is unaffected.
    let response = app.oneshot(post("192.168.1.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_header_overrides_ip() {
    let (app, storage) = app_with_memory(1, 5);

    for _ in 0..5 {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("x-forwarded-for", "10.1.1.1")
            .header("API_KEY", "abc123")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(storage.count(&Identity::Token("abc123".to_string())), 5);
    assert_eq!(storage.count(&Identity::Ip("10.1.1.1".to_string())), 0);
}

#[tokio::test]
async fn test_peer_address_used_without_forwarded_header() {
    let (app, storage) = app_with_memory(10, 10);

    let addr: SocketAddr = "203.0.113.7:51000".parse().unwrap();
    let mut request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(storage.count(&Identity::Ip("203.0.113.7".to_string())), 1);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let (app, _) = app_with_memory(1, 1);

    for _ in 0..3 {
        let request = Request::builder()
            .uri("/health")
            .header("x-forwarded-for", "192.168.1.1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
    }
}

/// A store that is always unreachable.
struct UnreachableStorage;

#[async_trait]
impl Storage for UnreachableStorage {
    async fn increment(&self, _identity: &Identity) -> ThrottlerResult<u64> {
        Err(ThrottlerError::Timeout(Duration::from_millis(500)))
    }

    async fn is_blocked(&self, _identity: &Identity) -> ThrottlerResult<bool> {
        Err(ThrottlerError::Timeout(Duration::from_millis(500)))
    }

    async fn block(&self, _identity: &Identity, _duration: Duration) -> ThrottlerResult<()> {
        Err(ThrottlerError::Timeout(Duration::from_millis(500)))
    }

    async fn reset(&self, _identity: &Identity) -> ThrottlerResult<()> {
        Err(ThrottlerError::Timeout(Duration::from_millis(500)))
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        Err(ThrottlerError::Timeout(Duration::from_millis(500)))
    }

    fn close(&self) -> ThrottlerResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_closed() {
    let limiter = RateLimiterService::new(Arc::new(UnreachableStorage), limits(10, 10));
    let app = create_app(Arc::new(limiter));

    let response = app.clone().oneshot(post("192.168.1.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"], "internal_error");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
