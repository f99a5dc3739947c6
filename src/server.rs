use crate::config::Config;
use crate::error::ThrottlerResult;
use crate::handlers::{health_check, hello};
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::rate_limiter::{LimitConfig, RateLimiterService};
use crate::redis::RedisStorage;
use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Build the application router. Everything except `/health` goes through
/// the admission middleware.
pub fn create_app(limiter: Arc<RateLimiterService>) -> Router {
    let protected = Router::new()
        .route("/", get(hello).post(hello))
        .route_layer(middleware::from_fn_with_state(
            limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health_check))
        .with_state(limiter)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    limiter: Arc<RateLimiterService>,
}

impl Server {
    pub async fn new(config: Config) -> ThrottlerResult<Self> {
        let storage = RedisStorage::connect(&config.store_url(), config.window()).await?;
        let limiter = Arc::new(
            RateLimiterService::new(Arc::new(storage), LimitConfig::from(&config))
                .with_timeout(config.store_timeout()),
        );

        Ok(Self {
            app: create_app(limiter.clone()),
            bind_addr: config.bind_addr,
            limiter,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        let limits = self.limiter.limits();
        tracing::info!("Rate limiter listening on {}", self.bind_addr);
        tracing::info!(
            ip_limit = limits.ip_limit,
            token_limit = limits.token_limit,
            block_duration_secs = limits.block_duration.as_secs(),
            "Admission limits"
        );

        // Peer addresses are needed for the IP fallback.
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.limiter.close()?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
