pub mod config;
pub mod config_validator;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod rate_limiter;
pub mod redis;
pub mod response;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{ThrottlerError, ThrottlerResult};
pub use identity::Identity;
pub use rate_limiter::{LimitConfig, RateLimitInfo, RateLimiterService};
pub use server::create_app;
pub use storage::{InMemoryStorage, Storage};
