use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Shared counter store address, either `host:port` or a `redis://` URL
    #[envconfig(from = "REDIS_URL", default = "localhost:6379")]
    pub redis_url: String,

    /// Requests allowed per window for clients identified by IP
    #[envconfig(from = "IP_RATE_LIMIT", default = "10")]
    pub ip_rate_limit: u64,

    /// Requests allowed per window for clients sending an API token
    #[envconfig(from = "TOKEN_RATE_LIMIT", default = "100")]
    pub token_rate_limit: u64,

    /// How long an identity stays blocked after exceeding its limit, in seconds
    #[envconfig(from = "BLOCK_DURATION", default = "300")]
    pub block_duration_secs: u64,

    /// Length of one counting window in milliseconds
    #[envconfig(from = "RATE_LIMIT_WINDOW_MS", default = "1000")]
    pub window_ms: u64,

    /// Deadline for a single admission check against the store, in milliseconds
    #[envconfig(from = "STORE_TIMEOUT_MS", default = "500")]
    pub store_timeout_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Store address as a connection URL. A bare `host:port` gets the
    /// `redis://` scheme.
    pub fn store_url(&self) -> String {
        normalize_store_url(&self.redis_url)
    }
}

pub fn normalize_store_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}
