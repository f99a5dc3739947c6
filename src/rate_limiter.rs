use crate::config::Config;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::identity::Identity;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// Per-scope ceilings, fixed when the service is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub ip_limit: u64,
    pub token_limit: u64,
    pub block_duration: Duration,
}

impl From<&Config> for LimitConfig {
    fn from(config: &Config) -> Self {
        Self {
            ip_limit: config.ip_rate_limit,
            token_limit: config.token_rate_limit,
            block_duration: config.block_duration(),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub allowed: bool,
    /// Counter value after this request, or `limit + 1` while blocked.
    pub current_count: u64,
    pub limit: u64,
    pub key: Identity,
}

impl RateLimitInfo {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current_count)
    }
}

/// Fixed-window admission control over a shared [`Storage`].
///
/// The service keeps no per-identity state of its own; every instance pointed
/// at the same store makes the same decisions.
pub struct RateLimiterService {
    storage: Arc<dyn Storage>,
    limits: LimitConfig,
    timeout: Option<Duration>,
}

impl RateLimiterService {
    pub fn new(storage: Arc<dyn Storage>, limits: LimitConfig) -> Self {
        Self {
            storage,
            limits,
            timeout: None,
        }
    }

    /// Bound every `allow` call. An elapsed deadline is reported as
    /// [`ThrottlerError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    /// Decide whether a request from `ip`, optionally carrying `token`, may
    /// proceed. Store errors are returned as-is, never guessed into a
    /// decision.
    pub async fn allow(&self, ip: &str, token: &str) -> ThrottlerResult<RateLimitInfo> {
        let identity = Identity::resolve(ip, token);
        let limit = self.limit_for(&identity);

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.check_limit(identity, limit))
                .await
                .map_err(|_| ThrottlerError::Timeout(timeout))?,
            None => self.check_limit(identity, limit).await,
        }
    }

    fn limit_for(&self, identity: &Identity) -> u64 {
        match identity {
            Identity::Ip(_) => self.limits.ip_limit,
            Identity::Token(_) => self.limits.token_limit,
        }
    }

    // IsBlocked and Increment are separate store calls; a burst racing the
    // block trigger can be admitted past the limit.
    async fn check_limit(&self, identity: Identity, limit: u64) -> ThrottlerResult<RateLimitInfo> {
        if self.storage.is_blocked(&identity).await? {
            return Ok(RateLimitInfo {
                allowed: false,
                current_count: limit.saturating_add(1),
                limit,
                key: identity,
            });
        }

        let count = self.storage.increment(&identity).await?;
        let allowed = count <= limit;

        if !allowed {
            tracing::debug!(identity = %identity, count, limit, "Limit exceeded, blocking");
            self.storage
                .block(&identity, self.limits.block_duration)
                .await?;
        }

        Ok(RateLimitInfo {
            allowed,
            current_count: count,
            limit,
            key: identity,
        })
    }

    /// Clear the counter for an identity.
    pub async fn reset(&self, identity: &Identity) -> ThrottlerResult<()> {
        self.storage.reset(identity).await
    }

    pub async fn health(&self) -> ThrottlerResult<()> {
        self.storage.ping().await
    }

    pub fn close(&self) -> ThrottlerResult<()> {
        self.storage.close()
    }
}
