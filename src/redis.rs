use crate::error::{ThrottlerError, ThrottlerResult};
use crate::identity::Identity;
use crate::storage::Storage;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Mutex;
use std::time::Duration;

pub const COUNTER_PREFIX: &str = "rate_limit:counter:";
pub const BLOCKED_PREFIX: &str = "rate_limit:blocked:";

pub fn counter_key(identity: &Identity) -> String {
    format!("{}{}", COUNTER_PREFIX, identity)
}

pub fn blocked_key(identity: &Identity) -> String {
    format!("{}{}", BLOCKED_PREFIX, identity)
}

/// Storage adapter backed by Redis.
///
/// Counters live under `rate_limit:counter:<identity>` and expire one window
/// after creation. Block entries live under `rate_limit:blocked:<identity>`.
pub struct RedisStorage {
    window: Duration,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisStorage {
    /// Connect to the store at `redis_url`. Counters created through this
    /// adapter expire after `window`.
    pub async fn connect(redis_url: &str, window: Duration) -> ThrottlerResult<Self> {
        let client = Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;

        tracing::info!(redis_url = %redis_url, window_ms = window.as_millis() as u64, "Connected to Redis");

        Ok(Self {
            window,
            connection: Mutex::new(Some(manager)),
        })
    }

    // ConnectionManager is a cheap handle; the lock is only held to clone it.
    fn connection(&self) -> ThrottlerResult<ConnectionManager> {
        let guard = self.connection.lock().map_err(|_| {
            ThrottlerError::Internal("Failed to acquire connection lock".into())
        })?;
        guard.clone().ok_or(ThrottlerError::StoreClosed)
    }
}

fn millis(duration: Duration) -> u64 {
    // Redis rejects a zero expiry.
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl Storage for RedisStorage {
    async fn increment(&self, identity: &Identity) -> ThrottlerResult<u64> {
        let key = counter_key(identity);
        let mut conn = self.connection()?;

        // SET NX only creates the key when absent, so concurrent first
        // increments never push the expiry forward. MULTI keeps the create
        // and the INCR together.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("PX")
            .arg(millis(self.window))
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn is_blocked(&self, identity: &Identity) -> ThrottlerResult<bool> {
        let mut conn = self.connection()?;
        let exists: u64 = redis::cmd("EXISTS")
            .arg(blocked_key(identity))
            .query_async(&mut conn)
            .await?;
        Ok(exists > 0)
    }

    async fn block(&self, identity: &Identity, duration: Duration) -> ThrottlerResult<()> {
        let mut conn = self.connection()?;
        let _: () = redis::cmd("SET")
            .arg(blocked_key(identity))
            .arg("1")
            .arg("PX")
            .arg(millis(duration))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn reset(&self, identity: &Identity) -> ThrottlerResult<()> {
        let mut conn = self.connection()?;
        let _: u64 = redis::cmd("DEL")
            .arg(counter_key(identity))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn close(&self) -> ThrottlerResult<()> {
        let mut guard = self.connection.lock().map_err(|_| {
            ThrottlerError::Internal("Failed to acquire connection lock".into())
        })?;
        if guard.take().is_some() {
            tracing::info!("Redis connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let ip = Identity::Ip("192.168.1.1".to_string());
        let token = Identity::Token("abc123".to_string());

        assert_eq!(counter_key(&ip), "rate_limit:counter:ip:192.168.1.1");
        assert_eq!(blocked_key(&ip), "rate_limit:blocked:ip:192.168.1.1");
        assert_eq!(counter_key(&token), "rate_limit:counter:token:abc123");
        assert_eq!(blocked_key(&token), "rate_limit:blocked:token:abc123");
    }

    #[test]
    fn test_namespaces_never_collide() {
        let ip = Identity::Ip("x".to_string());
        let token = Identity::Token("x".to_string());
        assert_ne!(counter_key(&ip), counter_key(&token));
        assert_ne!(counter_key(&ip), blocked_key(&ip));
    }

    #[test]
    fn test_expiry_never_zero() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(300)), 300_000);
    }
}
