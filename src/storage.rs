//! Storage contract for the shared counter store.
//!
//! Every operation goes to a store shared by all service instances, so
//! implementations must make `increment` and `block` atomic at the store.

use crate::error::{ThrottlerError, ThrottlerResult};
use crate::identity::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Atomically increment the identity's counter and return the new count.
    /// An absent counter is created with a window-length expiry.
    async fn increment(&self, identity: &Identity) -> ThrottlerResult<u64>;

    /// Whether a live block entry exists for the identity.
    async fn is_blocked(&self, identity: &Identity) -> ThrottlerResult<bool>;

    /// Create or refresh a block entry expiring after `duration`.
    async fn block(&self, identity: &Identity, duration: Duration) -> ThrottlerResult<()>;

    /// Clear the identity's counter. Not used on the admission path.
    async fn reset(&self, identity: &Identity) -> ThrottlerResult<()>;

    /// Round trip to the store, for health checks.
    async fn ping(&self) -> ThrottlerResult<()>;

    /// Release store resources. Calling it more than once is a no-op.
    fn close(&self) -> ThrottlerResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryState {
    counters: HashMap<Identity, Counter>,
    blocks: HashMap<Identity, Instant>,
}

impl MemoryState {
    /// Drop counters and blocks whose expiry has passed.
    fn evict_expired(&mut self, now: Instant) {
        self.counters.retain(|_, counter| counter.expires_at > now);
        self.blocks.retain(|_, expires_at| *expires_at > now);
    }
}

/// Process-local store with the same TTL semantics as the Redis adapter.
///
/// State is not shared between processes, so this is only suitable for tests
/// and single-instance development.
pub struct InMemoryStorage {
    window: Duration,
    state: Mutex<MemoryState>,
    closed: AtomicBool,
}

impl InMemoryStorage {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(MemoryState::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Live counter value for an identity, zero when absent or expired.
    pub fn count(&self, identity: &Identity) -> u64 {
        let now = Instant::now();
        let counter = match self.state.lock() {
            Ok(state) => state.counters.get(identity).copied(),
            Err(_) => None,
        };
        counter
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.count)
            .unwrap_or(0)
    }

    /// Number of counter and block entries currently held.
    pub fn entry_count(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.counters.len() + state.blocks.len(),
            Err(_) => 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> ThrottlerResult<std::sync::MutexGuard<'_, MemoryState>> {
        if self.is_closed() {
            return Err(ThrottlerError::StoreClosed);
        }
        self.state
            .lock()
            .map_err(|_| ThrottlerError::Internal("Failed to acquire storage lock".into()))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn increment(&self, identity: &Identity) -> ThrottlerResult<u64> {
        let now = Instant::now();
        let window = self.window;
        let mut state = self.lock()?;
        state.evict_expired(now);

        let counter = state
            .counters
            .entry(identity.clone())
            .or_insert(Counter { count: 0, expires_at: now + window });
        counter.count += 1;

        Ok(counter.count)
    }

    async fn is_blocked(&self, identity: &Identity) -> ThrottlerResult<bool> {
        let now = Instant::now();
        let state = self.lock()?;
        let blocked = state
            .blocks
            .get(identity)
            .is_some_and(|expires_at| *expires_at > now);
        Ok(blocked)
    }

    async fn block(&self, identity: &Identity, duration: Duration) -> ThrottlerResult<()> {
        let now = Instant::now();
        let mut state = self.lock()?;
        state.evict_expired(now);
        state.blocks.insert(identity.clone(), now + duration);
        Ok(())
    }

    async fn reset(&self, identity: &Identity) -> ThrottlerResult<()> {
        self.lock()?.counters.remove(identity);
        Ok(())
    }

    async fn ping(&self) -> ThrottlerResult<()> {
        self.lock().map(|_| ())
    }

    fn close(&self) -> ThrottlerResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
