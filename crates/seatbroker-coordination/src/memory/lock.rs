//! In-memory distributed lock twin.
//!
//! Same contract as the Redis lock within one process. The store is always
//! reachable, so `StoreUnavailable` is never returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use seatbroker_core::traits::{DistributedLock, LockAttempt, LockToken, ReleaseOutcome};
use seatbroker_core::types::Clock;

#[derive(Debug)]
struct Entry {
    token: LockToken,
    expires_at: DateTime<Utc>,
}

/// Lock table guarded by a Tokio mutex, expiring entries against the clock.
#[derive(Debug, Clone)]
pub struct MemoryLock {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryLock {
    /// Create an empty lock table.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockAttempt {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut entries = self.entries.lock().await;

        if entries.get(name).is_some_and(|e| e.expires_at > now) {
            return LockAttempt::Held;
        }

        let token = LockToken::generate();
        entries.insert(
            name.to_string(),
            Entry {
                token: token.clone(),
                expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        LockAttempt::Acquired(token)
    }

    async fn release(&self, name: &str, token: &LockToken) -> ReleaseOutcome {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        match entries.get(name) {
            Some(entry) if entry.token == *token && entry.expires_at > now => {
                entries.remove(name);
                ReleaseOutcome::Released
            }
            _ => ReleaseOutcome::NotHeld,
        }
    }
}
