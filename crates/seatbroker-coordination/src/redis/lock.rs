//! Redis distributed lock: `SET NX PX` to acquire, scripted
//! compare-and-delete to release.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use seatbroker_core::traits::{DistributedLock, LockAttempt, LockToken, ReleaseOutcome};

use super::client::RedisClient;
use crate::keys;

/// Delete KEYS[1] only if it still holds ARGV[1].
///
/// Returns 1 when deleted, 0 otherwise.
const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Lock stored as a single Redis string whose value is the holder's token.
#[derive(Debug, Clone)]
pub struct RedisLock {
    client: RedisClient,
}

impl RedisLock {
    /// Create a lock over an existing client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockAttempt {
        let key = self.client.prefixed_key(&keys::lock(name));
        let token = LockToken::generate();
        let ttl_ms = ttl.as_millis().clamp(1, u128::from(u64::MAX)) as u64;
        let mut conn = self.client.conn();

        let reply: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(&key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(Some(_)) => {
                debug!(lock = %name, ttl_ms, "Lock acquired");
                LockAttempt::Acquired(token)
            }
            Ok(None) => LockAttempt::Held,
            Err(e) => {
                warn!(lock = %name, error = %e, "Lock store unavailable");
                LockAttempt::StoreUnavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn release(&self, name: &str, token: &LockToken) -> ReleaseOutcome {
        let key = self.client.prefixed_key(&keys::lock(name));
        let mut conn = self.client.conn();

        let deleted: Result<i64, redis::RedisError> = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await;

        match deleted {
            Ok(1) => ReleaseOutcome::Released,
            Ok(_) => {
                debug!(lock = %name, "Lock already expired or taken over");
                ReleaseOutcome::NotHeld
            }
            Err(e) => {
                warn!(lock = %name, error = %e, "Lock release failed");
                ReleaseOutcome::StoreUnavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}
