//! Redis token bucket: refill and consume in one Lua script so that
//! concurrent checks on a key from any instance are serialized by Redis.

use std::sync::Arc;

use async_trait::async_trait;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{RateDecision, RateLimitPolicy, RateLimiter};
use seatbroker_core::types::Clock;

use super::client::RedisClient;

/// Refill-then-consume on a hash `{tokens, ts}`.
///
/// KEYS[1] = bucket key
/// ARGV[1] = capacity
/// ARGV[2] = refill per second
/// ARGV[3] = now (ms since epoch)
/// ARGV[4] = cost
/// ARGV[5] = peek ("1" or "0")
/// ARGV[6] = key ttl (ms)
///
/// Returns the refilled token count before consumption, as a string.
const BUCKET_SCRIPT: &str = r#"
    local capacity = tonumber(ARGV[1])
    local rate = tonumber(ARGV[2])
    local now = tonumber(ARGV[3])
    local cost = tonumber(ARGV[4])
    local peek = ARGV[5] == '1'

    local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
    local tokens = tonumber(state[1])
    local ts = tonumber(state[2])
    if tokens == nil or ts == nil then
        tokens = capacity
        ts = now
    end

    local elapsed = math.max(0, now - ts)
    local available = math.min(capacity, tokens + elapsed * rate / 1000)

    local left = available
    if not peek and available + 1e-9 >= cost then
        left = math.max(0, available - cost)
    end

    redis.call('HSET', KEYS[1], 'tokens', tostring(left), 'ts', tostring(math.max(now, ts)))
    redis.call('PEXPIRE', KEYS[1], ARGV[6])
    return tostring(available)
"#;

/// Token-bucket limiter whose state lives in Redis.
#[derive(Debug, Clone)]
pub struct RedisRateLimiter {
    client: RedisClient,
    clock: Arc<dyn Clock>,
}

impl RedisRateLimiter {
    /// Create a limiter over an existing client.
    pub fn new(client: RedisClient, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }
}

/// Time for an empty bucket to fill, used as the key's expiry.
fn bucket_ttl_ms(policy: &RateLimitPolicy) -> u64 {
    if policy.refill_per_second <= 0.0 {
        return 86_400_000;
    }
    let fill = f64::from(policy.capacity) / policy.refill_per_second * 1000.0;
    (fill.ceil() as u64).saturating_add(1000)
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        cost: u32,
        peek: bool,
    ) -> AppResult<RateDecision> {
        let now = self.clock.now();
        let full_key = self.client.prefixed_key(key);
        let mut conn = self.client.conn();

        let available: String = redis::Script::new(BUCKET_SCRIPT)
            .key(&full_key)
            .arg(policy.capacity)
            .arg(policy.refill_per_second)
            .arg(now.timestamp_millis())
            .arg(cost)
            .arg(if peek { "1" } else { "0" })
            .arg(bucket_ttl_ms(policy))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Coordination, "Rate limit script failed", e)
            })?;

        let available: f64 = available.parse().map_err(|_| {
            AppError::coordination(format!("Rate limit script returned '{available}'"))
        })?;

        Ok(policy.decide(available, cost, peek, now).0)
    }
}
