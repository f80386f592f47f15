//! Redis-backed coordination primitives.

pub mod client;
pub mod lock;
pub mod rate_limit;

pub use client::RedisClient;
pub use lock::RedisLock;
pub use rate_limit::RedisRateLimiter;
