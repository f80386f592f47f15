//! In-process coordination primitives for single-node deployments and tests.

pub mod lock;
pub mod rate_limit;

pub use lock::MemoryLock;
pub use rate_limit::MemoryRateLimiter;
