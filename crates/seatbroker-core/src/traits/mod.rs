//! Core traits defined in `seatbroker-core` and implemented by other crates.

pub mod lock;
pub mod provider;
pub mod rate_limit;

pub use lock::{DistributedLock, LockAttempt, LockToken, ReleaseOutcome};
pub use provider::{InviteReceipt, RemoteMember, TeamProvider};
pub use rate_limit::{RateDecision, RateLimitPolicy, RateLimiter};
