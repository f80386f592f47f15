//! # seatbroker-coordination
//!
//! Cross-instance coordination primitives for Seatbroker:
//!
//! - **lock**: best-effort [`DistributedLock`](seatbroker_core::traits::DistributedLock)
//!   over Redis (`SET NX PX` + scripted compare-and-delete) or in-process
//! - **rate limiting**: lazily refilled token buckets over Redis (one Lua
//!   script per check) or in-process (one mutex per key), a fallback
//!   wrapper, and a registry of named policies
//!
//! The backend is selected at runtime from configuration by
//! [`CoordinationManager`].

pub mod fallback;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod redis;
pub mod registry;

pub use fallback::FallbackRateLimiter;
pub use manager::CoordinationManager;
pub use memory::{MemoryLock, MemoryRateLimiter};
pub use registry::RateLimitRegistry;
