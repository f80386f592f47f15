//! Mother pool maintenance and batch seat operations.

pub mod service;

pub use service::{BatchCounts, PoolService, PoolSyncReport};
