//! # seatbroker-service
//!
//! Business logic layer for Seatbroker. Each service encapsulates one
//! concern and depends only on repository traits, coordination primitives
//! and the provider gateway:
//!
//! - [`CodeLedger`]: code generation, redemption, lifecycle, deactivation
//! - [`SeatAllocator`]: seat holds, commits and releases
//! - [`CapacityGuard`]: theoretical capacity against reserved codes
//! - [`SwitchCoordinator`]: moving codes between seats and the switch queue
//! - [`RefreshService`]: invite re-sends and mailbox changes
//! - [`PoolService`]: mother sync and batch invite operations
//! - [`RedemptionService`]: rate-limited entry points

pub mod capacity;
pub mod code;
pub mod engine;
pub mod pool;
pub mod provider;
pub mod redemption;
pub mod refresh;
pub mod seat;
pub mod switch;

pub use capacity::CapacityGuard;
pub use code::{BindResult, CodeLedger, GeneratedBatch, RedeemOutcome, RedeemStatus};
pub use engine::Engine;
pub use pool::{BatchCounts, PoolService, PoolSyncReport};
pub use provider::{CircuitBreaker, HttpTeamProvider, ProviderGateway};
pub use redemption::RedemptionService;
pub use refresh::{RefreshOutcome, RefreshService};
pub use seat::SeatAllocator;
pub use switch::{DrainReport, SwitchCoordinator, SwitchKind, SwitchOutcome};
