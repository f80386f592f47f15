//! Job handler implementations.

pub mod codes;
pub mod invite;
pub mod pool;
pub mod switch;

pub use codes::DisableCodesHandler;
pub use invite::InviteJobHandler;
pub use pool::PoolSyncHandler;
pub use switch::DrainSwitchQueueHandler;
