//! # seatbroker-database
//!
//! Storage layer for Seatbroker. [`store`] defines one repository trait per
//! aggregate; every status transition is exposed as a conditional
//! ("compare-and-set") operation so that exactly one concurrent caller wins.
//!
//! Two implementations are provided:
//! - [`postgres`]: sqlx over PostgreSQL (conditional `UPDATE ... RETURNING`,
//!   `FOR UPDATE SKIP LOCKED`, transaction-scoped advisory locks)
//! - [`memory`]: a single Tokio mutex over in-process maps, for tests and
//!   single-node deployments

pub mod connection;
pub mod memory;
pub mod migration;
pub mod postgres;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use store::{
    CodeRepository, HoldOutcome, JobRepository, MotherRepository, QueueStats, Repositories,
    SeatRepository, SwitchRepository,
};
