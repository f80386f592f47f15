//! # seatbroker-entity
//!
//! Domain entity models for Seatbroker. Every struct in this crate
//! represents a database table row or a domain value object. Row types
//! additionally derive `sqlx::FromRow`; status columns map onto
//! PostgreSQL enum types.
//!
//! Entities carry no transition logic of their own beyond read-only
//! predicates: status changes belong to the service layer.

pub mod capacity;
pub mod code;
pub mod job;
pub mod mother;
pub mod seat;
pub mod switch;

pub use capacity::CapacitySnapshot;
pub use code::{CodeBinding, CodeEvent, CodeEventKind, CodeStatus, NewRedeemCode, RedeemCode, SkuDefaults};
pub use job::{BatchJob, InviteTarget, JobPayload, JobStatus, JobType, NewBatchJob};
pub use mother::{MotherAccount, MotherGroup, MotherStatus};
pub use seat::{SeatAllocation, SeatStatus};
pub use switch::{SwitchRequest, SwitchStatus};
