//! Core type definitions used across the Seatbroker workspace.

pub mod clock;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::*;
