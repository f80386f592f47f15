//! Seat allocation domain entities.

pub mod model;

pub use model::{SeatAllocation, SeatStatus};
