//! Seat switch request entities.

pub mod model;

pub use model::{SwitchRequest, SwitchStatus};
