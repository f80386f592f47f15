//! Moving bound codes between seats, with a queue for when none is free.

pub mod coordinator;
pub mod outcome;

pub use coordinator::SwitchCoordinator;
pub use outcome::{DrainReport, SwitchKind, SwitchOutcome};
