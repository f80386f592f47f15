//! Capacity accounting across mothers and unused codes.

pub mod guard;

pub use guard::CapacityGuard;
