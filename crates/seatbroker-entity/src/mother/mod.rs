//! Mother account domain entities.

pub mod model;

pub use model::{MotherAccount, MotherGroup, MotherStatus};
