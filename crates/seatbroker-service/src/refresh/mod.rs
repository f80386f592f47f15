//! Invite refresh.

pub mod service;

pub use service::{RefreshOutcome, RefreshService};
