//! # seatbroker-core
//!
//! Core crate for Seatbroker. Contains the unified error system,
//! configuration schemas, typed identifiers, the injectable clock,
//! and the seam traits implemented by the coordination and service
//! crates (distributed lock, rate limiter, team provider).
//!
//! This crate has **no** internal dependencies on other Seatbroker crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, RemoteError};
pub use result::AppResult;
