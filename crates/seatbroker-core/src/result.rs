//! Convenience result type alias for Seatbroker.

use crate::error::AppError;

/// A specialized `Result` type for Seatbroker operations.
pub type AppResult<T> = Result<T, AppError>;
