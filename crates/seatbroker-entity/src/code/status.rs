//! Redeem code status enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Redemption status of a code.
///
/// Transitions only `unused -> blocked -> {used, unused}`; `unused -> expired`
/// happens lazily when an unredeemed code outlives `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "code_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// Generated and not yet redeemed.
    Unused,
    /// A redemption is in flight.
    Blocked,
    /// Bound to a seat.
    Used,
    /// Never redeemed before `expires_at`.
    Expired,
}

impl CodeStatus {
    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Blocked => "blocked",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
