//! Best-effort distributed lock over a shared coordination store.
//!
//! The lock offers TTL-bounded mutual exclusion only: no fencing, no
//! ordering. It reduces duplicate work; it never guards the capacity
//! invariant, which lives in the storage layer's compare-and-set.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::result::AppResult;

/// Opaque value identifying one acquisition.
///
/// Release only succeeds while the stored value still equals this token,
/// so a holder whose lock expired cannot delete a successor's lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(pub String);

impl LockToken {
    /// A fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of [`DistributedLock::try_acquire`].
///
/// `Held` and `StoreUnavailable` are separate outcomes: the first means
/// someone else has the lock, the second means exclusion was never attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// The lock is ours until the TTL lapses or we release it.
    Acquired(LockToken),
    /// The store answered and another holder owns the lock.
    Held,
    /// The store could not be reached; no exclusion was attempted.
    StoreUnavailable {
        /// Why the store was unreachable.
        reason: String,
    },
}

impl LockAttempt {
    /// Interpretation for callers that require strict exclusion.
    ///
    /// An unreachable store becomes an error; a held lock becomes `Ok(None)`.
    pub fn require(self) -> AppResult<Option<LockToken>> {
        match self {
            Self::Acquired(token) => Ok(Some(token)),
            Self::Held => Ok(None),
            Self::StoreUnavailable { reason } => Err(AppError::service_unavailable(format!(
                "Lock store unavailable: {reason}"
            ))),
        }
    }

    /// Whether the lock was acquired.
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// Outcome of [`DistributedLock::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock was ours and is now gone.
    Released,
    /// The lock had expired or belongs to another holder; nothing was deleted.
    NotHeld,
    /// The store could not be reached.
    StoreUnavailable {
        /// Why the store was unreachable.
        reason: String,
    },
}

/// Atomic set-if-absent-with-TTL plus delete-if-token-matches.
#[async_trait]
pub trait DistributedLock: Send + Sync + std::fmt::Debug + 'static {
    /// Try once to take the named lock for `ttl`.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> LockAttempt;

    /// Release the named lock if `token` still owns it.
    async fn release(&self, name: &str, token: &LockToken) -> ReleaseOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_distinguishes_outcomes() {
        let token = LockToken::generate();
        assert_eq!(
            LockAttempt::Acquired(token.clone()).require().expect("ok"),
            Some(token)
        );
        assert_eq!(LockAttempt::Held.require().expect("ok"), None);
        assert!(
            LockAttempt::StoreUnavailable {
                reason: "down".into()
            }
            .require()
            .is_err()
        );
    }
}
