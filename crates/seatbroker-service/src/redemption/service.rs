//! Public request surface of the engine.
//!
//! Each entry point consumes a token from its named policy before doing any
//! work: `redeem` per email, `switch` and `refresh` per code hash. A missing
//! policy means the operation is unlimited.

use tracing::debug;

use seatbroker_core::result::AppResult;
use seatbroker_coordination::RateLimitRegistry;

use crate::code::{hash_code, normalize_email, CodeLedger, RedeemOutcome};
use crate::refresh::{RefreshOutcome, RefreshService};
use crate::switch::{SwitchCoordinator, SwitchOutcome};

/// Policy id for redemptions.
pub const REDEEM_POLICY: &str = "redeem";
/// Policy id for switches.
pub const SWITCH_POLICY: &str = "switch";
/// Policy id for refreshes.
pub const REFRESH_POLICY: &str = "refresh";

/// Rate-limited facade over the ledger, switch and refresh services.
#[derive(Debug, Clone)]
pub struct RedemptionService {
    ledger: CodeLedger,
    switcher: SwitchCoordinator,
    refresher: RefreshService,
    limits: RateLimitRegistry,
}

impl RedemptionService {
    /// Creates a new redemption service.
    pub fn new(
        ledger: CodeLedger,
        switcher: SwitchCoordinator,
        refresher: RefreshService,
        limits: RateLimitRegistry,
    ) -> Self {
        Self {
            ledger,
            switcher,
            refresher,
            limits,
        }
    }

    /// Redeem `code` for `email`.
    pub async fn redeem(&self, code: &str, email: &str) -> AppResult<RedeemOutcome> {
        let email = normalize_email(email)?;
        self.limits.enforce(REDEEM_POLICY, &email).await?;
        debug!(email = %email, "Redeem request");
        self.ledger.redeem(code, &email).await
    }

    /// Switch `code` to a seat for `email`, queuing when none is free.
    pub async fn switch(&self, code: &str, email: &str) -> AppResult<SwitchOutcome> {
        self.limits.enforce(SWITCH_POLICY, &hash_code(code)).await?;
        self.switcher.switch(code, email, true).await
    }

    /// Refresh the invite of `code`, optionally moving it to `new_email`.
    pub async fn refresh(
        &self,
        code: &str,
        email: &str,
        new_email: Option<&str>,
    ) -> AppResult<RefreshOutcome> {
        self.limits.enforce(REFRESH_POLICY, &hash_code(code)).await?;
        self.refresher.refresh(code, email, new_email).await
    }

    /// The policy registry, for runtime changes.
    pub fn limits(&self) -> &RateLimitRegistry {
        &self.limits
    }
}
