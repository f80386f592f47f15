//! Re-send an invite on the current seat, or move to a new mailbox.
//!
//! Refreshes are budgeted per code (`refresh_limit`) and spaced by a
//! cooldown. Hitting the cooldown is an ordinary outcome that reports how
//! long to wait.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{Clock, MotherId};
use seatbroker_entity::{CodeEvent, CodeEventKind, CodeStatus, RedeemCode};

use crate::code::{hash_code, normalize_email, CodeLedger};
use crate::switch::{SwitchCoordinator, SwitchKind};

/// Response to a refresh request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    /// Whether the refresh went through.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Whether a switch to the new mailbox was queued.
    pub queued: bool,
    /// Seconds until the next refresh is allowed, on a cooldown hit.
    pub cooldown_seconds: Option<i64>,
    /// Refreshes left after this call.
    pub refresh_remaining: Option<i32>,
}

impl RefreshOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            queued: false,
            cooldown_seconds: None,
            refresh_remaining: None,
        }
    }
}

/// Refresh service.
#[derive(Debug, Clone)]
pub struct RefreshService {
    ledger: CodeLedger,
    switcher: SwitchCoordinator,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl RefreshService {
    /// Creates a new refresh service.
    pub fn new(ledger: CodeLedger, switcher: SwitchCoordinator, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            ledger,
            switcher,
            clock,
            cooldown,
        }
    }

    /// Refresh the invite of `code` bound to `email`, optionally moving it
    /// to `new_email`.
    pub async fn refresh(
        &self,
        code: &str,
        email: &str,
        new_email: Option<&str>,
    ) -> AppResult<RefreshOutcome> {
        let email = normalize_email(email)?;
        let new_email = new_email.map(normalize_email).transpose()?;
        let Some(code) = self.ledger.codes.find_by_hash(&hash_code(code)).await? else {
            return Ok(RefreshOutcome::failure("Code not found"));
        };

        if self.ledger.enforce_lifecycle(&code).await? {
            return Ok(RefreshOutcome::failure("Code has expired"));
        }
        if !code.active {
            return Ok(RefreshOutcome::failure("Code has been disabled"));
        }
        if code.status != CodeStatus::Used || !code.is_bound_to(&email) {
            return Ok(RefreshOutcome::failure("Code is not bound to this email"));
        }
        if code.refresh_remaining() == 0 {
            return Ok(RefreshOutcome {
                refresh_remaining: Some(0),
                ..RefreshOutcome::failure("Refresh limit reached")
            });
        }
        let now = self.clock.now();
        if let Some(last) = code.last_refreshed_at {
            let ready_at = last + self.cooldown;
            if ready_at > now {
                let remaining = (ready_at - now).num_milliseconds();
                return Ok(RefreshOutcome {
                    cooldown_seconds: Some((remaining + 999) / 1000),
                    refresh_remaining: Some(code.refresh_remaining()),
                    ..RefreshOutcome::failure("Refresh is cooling down")
                });
            }
        }

        match new_email.filter(|new| *new != email) {
            None => self.resend(&code, &email).await,
            Some(new_email) => self.move_to(&code, &new_email).await,
        }
    }

    async fn resend(&self, code: &RedeemCode, email: &str) -> AppResult<RefreshOutcome> {
        let allocator = &self.ledger.allocator;
        let seat = match &code.current_team_id {
            Some(team_id) => allocator.find_active(team_id, email).await?,
            None => None,
        };
        let mother = match seat {
            Some(seat) => allocator.mother(seat.mother_id).await?,
            None => None,
        };
        let Some(mother) = mother.filter(|m| allocator.is_healthy(m)) else {
            return Ok(RefreshOutcome::failure(
                "Current seat is unavailable; switch to a new team instead",
            ));
        };

        match self.ledger.gateway.send_invite(&mother, email).await {
            Ok(_) => {}
            Err(err) if err.is_account_invalid() => {
                warn!(mother_id = %mother.id, "Mother rejected credentials during refresh");
                allocator.invalidate_mother(mother.id).await?;
                return Ok(RefreshOutcome::failure(
                    "Current team is no longer available; switch to a new team instead",
                ));
            }
            Err(err) => return Err(err.into()),
        }

        self.consume(code, email, Some((&mother.team_id, mother.id)), "invite resent")
            .await
    }

    async fn move_to(&self, code: &RedeemCode, new_email: &str) -> AppResult<RefreshOutcome> {
        let outcome = self.switcher.switch_code(code, new_email, true).await?;
        match outcome.kind {
            SwitchKind::Switched | SwitchKind::Queued => {
                let mut result = self.consume(code, new_email, None, "mailbox changed").await?;
                result.queued = outcome.queued;
                result.message = outcome.message;
                Ok(result)
            }
            SwitchKind::NoSeat | SwitchKind::Rejected | SwitchKind::Conflict => Ok(RefreshOutcome {
                refresh_remaining: Some(code.refresh_remaining()),
                ..RefreshOutcome::failure(outcome.message)
            }),
        }
    }

    async fn consume(
        &self,
        code: &RedeemCode,
        email: &str,
        seat: Option<(&str, MotherId)>,
        detail: &str,
    ) -> AppResult<RefreshOutcome> {
        let now = self.clock.now();
        if !self.ledger.codes.record_refresh(code.id, now).await? {
            return Ok(RefreshOutcome {
                refresh_remaining: Some(0),
                ..RefreshOutcome::failure("Refresh limit reached")
            });
        }
        let mut event = CodeEvent::new(code.id, CodeEventKind::Refresh, now).with_detail(detail);
        if let Some((team_id, mother_id)) = seat {
            event = event.at_seat(email, team_id, mother_id);
        } else {
            event.email = Some(email.to_string());
        }
        self.ledger.codes.append_event(&event).await?;
        info!(code_id = %code.id, detail = %detail, "Code refreshed");

        Ok(RefreshOutcome {
            success: true,
            message: "Invite refreshed".to_string(),
            queued: false,
            cooldown_seconds: None,
            refresh_remaining: Some((code.refresh_remaining() - 1).max(0)),
        })
    }
}
