//! Switch state machine.
//!
//! 1. Validate the code (active, lifecycle, switch budget, bound).
//! 2. Make sure some healthy mother, the current one included, has a free
//!    seat; otherwise queue without touching the current seat.
//! 3. Bind a new seat through the ledger's bind path, preferring recently
//!    used teams. The current seat is still held at this point.
//! 4. Record the switch conditionally on the `switch_count` that was
//!    validated. A concurrent switch that committed first makes this fail;
//!    the new seat is then abandoned and the current one kept.
//! 5. Detach from the previous seat, resolve pending requests, log the event.
//!    On "no seat" upsert the single pending request for `(code, email)`.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, info, warn};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{Clock, SwitchRequestId};
use seatbroker_database::SwitchRepository;
use seatbroker_entity::{CodeEvent, CodeEventKind, CodeStatus, RedeemCode, SwitchRequest, SwitchStatus};

use crate::code::{hash_code, normalize_email, BindResult, CodeLedger};

use super::outcome::{DrainReport, SwitchKind, SwitchOutcome};

const NO_SEAT_REASON: &str = "no_free_seat";

/// Switch coordinator service.
#[derive(Debug, Clone)]
pub struct SwitchCoordinator {
    ledger: CodeLedger,
    switches: Arc<dyn SwitchRepository>,
    clock: Arc<dyn Clock>,
    queue_ttl: Duration,
    claim_lease: Duration,
    recent_team_window: Duration,
}

impl SwitchCoordinator {
    /// Creates a new switch coordinator.
    pub fn new(
        ledger: CodeLedger,
        switches: Arc<dyn SwitchRepository>,
        clock: Arc<dyn Clock>,
        queue_ttl: Duration,
        claim_lease: Duration,
        recent_team_window: Duration,
    ) -> Self {
        Self {
            ledger,
            switches,
            clock,
            queue_ttl,
            claim_lease,
            recent_team_window,
        }
    }

    /// Move the code identified by plaintext `code` to a seat for `email`.
    pub async fn switch(&self, code: &str, email: &str, allow_queue: bool) -> AppResult<SwitchOutcome> {
        let email = normalize_email(email)?;
        let Some(code) = self.ledger.codes.find_by_hash(&hash_code(code)).await? else {
            return Ok(SwitchOutcome::rejected("Code not found"));
        };
        self.switch_code(&code, &email, allow_queue).await
    }

    /// Switch an already loaded code. `email` must be normalized.
    pub async fn switch_code(
        &self,
        code: &RedeemCode,
        email: &str,
        allow_queue: bool,
    ) -> AppResult<SwitchOutcome> {
        if let Some(rejection) = self.validate(code).await? {
            return Ok(rejection);
        }

        if !self.ledger.allocator.any_free_seat().await? {
            return self.no_seat(code, email, allow_queue).await;
        }

        let prefer = self.recent_teams(code).await?;
        let binding = match self.ledger.bind_seat(Some(code.id), email, &prefer).await? {
            BindResult::Bound(binding) => binding,
            BindResult::NoSeat => return self.no_seat(code, email, allow_queue).await,
        };

        let now = self.clock.now();
        if !self
            .ledger
            .codes
            .record_switch(code.id, code.switch_count, &binding, now)
            .await?
        {
            self.ledger.abandon_binding(&binding).await?;
            warn!(code_id = %code.id, seat_id = %binding.seat_id, "Switch lost to a concurrent update");
            let current = self.ledger.codes.find_by_id(code.id).await?;
            return match current {
                Some(current) => match self.validate(&current).await? {
                    Some(rejection) => Ok(rejection),
                    None => Ok(SwitchOutcome::conflict()),
                },
                None => Ok(SwitchOutcome::rejected("Code not found")),
            };
        }

        if let Err(err) = self.detach(code).await {
            warn!(code_id = %code.id, error = %err, "Switched, but the previous seat could not be detached");
        }
        self.switches
            .resolve_succeeded(code.id, email, Some(binding.mother_id), now)
            .await?;
        self.ledger
            .codes
            .append_event(
                &CodeEvent::new(code.id, CodeEventKind::Switch, now)
                    .at_seat(email, &binding.team_id, binding.mother_id),
            )
            .await?;
        info!(
            code_id = %code.id,
            from = ?code.bound_mother_id,
            to = %binding.mother_id,
            "Code switched"
        );
        Ok(SwitchOutcome::switched(binding.mother_id))
    }

    /// Re-run one queued request without re-queuing. Returns the status the
    /// request ended in, or `None` if another worker claimed it first.
    pub async fn process_request(&self, request: &SwitchRequest) -> AppResult<Option<SwitchStatus>> {
        let now = self.clock.now();
        if request.is_expired(now) {
            self.switches
                .set_status(request.id, SwitchStatus::Expired, None, now)
                .await?;
            debug!(request_id = %request.id, "Switch request expired");
            return Ok(Some(SwitchStatus::Expired));
        }
        if !self.switches.claim(request.id, now).await? {
            return Ok(None);
        }

        let Some(code) = self.ledger.codes.find_by_id(request.redeem_code_id).await? else {
            self.switches
                .set_status(request.id, SwitchStatus::Failed, Some("code not found"), self.clock.now())
                .await?;
            return Ok(Some(SwitchStatus::Failed));
        };

        let status = match self.switch_code(&code, &request.email, false).await {
            Ok(outcome) => match outcome.kind {
                SwitchKind::Switched => SwitchStatus::Succeeded,
                SwitchKind::Rejected => {
                    self.switches
                        .set_status(request.id, SwitchStatus::Failed, Some(&outcome.message), self.clock.now())
                        .await?;
                    SwitchStatus::Failed
                }
                SwitchKind::NoSeat | SwitchKind::Queued | SwitchKind::Conflict => {
                    self.requeue(request.id, NO_SEAT_REASON).await?
                }
            },
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "Switch attempt failed, requeueing");
                self.requeue(request.id, &err.to_string()).await?
            }
        };
        Ok(Some(status))
    }

    /// Process up to `limit` pending requests, oldest first. Running requests
    /// whose claim lease lapsed are requeued first.
    pub async fn drain(&self, limit: u32) -> AppResult<DrainReport> {
        let mut report = DrainReport::default();
        let now = self.clock.now();
        report.reclaimed = self
            .switches
            .reclaim_stale(now - self.claim_lease, now)
            .await?;
        if report.reclaimed > 0 {
            warn!(reclaimed = report.reclaimed, "Requeued switch requests with lapsed claims");
        }

        for request in self.switches.list_pending(limit).await? {
            match self.process_request(&request).await {
                Ok(None) => {}
                Ok(Some(status)) => {
                    report.processed += 1;
                    match status {
                        SwitchStatus::Succeeded => report.succeeded += 1,
                        SwitchStatus::Pending => report.requeued += 1,
                        SwitchStatus::Expired => report.expired += 1,
                        SwitchStatus::Failed | SwitchStatus::Running => report.failed += 1,
                    }
                }
                Err(err) => {
                    error!(request_id = %request.id, error = %err, "Failed to process switch request");
                    report.processed += 1;
                    report.failed += 1;
                }
            }
        }
        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                requeued = report.requeued,
                expired = report.expired,
                failed = report.failed,
                "Drained switch queue"
            );
        }
        Ok(report)
    }

    /// Find a request by id.
    pub async fn request(&self, id: SwitchRequestId) -> AppResult<Option<SwitchRequest>> {
        self.switches.find_by_id(id).await
    }

    async fn validate(&self, code: &RedeemCode) -> AppResult<Option<SwitchOutcome>> {
        if self.ledger.enforce_lifecycle(code).await? {
            return Ok(Some(SwitchOutcome::rejected("Code has expired")));
        }
        if !code.active {
            return Ok(Some(SwitchOutcome::rejected("Code has been disabled")));
        }
        if code.status != CodeStatus::Used || code.bound_email.is_none() {
            return Ok(Some(SwitchOutcome::rejected("Code has not been redeemed")));
        }
        if !code.has_switches_left() {
            return Ok(Some(SwitchOutcome::rejected("Switch limit reached")));
        }
        Ok(None)
    }

    async fn no_seat(&self, code: &RedeemCode, email: &str, allow_queue: bool) -> AppResult<SwitchOutcome> {
        if !allow_queue {
            return Ok(SwitchOutcome::no_seat());
        }
        let now = self.clock.now();
        let request = self
            .switches
            .upsert_pending(
                code.id,
                email,
                NO_SEAT_REASON,
                code.bound_mother_id,
                now,
                now + self.queue_ttl,
            )
            .await?;
        info!(code_id = %code.id, request_id = %request.id, "Switch queued");
        Ok(SwitchOutcome::queued(request.id))
    }

    /// Free the seat the code held before the switch. A healthy mother is
    /// told to drop the member first; an invalid one is only cleaned up
    /// locally. On a remote failure the seat stays occupied.
    async fn detach(&self, code: &RedeemCode) -> AppResult<()> {
        let (Some(team_id), Some(bound_email)) = (&code.current_team_id, &code.bound_email) else {
            return Ok(());
        };
        let Some(seat) = self.ledger.allocator.find_active(team_id, bound_email).await? else {
            return Ok(());
        };
        let mother = self.ledger.allocator.mother(seat.mother_id).await?;
        if let Some(mother) = mother.filter(|m| self.ledger.allocator.is_healthy(m)) {
            self.ledger
                .withdraw_remote(&mother, bound_email, seat.member_id.as_deref())
                .await?;
        }

        self.ledger.allocator.release(seat.id).await?;
        debug!(code_id = %code.id, seat_id = %seat.id, "Detached from previous seat");
        Ok(())
    }

    /// Teams this code sat on within the recency window, newest first,
    /// excluding the current one.
    async fn recent_teams(&self, code: &RedeemCode) -> AppResult<Vec<String>> {
        let since = self.clock.now() - self.recent_team_window;
        let mut teams: Vec<String> = Vec::new();
        for event in self.ledger.codes.list_events(code.id).await?.iter().rev() {
            if event.created_at < since {
                break;
            }
            if !matches!(event.kind, CodeEventKind::Bind | CodeEventKind::Switch) {
                continue;
            }
            let Some(team) = &event.team_id else {
                continue;
            };
            if Some(team) != code.current_team_id.as_ref() && !teams.contains(team) {
                teams.push(team.clone());
            }
        }
        Ok(teams)
    }

    /// Put a claimed request back, or close it when a newer pending request
    /// for the pair exists.
    async fn requeue(&self, id: SwitchRequestId, reason: &str) -> AppResult<SwitchStatus> {
        if let Some(status) = self.switches.requeue(id, reason, self.clock.now()).await? {
            return Ok(status);
        }
        let current = self.switches.find_by_id(id).await?;
        Ok(current.map_or(SwitchStatus::Failed, |r| r.status))
    }
}
