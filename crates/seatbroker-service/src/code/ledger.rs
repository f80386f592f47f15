//! Redeem code state machine.
//!
//! `status` moves only `unused -> blocked -> {used, unused}` and
//! `unused -> expired`. The `blocked` state is taken with a conditional
//! update so concurrent redeemers of the same hash have exactly one winner.
//! A blocked code that fails to bind is returned to `unused` by
//! [`BlockedCode`], which also covers early returns and panics.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{BatchId, Clock, CodeId};
use seatbroker_database::CodeRepository;
use seatbroker_entity::{CodeEvent, CodeEventKind, CodeStatus, NewRedeemCode, RedeemCode, SkuDefaults};

use crate::capacity::CapacityGuard;
use crate::provider::ProviderGateway;
use crate::seat::SeatAllocator;

use super::hash::{generate_plaintext, hash_code, normalize_code, normalize_email};
use super::outcome::{BindResult, GeneratedBatch, RedeemOutcome, RedeemStatus};

/// Upper bound for one generation request.
pub const MAX_BATCH_SIZE: u32 = 10_000;

/// Redeem code ledger service.
#[derive(Debug, Clone)]
pub struct CodeLedger {
    pub(crate) codes: Arc<dyn CodeRepository>,
    pub(crate) allocator: SeatAllocator,
    pub(crate) capacity: CapacityGuard,
    pub(crate) gateway: ProviderGateway,
    pub(crate) clock: Arc<dyn Clock>,
    code_length: usize,
    default_prefix: String,
}

impl CodeLedger {
    /// Creates a new ledger.
    pub fn new(
        codes: Arc<dyn CodeRepository>,
        allocator: SeatAllocator,
        capacity: CapacityGuard,
        gateway: ProviderGateway,
        clock: Arc<dyn Clock>,
        code_length: usize,
        default_prefix: String,
    ) -> Self {
        Self {
            codes,
            allocator,
            capacity,
            gateway,
            clock,
            code_length,
            default_prefix,
        }
    }

    /// Generate `count` codes after a capacity check. Returns the plaintexts
    /// once; only their hashes are persisted.
    pub async fn generate_codes(
        &self,
        count: u32,
        prefix: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        sku: SkuDefaults,
    ) -> AppResult<GeneratedBatch> {
        let now = self.clock.now();
        if count == 0 || count > MAX_BATCH_SIZE {
            return Err(AppError::validation(format!(
                "Code count must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if expires_at.is_some_and(|at| at <= now) {
            return Err(AppError::validation("Expiry must be in the future"));
        }
        if sku.switch_limit < 0 || sku.refresh_limit < 0 || sku.lifecycle_days.is_some_and(|d| d <= 0) {
            return Err(AppError::validation("SKU limits must be non-negative"));
        }
        if self.code_length < 8 {
            return Err(AppError::configuration("Code length must be at least 8"));
        }

        let capacity = self.capacity.ensure_capacity(u64::from(count)).await?;

        let prefix = normalize_code(prefix.unwrap_or(&self.default_prefix));
        let batch_id = BatchId::new();
        let mut plaintexts = Vec::with_capacity(count as usize);
        let mut seen = HashSet::with_capacity(count as usize);
        while plaintexts.len() < count as usize {
            let plaintext = generate_plaintext(&prefix, self.code_length);
            if seen.insert(plaintext.clone()) {
                plaintexts.push(plaintext);
            }
        }

        let rows: Vec<RedeemCode> = plaintexts
            .iter()
            .map(|plaintext| {
                NewRedeemCode {
                    code_hash: hash_code(plaintext),
                    batch_id,
                    plaintext_prefix: prefix.clone(),
                    expires_at,
                    sku: sku.clone(),
                }
                .into_code(now)
            })
            .collect();
        self.codes.insert_batch(&rows).await?;

        info!(
            batch_id = %batch_id,
            count,
            available_before = capacity.available_slots,
            "Generated redeem codes"
        );
        Ok(GeneratedBatch {
            batch_id,
            codes: plaintexts,
            capacity,
        })
    }

    /// Redeem a plaintext code for `email`.
    pub async fn redeem(&self, code: &str, email: &str) -> AppResult<RedeemOutcome> {
        let email = normalize_email(email)?;
        if normalize_code(code).is_empty() {
            return Err(AppError::validation("Code must not be empty"));
        }
        self.redeem_hash(&hash_code(code), &email).await
    }

    /// Redeem by code hash. `email` must already be normalized.
    pub async fn redeem_hash(&self, code_hash: &str, email: &str) -> AppResult<RedeemOutcome> {
        let Some(code) = self.codes.find_by_hash(code_hash).await? else {
            return Ok(RedeemOutcome::failure(RedeemStatus::NotFound));
        };
        if self.enforce_lifecycle(&code).await? {
            return Ok(RedeemOutcome::failure(RedeemStatus::Expired));
        }
        if self.expire_if_past_deadline(&code).await? {
            return Ok(RedeemOutcome::failure(RedeemStatus::Expired));
        }

        let now = self.clock.now();
        let Some(blocked) = self.codes.try_block(code_hash, now).await? else {
            return self.explain_lost_block(code_hash).await;
        };
        let guard = BlockedCode::new(self.codes.clone(), self.clock.clone(), blocked.id);

        match self.bind_seat(Some(blocked.id), email, &[]).await {
            Ok(BindResult::Bound(binding)) => {
                let now = self.clock.now();
                let lifecycle_end = blocked.lifecycle_end_from(now);
                if !self
                    .codes
                    .mark_used(blocked.id, &binding, lifecycle_end, now)
                    .await?
                {
                    guard.settle();
                    self.abandon_binding(&binding).await?;
                    return Err(AppError::conflict(format!(
                        "Code {} left the blocked state during redemption",
                        blocked.id
                    )));
                }
                guard.settle();
                self.codes
                    .append_event(
                        &CodeEvent::new(blocked.id, CodeEventKind::Bind, now)
                            .at_seat(email, &binding.team_id, binding.mother_id),
                    )
                    .await?;
                info!(
                    code_id = %blocked.id,
                    mother_id = %binding.mother_id,
                    seat_id = %binding.seat_id,
                    "Code redeemed"
                );
                Ok(RedeemOutcome::redeemed(&binding))
            }
            Ok(BindResult::NoSeat) => {
                guard.compensate().await?;
                warn!(code_id = %blocked.id, "Redemption found no free seat");
                Ok(RedeemOutcome::failure(RedeemStatus::NoSeat))
            }
            Err(err) => {
                if let Err(undo) = guard.compensate().await {
                    error!(code_id = %blocked.id, error = %undo, "Failed to unblock code");
                }
                Err(err)
            }
        }
    }

    /// Deactivate codes. Already inactive codes are skipped.
    pub async fn disable_codes(&self, ids: &[CodeId]) -> AppResult<u64> {
        let mut disabled = 0;
        for &id in ids {
            let now = self.clock.now();
            if self.codes.deactivate(id, now).await? {
                self.codes
                    .append_event(&CodeEvent::new(id, CodeEventKind::Disable, now))
                    .await?;
                disabled += 1;
            }
        }
        info!(requested = ids.len(), disabled, "Disabled codes");
        Ok(disabled)
    }

    /// Load a code by plaintext.
    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<RedeemCode>> {
        self.codes.find_by_hash(&hash_code(code)).await
    }

    /// Load a code by id.
    pub async fn find_by_id(&self, id: CodeId) -> AppResult<Option<RedeemCode>> {
        self.codes.find_by_id(id).await
    }

    /// Event log of a code.
    pub async fn events(&self, id: CodeId) -> AppResult<Vec<CodeEvent>> {
        self.codes.list_events(id).await
    }

    /// Lazy lifecycle check. Returns `true` when the lifecycle has run out,
    /// deactivating the code the first time this is observed.
    pub async fn enforce_lifecycle(&self, code: &RedeemCode) -> AppResult<bool> {
        let now = self.clock.now();
        if !code.is_lifecycle_expired(now) {
            return Ok(false);
        }
        if self.codes.deactivate(code.id, now).await? {
            self.codes
                .append_event(
                    &CodeEvent::new(code.id, CodeEventKind::Expire, now).with_detail("lifecycle ended"),
                )
                .await?;
            info!(code_id = %code.id, "Code lifecycle expired");
        }
        Ok(true)
    }

    async fn expire_if_past_deadline(&self, code: &RedeemCode) -> AppResult<bool> {
        let now = self.clock.now();
        if code.status != CodeStatus::Unused || !code.is_past_redeem_deadline(now) {
            return Ok(false);
        }
        if self.codes.mark_expired(code.id, now).await? {
            self.codes
                .append_event(
                    &CodeEvent::new(code.id, CodeEventKind::Expire, now)
                        .with_detail("redemption deadline passed"),
                )
                .await?;
        }
        Ok(true)
    }

    async fn explain_lost_block(&self, code_hash: &str) -> AppResult<RedeemOutcome> {
        let now = self.clock.now();
        let status = match self.codes.find_by_hash(code_hash).await? {
            None => RedeemStatus::NotFound,
            Some(code) if !code.active => RedeemStatus::Disabled,
            Some(code) => match code.status {
                CodeStatus::Used => RedeemStatus::AlreadyUsed,
                CodeStatus::Expired => RedeemStatus::Expired,
                CodeStatus::Unused if code.is_past_redeem_deadline(now) => RedeemStatus::Expired,
                CodeStatus::Blocked | CodeStatus::Unused => RedeemStatus::InProgress,
            },
        };
        Ok(RedeemOutcome::failure(status))
    }
}

/// Scoped ownership of a `blocked` code.
///
/// Either [`settle`](Self::settle) after the code reached `used`, or
/// [`compensate`](Self::compensate) to return it to `unused`. Dropping an
/// unsettled guard schedules the unblock on the current runtime.
#[derive(Debug)]
pub(crate) struct BlockedCode {
    codes: Arc<dyn CodeRepository>,
    clock: Arc<dyn Clock>,
    code_id: CodeId,
    settled: bool,
}

impl BlockedCode {
    pub(crate) fn new(codes: Arc<dyn CodeRepository>, clock: Arc<dyn Clock>, code_id: CodeId) -> Self {
        Self {
            codes,
            clock,
            code_id,
            settled: false,
        }
    }

    pub(crate) fn settle(mut self) {
        self.settled = true;
    }

    pub(crate) async fn compensate(mut self) -> AppResult<bool> {
        self.settled = true;
        self.codes.unblock(self.code_id, self.clock.now()).await
    }
}

impl Drop for BlockedCode {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let codes = self.codes.clone();
        let code_id = self.code_id;
        let now = self.clock.now();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = codes.unblock(code_id, now).await {
                        error!(code_id = %code_id, error = %e, "Deferred unblock failed");
                    }
                });
            }
            Err(_) => {
                error!(code_id = %code_id, "Blocked code dropped outside a runtime");
            }
        }
    }
}
