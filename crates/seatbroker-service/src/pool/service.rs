//! Pool sync and batch invite operations.
//!
//! Every operation here is idempotent: renaming is skipped when the team
//! already follows its group pattern, seat rows are only added up to the
//! limit, and remote members are adopted once per `(mother, email)`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use seatbroker_core::error::{AppError, RemoteError};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{Clock, GroupId, MotherId};
use seatbroker_database::MotherRepository;
use seatbroker_entity::{InviteTarget, MotherAccount, MotherStatus};

use crate::provider::ProviderGateway;
use crate::seat::SeatAllocator;

/// What a pool sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSyncReport {
    /// Whether the team was renamed.
    pub renamed: bool,
    /// Seat rows created.
    pub seats_created: u64,
    /// Free seat rows removed.
    pub seats_removed: u64,
    /// Remote members given a local seat.
    pub members_adopted: u64,
    /// Remote members already present locally or without room.
    pub members_skipped: u64,
    /// Whether the mother was found invalid during the sync.
    pub invalidated: bool,
}

/// Success and failure counts of a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    /// Targets in the batch.
    pub total: u64,
    /// Targets handled.
    pub succeeded: u64,
    /// Targets that failed.
    pub failed: u64,
}

impl BatchCounts {
    /// Whether anything failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Pool maintenance service.
#[derive(Debug, Clone)]
pub struct PoolService {
    allocator: SeatAllocator,
    mothers: Arc<dyn MotherRepository>,
    gateway: ProviderGateway,
    clock: Arc<dyn Clock>,
}

impl PoolService {
    /// Creates a new pool service.
    pub fn new(
        allocator: SeatAllocator,
        mothers: Arc<dyn MotherRepository>,
        gateway: ProviderGateway,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            allocator,
            mothers,
            gateway,
            clock,
        }
    }

    /// Active mothers, for scheduling syncs.
    pub async fn active_mothers(&self) -> AppResult<Vec<MotherAccount>> {
        self.mothers.list_active().await
    }

    /// Register a new mother account and provision its seat rows.
    pub async fn register_mother(&self, mother: &MotherAccount) -> AppResult<()> {
        if mother.seat_limit < 0 {
            return Err(AppError::validation("Seat limit must be non-negative"));
        }
        self.mothers.insert(mother).await?;
        self.allocator.provision(mother).await?;
        info!(mother_id = %mother.id, seat_limit = mother.seat_limit, "Mother registered");
        Ok(())
    }

    /// Reconcile one mother with its remote team.
    pub async fn sync_mother(&self, mother_id: MotherId, group_id: Option<GroupId>) -> AppResult<PoolSyncReport> {
        let mut report = PoolSyncReport::default();
        let mother = self
            .mothers
            .find_by_id(mother_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Mother {mother_id} not found")))?;
        if mother.status != MotherStatus::Active {
            debug!(mother_id = %mother_id, status = ?mother.status, "Skipping sync of inactive mother");
            return Ok(report);
        }

        match self.rename_if_needed(&mother, group_id.or(mother.group_id)).await? {
            Ok(renamed) => report.renamed = renamed,
            Err(err) if err.is_account_invalid() => return self.invalidated(mother_id, report).await,
            Err(err) => return Err(err.into()),
        }

        let members = match self.gateway.list_members(&mother).await {
            Ok(members) => members,
            Err(err) if err.is_account_invalid() => return self.invalidated(mother_id, report).await,
            Err(err) => return Err(err.into()),
        };
        self.mothers.touch_alive(mother_id, self.clock.now()).await?;

        let (created, removed) = self.allocator.provision(&mother).await?;
        report.seats_created = created;
        report.seats_removed = removed;

        for member in members {
            let email = member.email.trim().to_lowercase();
            if self.allocator.adopt_member(&mother, &email, &member.member_id).await? {
                report.members_adopted += 1;
            } else {
                report.members_skipped += 1;
            }
        }

        info!(
            mother_id = %mother_id,
            renamed = report.renamed,
            seats_created = report.seats_created,
            seats_removed = report.seats_removed,
            members_adopted = report.members_adopted,
            "Mother synced"
        );
        Ok(report)
    }

    /// Re-send invites.
    pub async fn resend_invites(&self, targets: &[InviteTarget]) -> AppResult<BatchCounts> {
        self.for_each_target(targets, "resend", |mother, email| async move {
            self.gateway.send_invite(&mother, &email).await?;
            Ok::<(), AppError>(())
        })
        .await
    }

    /// Withdraw pending invites and free their seats.
    pub async fn cancel_invites(&self, targets: &[InviteTarget]) -> AppResult<BatchCounts> {
        self.for_each_target(targets, "cancel", |mother, email| async move {
            self.gateway.cancel_invite(&mother, &email).await?;
            self.release_local(&mother, &email).await?;
            Ok::<(), AppError>(())
        })
        .await
    }

    /// Remove members from their teams and free their seats.
    pub async fn remove_members(&self, targets: &[InviteTarget]) -> AppResult<BatchCounts> {
        self.for_each_target(targets, "remove", |mother, email| async move {
            let seat = self.allocator.find_active(&mother.team_id, &email).await?;
            match seat.and_then(|s| s.member_id) {
                Some(member_id) => self.gateway.remove_member(&mother, &member_id).await?,
                None => self.gateway.cancel_invite(&mother, &email).await?,
            }
            self.release_local(&mother, &email).await?;
            Ok::<(), AppError>(())
        })
        .await
    }

    async fn for_each_target<F, Fut>(
        &self,
        targets: &[InviteTarget],
        action: &str,
        op: F,
    ) -> AppResult<BatchCounts>
    where
        F: Fn(MotherAccount, String) -> Fut,
        Fut: std::future::Future<Output = AppResult<()>>,
    {
        let mut counts = BatchCounts {
            total: targets.len() as u64,
            ..BatchCounts::default()
        };
        for target in targets {
            let Some(mother) = self.mothers.find_by_id(target.mother_id).await? else {
                warn!(mother_id = %target.mother_id, action = %action, "Batch target references unknown mother");
                counts.failed += 1;
                continue;
            };
            let email = target.email.trim().to_lowercase();
            match op(mother.clone(), email).await {
                Ok(()) => counts.succeeded += 1,
                Err(err) if err.remote_status() == Some(404) => {
                    debug!(mother_id = %mother.id, action = %action, "Target already gone remotely");
                    counts.succeeded += 1;
                }
                Err(err) => {
                    if matches!(err.remote_status(), Some(401 | 403)) {
                        self.allocator.invalidate_mother(mother.id).await?;
                    }
                    warn!(mother_id = %mother.id, action = %action, error = %err, "Batch target failed");
                    counts.failed += 1;
                }
            }
        }
        info!(action = %action, total = counts.total, succeeded = counts.succeeded, failed = counts.failed, "Batch finished");
        Ok(counts)
    }

    async fn rename_if_needed(
        &self,
        mother: &MotherAccount,
        group_id: Option<GroupId>,
    ) -> AppResult<Result<bool, RemoteError>> {
        let Some(group_id) = group_id else {
            return Ok(Ok(false));
        };
        let Some(group) = self.mothers.find_group(group_id).await? else {
            return Ok(Ok(false));
        };
        if mother
            .team_name
            .as_deref()
            .is_some_and(|name| group.matches_pattern(name))
        {
            return Ok(Ok(false));
        }

        let target = group.target_team_name(mother.id);
        match self.gateway.rename_team(mother, &target).await {
            Ok(()) => {}
            Err(err) if err.is_unsupported() => return Ok(Ok(false)),
            Err(err) => return Ok(Err(err)),
        }
        self.mothers
            .set_team_name(mother.id, &target, self.clock.now())
            .await?;
        Ok(Ok(true))
    }

    async fn release_local(&self, mother: &MotherAccount, email: &str) -> AppResult<()> {
        if let Some(seat) = self.allocator.find_active(&mother.team_id, email).await? {
            self.allocator.release(seat.id).await?;
        }
        Ok(())
    }

    async fn invalidated(&self, mother_id: MotherId, mut report: PoolSyncReport) -> AppResult<PoolSyncReport> {
        self.allocator.invalidate_mother(mother_id).await?;
        report.invalidated = true;
        Ok(report)
    }
}
