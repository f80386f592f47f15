//! Repository traits for every persisted aggregate.
//!
//! Callers pass `now` explicitly so that both implementations agree with the
//! injected [`Clock`](seatbroker_core::types::Clock). Methods returning `bool`
//! report whether the conditional update matched a row; a `false` is an
//! ordinary lost race, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{CodeId, GroupId, JobId, MotherId, SeatId, SwitchRequestId};
use seatbroker_entity::{
    BatchJob, CodeBinding, CodeEvent, JobType, MotherAccount, MotherGroup, RedeemCode,
    SeatAllocation, SwitchRequest, SwitchStatus,
};

use crate::memory::MemoryStore;
use crate::postgres::{
    PgCodeRepository, PgJobRepository, PgMotherRepository, PgSeatRepository, PgSwitchRepository,
};

/// Redeem code ledger storage.
#[async_trait]
pub trait CodeRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert freshly generated codes in one unit of work.
    async fn insert_batch(&self, codes: &[RedeemCode]) -> AppResult<()>;

    /// Find a code by id.
    async fn find_by_id(&self, id: CodeId) -> AppResult<Option<RedeemCode>>;

    /// Find a code by its hash.
    async fn find_by_hash(&self, code_hash: &str) -> AppResult<Option<RedeemCode>>;

    /// `unused -> blocked` for an active, unexpired code. Exactly one
    /// concurrent caller receives the row.
    async fn try_block(&self, code_hash: &str, now: DateTime<Utc>) -> AppResult<Option<RedeemCode>>;

    /// `blocked -> unused` compensation.
    async fn unblock(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool>;

    /// `blocked -> used`, stamping the binding and starting the lifecycle.
    async fn mark_used(
        &self,
        id: CodeId,
        binding: &CodeBinding,
        lifecycle_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// `unused -> expired` once the redemption deadline has passed.
    async fn mark_expired(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Clear the `active` flag. Returns `false` if it was already cleared.
    async fn deactivate(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Move a used code to a new binding, consuming one switch.
    /// Fails the condition once `switch_count` reaches `switch_limit`, or when
    /// `switch_count` no longer equals `expected_switch_count` because another
    /// switch committed first.
    async fn record_switch(
        &self,
        id: CodeId,
        expected_switch_count: i32,
        binding: &CodeBinding,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Consume one refresh. Fails the condition once the limit is reached.
    async fn record_refresh(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Unused codes whose redemption deadline has not passed.
    async fn count_reserved(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Append to the code event log.
    async fn append_event(&self, event: &CodeEvent) -> AppResult<()>;

    /// Events for one code, oldest first.
    async fn list_events(&self, code_id: CodeId) -> AppResult<Vec<CodeEvent>>;
}

/// Result of trying to hold a seat.
#[derive(Debug, Clone)]
pub enum HoldOutcome {
    /// The seat is now held by the caller.
    Held(SeatAllocation),
    /// Somebody else took the seat first.
    Unavailable,
    /// The `(team_id, email)` pair already holds or uses a seat.
    AlreadyAssigned,
}

/// Seat pool storage.
#[async_trait]
pub trait SeatRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Grow the mother's rows up to `seat_limit` and delete free rows at or
    /// above it. Returns `(created, removed)`.
    async fn ensure_slots(
        &self,
        mother_id: MotherId,
        seat_limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<(u64, u64)>;

    /// Find a seat by id.
    async fn find_by_id(&self, id: SeatId) -> AppResult<Option<SeatAllocation>>;

    /// Lowest free slot on a mother.
    async fn find_free_seat(&self, mother_id: MotherId) -> AppResult<Option<SeatAllocation>>;

    /// The held or used seat for `(team_id, email)`.
    async fn find_active_by_email(
        &self,
        team_id: &str,
        email: &str,
    ) -> AppResult<Option<SeatAllocation>>;

    /// `free -> held`. The `(team_id, email)` uniqueness check runs in the
    /// same unit of work as the update.
    async fn hold(
        &self,
        seat_id: SeatId,
        team_id: &str,
        email: &str,
        code_id: Option<CodeId>,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<HoldOutcome>;

    /// `held -> used`.
    async fn commit(
        &self,
        seat_id: SeatId,
        invite_request_id: Option<&str>,
        member_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// `held | used -> free`, clearing every binding field.
    async fn release(&self, seat_id: SeatId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Release held seats whose `held_until` is before `now`.
    async fn sweep_stale_holds(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Held plus used seats on a mother.
    async fn count_occupied(&self, mother_id: MotherId) -> AppResult<u64>;

    /// Free seats on a mother.
    async fn count_free(&self, mother_id: MotherId) -> AppResult<u64>;

    /// All seat rows of a mother ordered by slot.
    async fn list_for_mother(&self, mother_id: MotherId) -> AppResult<Vec<SeatAllocation>>;

    /// Release every occupied seat of a mother.
    async fn release_all_for_mother(&self, mother_id: MotherId, now: DateTime<Utc>) -> AppResult<u64>;

    /// Mark a free seat `used` for a member discovered remotely, unless the
    /// pair already occupies a seat. `None` when nothing was written.
    async fn occupy_for_member(
        &self,
        mother_id: MotherId,
        team_id: &str,
        email: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SeatAllocation>>;
}

/// Mother account storage.
#[async_trait]
pub trait MotherRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Provision a mother account.
    async fn insert(&self, mother: &MotherAccount) -> AppResult<()>;

    /// Find a mother by id.
    async fn find_by_id(&self, id: MotherId) -> AppResult<Option<MotherAccount>>;

    /// Every mother with `status = active`.
    async fn list_active(&self) -> AppResult<Vec<MotherAccount>>;

    /// `active -> invalid`. Returns `false` if it was not active.
    async fn mark_invalid(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Record a successful provider contact.
    async fn touch_alive(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<()>;

    /// Record the remote team name.
    async fn set_team_name(&self, id: MotherId, name: &str, now: DateTime<Utc>) -> AppResult<()>;

    /// Create a naming group.
    async fn insert_group(&self, group: &MotherGroup) -> AppResult<()>;

    /// Find a naming group.
    async fn find_group(&self, id: GroupId) -> AppResult<Option<MotherGroup>>;
}

/// Switch request storage.
#[async_trait]
pub trait SwitchRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert or refresh the single pending request for `(code_id, email)`.
    async fn upsert_pending(
        &self,
        code_id: CodeId,
        email: &str,
        reason: &str,
        mother_id_prev: Option<MotherId>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<SwitchRequest>;

    /// The pending request for a pair, if any.
    async fn find_pending(&self, code_id: CodeId, email: &str) -> AppResult<Option<SwitchRequest>>;

    /// Find a request by id.
    async fn find_by_id(&self, id: SwitchRequestId) -> AppResult<Option<SwitchRequest>>;

    /// Oldest pending requests first.
    async fn list_pending(&self, limit: u32) -> AppResult<Vec<SwitchRequest>>;

    /// `pending -> running`, counting an attempt.
    async fn claim(&self, id: SwitchRequestId, now: DateTime<Utc>) -> AppResult<bool>;

    /// Resolve every open (pending or running) request of a pair to `succeeded`.
    async fn resolve_succeeded(
        &self,
        code_id: CodeId,
        email: &str,
        mother_id_next: Option<MotherId>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Set the status of one request, recording an optional error.
    async fn set_status(
        &self,
        id: SwitchRequestId,
        status: SwitchStatus,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// `running -> pending` for a request that could not complete.
    ///
    /// When the pair already has a newer pending request, this one is closed
    /// as `failed` instead so at most one pending row exists per pair.
    /// Returns the resulting status, or `None` if the request was no longer
    /// running.
    async fn requeue(
        &self,
        id: SwitchRequestId,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SwitchStatus>>;

    /// Requeue running requests whose claim is older than `claimed_before`.
    async fn reclaim_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending jobs.
    pub pending: u64,
    /// Running jobs.
    pub running: u64,
    /// Succeeded jobs.
    pub succeeded: u64,
    /// Failed jobs.
    pub failed: u64,
}

/// Batch job storage.
#[async_trait]
pub trait JobRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a pending job.
    async fn insert(&self, job: &BatchJob) -> AppResult<()>;

    /// Find a job by id.
    async fn find_by_id(&self, id: JobId) -> AppResult<Option<BatchJob>>;

    /// Pending or running jobs of a type.
    async fn find_active_by_type(&self, job_type: JobType) -> AppResult<Vec<BatchJob>>;

    /// Lease the next claimable job: pending and visible, or running with an
    /// expired lease.
    async fn claim_next(
        &self,
        worker_id: &str,
        lease_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BatchJob>>;

    /// `running -> succeeded` if `worker_id` still holds the lease.
    async fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result: Option<&serde_json::Value>,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// `running -> pending` with a new attempt count, invisible until `retry_at`.
    async fn reschedule(
        &self,
        id: JobId,
        worker_id: &str,
        attempts: i32,
        retry_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// `running -> failed` for good.
    async fn fail(
        &self,
        id: JobId,
        worker_id: &str,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Counts by status.
    async fn stats(&self) -> AppResult<QueueStats>;
}

/// All repositories behind trait objects, constructed once and shared.
#[derive(Debug, Clone)]
pub struct Repositories {
    /// Redeem codes and their event log.
    pub codes: Arc<dyn CodeRepository>,
    /// Seat pool.
    pub seats: Arc<dyn SeatRepository>,
    /// Mother accounts and groups.
    pub mothers: Arc<dyn MotherRepository>,
    /// Switch requests.
    pub switches: Arc<dyn SwitchRepository>,
    /// Batch jobs.
    pub jobs: Arc<dyn JobRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            codes: Arc::new(PgCodeRepository::new(pool.clone())),
            seats: Arc::new(PgSeatRepository::new(pool.clone())),
            mothers: Arc::new(PgMotherRepository::new(pool.clone())),
            switches: Arc::new(PgSwitchRepository::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::new(pool)),
        }
    }

    /// In-memory repositories sharing one store.
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    /// Repositories over an existing in-memory store.
    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            codes: Arc::new(store.clone()),
            seats: Arc::new(store.clone()),
            mothers: Arc::new(store.clone()),
            switches: Arc::new(store.clone()),
            jobs: Arc::new(store),
        }
    }
}
