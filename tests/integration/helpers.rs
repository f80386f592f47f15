//! Shared test helpers for integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_coordination::CoordinationManager;
use seatbroker_core::config::AppConfig;
use seatbroker_core::error::{AppError, RemoteError};
use seatbroker_core::result::AppResult;
use seatbroker_core::traits::{InviteReceipt, RemoteMember, TeamProvider};
use seatbroker_core::types::{Clock, CodeId, GroupId, ManualClock, MotherId, SeatId};
use seatbroker_database::{HoldOutcome, Repositories, SeatRepository};
use seatbroker_entity::{MotherAccount, MotherStatus, RedeemCode, SeatAllocation, SkuDefaults};
use seatbroker_service::Engine;
use seatbroker_worker::{JobQueue, WorkerRunner};

/// Scripted team provider recording every call.
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    invites: Vec<(String, String)>,
    cancelled: Vec<(String, String)>,
    removed: Vec<(String, String)>,
    renamed: Vec<(String, String)>,
    members: HashMap<String, Vec<RemoteMember>>,
    failures: HashMap<String, u16>,
    invite_delay: Option<Duration>,
    next_invite: u64,
}

impl FakeProvider {
    /// Make every call against `team_id` answer with `status`.
    pub fn fail_team(&self, team_id: &str, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(team_id.to_string(), status);
    }

    /// Make every invite wait for `delay` before answering.
    pub fn delay_invites(&self, delay: Duration) {
        self.state.lock().unwrap().invite_delay = Some(delay);
    }

    /// Stop failing calls against `team_id`.
    pub fn heal_team(&self, team_id: &str) {
        self.state.lock().unwrap().failures.remove(team_id);
    }

    /// Replace the remote member list of a team.
    pub fn set_members(&self, team_id: &str, emails: &[&str]) {
        let members = emails
            .iter()
            .enumerate()
            .map(|(i, email)| RemoteMember {
                email: email.to_string(),
                member_id: format!("member-{i}"),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .members
            .insert(team_id.to_string(), members);
    }

    /// Emails invited to a team, in call order.
    pub fn invites_for(&self, team_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .invites
            .iter()
            .filter(|(team, _)| team == team_id)
            .map(|(_, email)| email.clone())
            .collect()
    }

    /// `(team, email)` pairs whose invites were cancelled.
    pub fn cancelled(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// `(team, member_id)` pairs removed.
    pub fn removed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().removed.clone()
    }

    /// `(team, name)` renames.
    pub fn renamed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().renamed.clone()
    }

    fn check(&self, team_id: &str) -> Result<(), RemoteError> {
        match self.state.lock().unwrap().failures.get(team_id) {
            Some(status) => Err(RemoteError::from_status(*status, "scripted failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TeamProvider for FakeProvider {
    async fn send_invite(
        &self,
        _token: &str,
        team_id: &str,
        email: &str,
    ) -> Result<InviteReceipt, RemoteError> {
        let delay = self.state.lock().unwrap().invite_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(team_id)?;
        let mut state = self.state.lock().unwrap();
        state.next_invite += 1;
        let invite_id = format!("inv-{}", state.next_invite);
        state.invites.push((team_id.to_string(), email.to_string()));
        Ok(InviteReceipt {
            invite_id: Some(invite_id),
            member_id: None,
        })
    }

    async fn remove_member(
        &self,
        _token: &str,
        team_id: &str,
        member_id: &str,
    ) -> Result<(), RemoteError> {
        self.check(team_id)?;
        let mut state = self.state.lock().unwrap();
        if let Some(members) = state.members.get_mut(team_id) {
            members.retain(|m| m.member_id != member_id);
        }
        state
            .removed
            .push((team_id.to_string(), member_id.to_string()));
        Ok(())
    }

    async fn list_members(
        &self,
        _token: &str,
        team_id: &str,
    ) -> Result<Vec<RemoteMember>, RemoteError> {
        self.check(team_id)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn rename_team(&self, _token: &str, team_id: &str, name: &str) -> Result<(), RemoteError> {
        self.check(team_id)?;
        self.state
            .lock()
            .unwrap()
            .renamed
            .push((team_id.to_string(), name.to_string()));
        Ok(())
    }

    async fn cancel_invite(
        &self,
        _token: &str,
        team_id: &str,
        email: &str,
    ) -> Result<(), RemoteError> {
        self.check(team_id)?;
        self.state
            .lock()
            .unwrap()
            .cancelled
            .push((team_id.to_string(), email.to_string()));
        Ok(())
    }
}

/// Seat storage that can be told to fail every release.
#[derive(Debug)]
pub struct FlakySeats {
    inner: Arc<dyn SeatRepository>,
    fail_release: AtomicBool,
}

impl FlakySeats {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn SeatRepository>) -> Self {
        Self {
            inner,
            fail_release: AtomicBool::new(false),
        }
    }

    /// Make `release` answer with a database error.
    pub fn fail_releases(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SeatRepository for FlakySeats {
    async fn ensure_slots(&self, mother_id: MotherId, seat_limit: i32, now: DateTime<Utc>) -> AppResult<(u64, u64)> {
        self.inner.ensure_slots(mother_id, seat_limit, now).await
    }

    async fn find_by_id(&self, id: SeatId) -> AppResult<Option<SeatAllocation>> {
        self.inner.find_by_id(id).await
    }

    async fn find_free_seat(&self, mother_id: MotherId) -> AppResult<Option<SeatAllocation>> {
        self.inner.find_free_seat(mother_id).await
    }

    async fn find_active_by_email(&self, team_id: &str, email: &str) -> AppResult<Option<SeatAllocation>> {
        self.inner.find_active_by_email(team_id, email).await
    }

    async fn hold(
        &self,
        seat_id: SeatId,
        team_id: &str,
        email: &str,
        code_id: Option<CodeId>,
        held_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<HoldOutcome> {
        self.inner
            .hold(seat_id, team_id, email, code_id, held_until, now)
            .await
    }

    async fn commit(
        &self,
        seat_id: SeatId,
        invite_request_id: Option<&str>,
        member_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.inner.commit(seat_id, invite_request_id, member_id, now).await
    }

    async fn release(&self, seat_id: SeatId, now: DateTime<Utc>) -> AppResult<bool> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(AppError::database("scripted release failure"));
        }
        self.inner.release(seat_id, now).await
    }

    async fn sweep_stale_holds(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.sweep_stale_holds(now).await
    }

    async fn count_occupied(&self, mother_id: MotherId) -> AppResult<u64> {
        self.inner.count_occupied(mother_id).await
    }

    async fn count_free(&self, mother_id: MotherId) -> AppResult<u64> {
        self.inner.count_free(mother_id).await
    }

    async fn list_for_mother(&self, mother_id: MotherId) -> AppResult<Vec<SeatAllocation>> {
        self.inner.list_for_mother(mother_id).await
    }

    async fn release_all_for_mother(&self, mother_id: MotherId, now: DateTime<Utc>) -> AppResult<u64> {
        self.inner.release_all_for_mother(mother_id, now).await
    }

    async fn occupy_for_member(
        &self,
        mother_id: MotherId,
        team_id: &str,
        email: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SeatAllocation>> {
        self.inner
            .occupy_for_member(mother_id, team_id, email, member_id, now)
            .await
    }
}

/// Configuration with fast provider retries.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.provider = "memory".to_string();
    config.provider.max_retries = 1;
    config.provider.retry_base_ms = 1;
    config.provider.retry_max_ms = 2;
    config.worker.backoff_base_seconds = 5;
    config.worker.backoff_max_seconds = 60;
    config
}

/// SKU with the given switch and refresh budgets and no lifecycle.
pub fn sku(switch_limit: i32, refresh_limit: i32) -> SkuDefaults {
    SkuDefaults {
        lifecycle_plan: None,
        lifecycle_days: None,
        switch_limit,
        refresh_limit,
    }
}

/// Engine over in-memory repositories, a manual clock and a fake provider.
pub struct TestEngine {
    /// The engine under test.
    pub engine: Engine,
    /// Clock shared by every component.
    pub clock: Arc<ManualClock>,
    /// Provider double.
    pub provider: Arc<FakeProvider>,
    /// Configuration the engine was built from.
    pub config: AppConfig,
}

impl TestEngine {
    /// Create a new test engine with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a new test engine.
    pub fn with_config(config: AppConfig) -> Self {
        Self::with_repos(config, Repositories::memory())
    }

    /// Create a new test engine over the given repositories.
    pub fn with_repos(config: AppConfig, repos: Repositories) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let provider = Arc::new(FakeProvider::default());
        let coordination = CoordinationManager::memory(clock.clone());
        let engine = Engine::new(
            &config,
            repos,
            &coordination,
            provider.clone(),
            clock.clone(),
        );
        Self {
            engine,
            clock,
            provider,
            config,
        }
    }

    /// Current test time.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register an active mother with `seat_limit` seats.
    pub async fn add_mother(&self, seat_limit: i32) -> MotherAccount {
        self.add_mother_in_group(seat_limit, None).await
    }

    /// Register an active mother belonging to `group_id`.
    pub async fn add_mother_in_group(&self, seat_limit: i32, group_id: Option<GroupId>) -> MotherAccount {
        let now = self.clock.now();
        let id = MotherId::new();
        let mother = MotherAccount {
            id,
            name: format!("mother-{id}"),
            group_id,
            team_id: format!("team-{}", id.into_uuid().simple()),
            team_name: None,
            access_token: "token".to_string(),
            seat_limit,
            status: MotherStatus::Active,
            last_seen_alive_at: None,
            created_at: now,
            updated_at: now,
        };
        self.engine
            .pool
            .register_mother(&mother)
            .await
            .expect("register mother");
        mother
    }

    /// Reload a mother.
    pub async fn mother(&self, id: MotherId) -> MotherAccount {
        self.engine
            .repos
            .mothers
            .find_by_id(id)
            .await
            .expect("load mother")
            .expect("mother exists")
    }

    /// Generate codes with three switches and three refreshes.
    pub async fn generate(&self, count: u32) -> Vec<String> {
        self.generate_with(count, sku(3, 3)).await
    }

    /// Generate codes with the given SKU.
    pub async fn generate_with(&self, count: u32, sku: SkuDefaults) -> Vec<String> {
        self.engine
            .ledger
            .generate_codes(count, None, None, sku)
            .await
            .expect("generate codes")
            .codes
    }

    /// Reload a code by plaintext.
    pub async fn code(&self, plaintext: &str) -> RedeemCode {
        self.engine
            .ledger
            .find_by_code(plaintext)
            .await
            .expect("load code")
            .expect("code exists")
    }

    /// A job queue sharing the engine's lock and clock.
    pub fn queue(&self) -> Arc<JobQueue> {
        Arc::new(JobQueue::new(
            self.engine.repos.jobs.clone(),
            self.engine.lock.clone(),
            self.clock.clone(),
            self.config.worker.clone(),
            "test-worker".to_string(),
            Duration::from_secs(5),
        ))
    }

    /// A runner over `queue` with every job handler registered.
    pub fn runner(&self, queue: Arc<JobQueue>) -> WorkerRunner {
        WorkerRunner::new(
            queue,
            Arc::new(seatbroker_worker::default_executor(&self.engine)),
            self.config.worker.clone(),
        )
    }
}
