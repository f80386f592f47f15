//! Resilient access to the team provider.
//!
//! Every outbound call goes through [`ProviderGateway::call`], which applies
//! bounded exponential retry to retryable failures (429, 5xx, transport) and
//! consults the per-`(endpoint, mother)` circuit breaker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use seatbroker_core::config::ProviderConfig;
use seatbroker_core::error::RemoteError;
use seatbroker_core::traits::provider::{InviteReceipt, RemoteMember, TeamProvider};
use seatbroker_core::types::{Clock, MotherId};
use seatbroker_entity::MotherAccount;

use super::circuit::CircuitBreaker;

/// Endpoint names used as circuit keys.
pub mod endpoint {
    /// Invite a member.
    pub const SEND_INVITE: &str = "send_invite";
    /// Remove a member.
    pub const REMOVE_MEMBER: &str = "remove_member";
    /// List members.
    pub const LIST_MEMBERS: &str = "list_members";
    /// Rename a team.
    pub const RENAME_TEAM: &str = "rename_team";
    /// Cancel a pending invite.
    pub const CANCEL_INVITE: &str = "cancel_invite";
}

/// Provider wrapper with retry and circuit breaking.
#[derive(Debug, Clone)]
pub struct ProviderGateway {
    provider: Arc<dyn TeamProvider>,
    breaker: CircuitBreaker,
    max_retries: u32,
    retry_base: Duration,
    retry_max: Duration,
}

impl ProviderGateway {
    /// Wrap a provider using the configured retry and breaker settings.
    pub fn new(provider: Arc<dyn TeamProvider>, config: &ProviderConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            breaker: CircuitBreaker::new(
                config.circuit_failure_threshold,
                chrono::Duration::seconds(config.circuit_cooldown_seconds),
                clock,
            ),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
            retry_max: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// The circuit breaker table.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invite `email` to the mother's team.
    pub async fn send_invite(
        &self,
        mother: &MotherAccount,
        email: &str,
    ) -> Result<InviteReceipt, RemoteError> {
        self.call(endpoint::SEND_INVITE, mother.id, || {
            self.provider
                .send_invite(&mother.access_token, &mother.team_id, email)
        })
        .await
    }

    /// Remove a member from the mother's team.
    pub async fn remove_member(
        &self,
        mother: &MotherAccount,
        member_id: &str,
    ) -> Result<(), RemoteError> {
        self.call(endpoint::REMOVE_MEMBER, mother.id, || {
            self.provider
                .remove_member(&mother.access_token, &mother.team_id, member_id)
        })
        .await
    }

    /// List the members of the mother's team.
    pub async fn list_members(&self, mother: &MotherAccount) -> Result<Vec<RemoteMember>, RemoteError> {
        self.call(endpoint::LIST_MEMBERS, mother.id, || {
            self.provider
                .list_members(&mother.access_token, &mother.team_id)
        })
        .await
    }

    /// Rename the mother's team.
    pub async fn rename_team(&self, mother: &MotherAccount, name: &str) -> Result<(), RemoteError> {
        self.call(endpoint::RENAME_TEAM, mother.id, || {
            self.provider
                .rename_team(&mother.access_token, &mother.team_id, name)
        })
        .await
    }

    /// Withdraw a pending invite on the mother's team.
    pub async fn cancel_invite(&self, mother: &MotherAccount, email: &str) -> Result<(), RemoteError> {
        self.call(endpoint::CANCEL_INVITE, mother.id, || {
            self.provider
                .cancel_invite(&mother.access_token, &mother.team_id, email)
        })
        .await
    }

    /// Run `op` under the breaker for `(endpoint, mother_id)`, retrying
    /// retryable failures up to `max_retries` times.
    pub async fn call<T, F, Fut>(
        &self,
        endpoint: &str,
        mother_id: MotherId,
        mut op: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        if !self.breaker.try_acquire(endpoint, mother_id).await {
            debug!(endpoint = %endpoint, mother_id = %mother_id, "Circuit open, failing fast");
            return Err(RemoteError::circuit_open(endpoint));
        }

        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success(endpoint, mother_id).await;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        endpoint = %endpoint,
                        mother_id = %mother_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable provider failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        self.breaker.record_failure(endpoint, mother_id).await;
                    } else {
                        self.breaker.record_neutral(endpoint, mother_id).await;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use seatbroker_core::types::ManualClock;

    #[derive(Debug, Default)]
    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        status: u16,
    }

    #[async_trait]
    impl TeamProvider for Flaky {
        async fn send_invite(&self, _: &str, _: &str, _: &str) -> Result<InviteReceipt, RemoteError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(RemoteError::from_status(self.status, "flaky"))
            } else {
                Ok(InviteReceipt::default())
            }
        }

        async fn remove_member(&self, _: &str, _: &str, _: &str) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn list_members(&self, _: &str, _: &str) -> Result<Vec<RemoteMember>, RemoteError> {
            Ok(Vec::new())
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            max_retries: 2,
            retry_base_ms: 1,
            retry_max_ms: 2,
            circuit_failure_threshold: 1,
            circuit_cooldown_seconds: 60,
            ..ProviderConfig::default()
        }
    }

    fn mother() -> MotherAccount {
        let now = Utc::now();
        MotherAccount {
            id: MotherId::new(),
            name: "m1".to_string(),
            group_id: None,
            team_id: "team-1".to_string(),
            team_name: None,
            access_token: "token".to_string(),
            seat_limit: 2,
            status: seatbroker_entity::MotherStatus::Active,
            last_seen_alive_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let provider = Arc::new(Flaky {
            fail_first: 2,
            status: 503,
            ..Flaky::default()
        });
        let gateway = ProviderGateway::new(provider.clone(), &config(), Arc::new(ManualClock::default()));
        assert!(gateway.send_invite(&mother(), "a@example.com").await.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_open_circuit() {
        let provider = Arc::new(Flaky {
            fail_first: u32::MAX,
            status: 500,
            ..Flaky::default()
        });
        let gateway = ProviderGateway::new(provider.clone(), &config(), Arc::new(ManualClock::default()));
        let m = mother();

        let err = gateway.send_invite(&m, "a@example.com").await.unwrap_err();
        assert_eq!(err.status, Some(500));
        let err = gateway.send_invite(&m, "a@example.com").await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_account_errors_are_not_retried() {
        let provider = Arc::new(Flaky {
            fail_first: u32::MAX,
            status: 401,
            ..Flaky::default()
        });
        let gateway = ProviderGateway::new(provider.clone(), &config(), Arc::new(ManualClock::default()));
        let err = gateway.send_invite(&mother(), "a@example.com").await.unwrap_err();
        assert!(err.is_account_invalid());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
