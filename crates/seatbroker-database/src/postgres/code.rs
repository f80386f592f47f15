//! Redeem code repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::CodeId;
use seatbroker_entity::{CodeBinding, CodeEvent, RedeemCode};

use crate::store::CodeRepository;

/// PostgreSQL storage for redeem codes and their event log.
#[derive(Debug, Clone)]
pub struct PgCodeRepository {
    pool: PgPool,
}

impl PgCodeRepository {
    /// Create a new code repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeRepository for PgCodeRepository {
    async fn insert_batch(&self, codes: &[RedeemCode]) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        for code in codes {
            sqlx::query(
                "INSERT INTO redeem_codes (id, code_hash, batch_id, plaintext_prefix, status, active, \
                 expires_at, lifecycle_plan, lifecycle_days, switch_limit, switch_count, refresh_limit, \
                 refresh_used, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(code.id)
            .bind(&code.code_hash)
            .bind(code.batch_id)
            .bind(&code.plaintext_prefix)
            .bind(code.status)
            .bind(code.active)
            .bind(code.expires_at)
            .bind(&code.lifecycle_plan)
            .bind(code.lifecycle_days)
            .bind(code.switch_limit)
            .bind(code.switch_count)
            .bind(code.refresh_limit)
            .bind(code.refresh_used)
            .bind(code.created_at)
            .bind(code.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert code", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit code batch", e))
    }

    async fn find_by_id(&self, id: CodeId) -> AppResult<Option<RedeemCode>> {
        sqlx::query_as::<_, RedeemCode>("SELECT * FROM redeem_codes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find code", e))
    }

    async fn find_by_hash(&self, code_hash: &str) -> AppResult<Option<RedeemCode>> {
        sqlx::query_as::<_, RedeemCode>("SELECT * FROM redeem_codes WHERE code_hash = $1")
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find code by hash", e))
    }

    async fn try_block(&self, code_hash: &str, now: DateTime<Utc>) -> AppResult<Option<RedeemCode>> {
        sqlx::query_as::<_, RedeemCode>(
            "UPDATE redeem_codes SET status = 'blocked', updated_at = $2 \
             WHERE code_hash = $1 AND status = 'unused' AND active \
             AND (expires_at IS NULL OR expires_at > $2) \
             AND (lifecycle_expires_at IS NULL OR lifecycle_expires_at >= $2) \
             RETURNING *",
        )
        .bind(code_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to block code", e))
    }

    async fn unblock(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET status = 'unused', updated_at = $2 \
             WHERE id = $1 AND status = 'blocked'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to unblock code", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_used(
        &self,
        id: CodeId,
        binding: &CodeBinding,
        lifecycle_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET status = 'used', bound_email = $2, \
             bound_team_id = COALESCE(bound_team_id, $3), current_team_id = $3, bound_mother_id = $4, \
             lifecycle_started_at = COALESCE(lifecycle_started_at, $5), \
             lifecycle_expires_at = COALESCE(lifecycle_expires_at, $6), updated_at = $5 \
             WHERE id = $1 AND status = 'blocked'",
        )
        .bind(id)
        .bind(&binding.email)
        .bind(&binding.team_id)
        .bind(binding.mother_id)
        .bind(now)
        .bind(lifecycle_expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to mark code used", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_expired(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET status = 'expired', updated_at = $2 \
             WHERE id = $1 AND status = 'unused' AND expires_at IS NOT NULL AND expires_at <= $2",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to expire code", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET active = FALSE, updated_at = $2 WHERE id = $1 AND active",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to deactivate code", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_switch(
        &self,
        id: CodeId,
        expected_switch_count: i32,
        binding: &CodeBinding,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET switch_count = switch_count + 1, bound_email = $2, \
             current_team_id = $3, bound_mother_id = $4, updated_at = $5 \
             WHERE id = $1 AND status = 'used' AND active AND switch_count = $6 \
             AND switch_count < switch_limit",
        )
        .bind(id)
        .bind(&binding.email)
        .bind(&binding.team_id)
        .bind(binding.mother_id)
        .bind(now)
        .bind(expected_switch_count)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to record switch", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_refresh(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE redeem_codes SET refresh_used = refresh_used + 1, last_refreshed_at = $2, \
             updated_at = $2 WHERE id = $1 AND refresh_used < refresh_limit",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to record refresh", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_reserved(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM redeem_codes \
             WHERE status = 'unused' AND (expires_at IS NULL OR expires_at > $1)",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count reserved codes", e))?;
        Ok(count.max(0) as u64)
    }

    async fn append_event(&self, event: &CodeEvent) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO code_events (id, code_id, kind, email, team_id, mother_id, detail, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(event.code_id)
        .bind(event.kind)
        .bind(&event.email)
        .bind(&event.team_id)
        .bind(event.mother_id)
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to append code event", e))?;
        Ok(())
    }

    async fn list_events(&self, code_id: CodeId) -> AppResult<Vec<CodeEvent>> {
        sqlx::query_as::<_, CodeEvent>(
            "SELECT * FROM code_events WHERE code_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(code_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list code events", e))
    }
}
