//! Switch request repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{CodeId, MotherId, SwitchRequestId};
use seatbroker_entity::{SwitchRequest, SwitchStatus};

use crate::store::SwitchRepository;

/// PostgreSQL storage for queued switches.
#[derive(Debug, Clone)]
pub struct PgSwitchRepository {
    pool: PgPool,
}

impl PgSwitchRepository {
    /// Create a new switch request repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Advisory lock key serializing writers of one `(code, email)` pair.
fn pair_lock_key(code_id: CodeId, email: &str) -> String {
    format!("switch:{code_id}:{email}")
}

const SUPERSEDED: &str = "superseded by a newer pending request";

async fn lock_pair(
    tx: &mut Transaction<'_, Postgres>,
    code_id: CodeId,
    email: &str,
) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(pair_lock_key(code_id, email))
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock switch pair", e))?;
    Ok(())
}

impl PgSwitchRepository {
    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))
    }

    async fn requeue_one(
        &self,
        id: SwitchRequestId,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SwitchStatus>> {
        let Some(request) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut tx = self.begin().await?;
        lock_pair(&mut tx, request.redeem_code_id, &request.email).await?;

        let has_pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM switch_requests \
             WHERE redeem_code_id = $1 AND email = $2 AND status = 'pending' AND id <> $3)",
        )
        .bind(request.redeem_code_id)
        .bind(&request.email)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check pending switch", e))?;

        let (status, error) = if has_pending {
            (SwitchStatus::Failed, SUPERSEDED)
        } else {
            (SwitchStatus::Pending, last_error)
        };
        let result = sqlx::query(
            "UPDATE switch_requests SET status = $2, last_error = $3, updated_at = $4 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to requeue switch request", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit requeue", e))?;
        Ok((result.rows_affected() == 1).then_some(status))
    }
}

#[async_trait]
impl SwitchRepository for PgSwitchRepository {
    async fn upsert_pending(
        &self,
        code_id: CodeId,
        email: &str,
        reason: &str,
        mother_id_prev: Option<MotherId>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<SwitchRequest> {
        let mut tx = self.begin().await?;
        lock_pair(&mut tx, code_id, email).await?;

        let request = sqlx::query_as::<_, SwitchRequest>(
            "INSERT INTO switch_requests (id, redeem_code_id, email, status, reason, attempts, \
             queued_at, expires_at, mother_id_prev, updated_at) \
             VALUES ($1, $2, $3, 'pending', $4, 0, $5, $6, $7, $5) \
             ON CONFLICT (redeem_code_id, email) WHERE status = 'pending' \
             DO UPDATE SET reason = EXCLUDED.reason, queued_at = EXCLUDED.queued_at, \
             expires_at = EXCLUDED.expires_at, \
             mother_id_prev = COALESCE(EXCLUDED.mother_id_prev, switch_requests.mother_id_prev), \
             updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(SwitchRequestId::new())
        .bind(code_id)
        .bind(email)
        .bind(reason)
        .bind(now)
        .bind(expires_at)
        .bind(mother_id_prev)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert switch request", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit switch request", e))?;
        Ok(request)
    }

    async fn find_pending(&self, code_id: CodeId, email: &str) -> AppResult<Option<SwitchRequest>> {
        sqlx::query_as::<_, SwitchRequest>(
            "SELECT * FROM switch_requests \
             WHERE redeem_code_id = $1 AND email = $2 AND status = 'pending'",
        )
        .bind(code_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find switch request", e))
    }

    async fn find_by_id(&self, id: SwitchRequestId) -> AppResult<Option<SwitchRequest>> {
        sqlx::query_as::<_, SwitchRequest>("SELECT * FROM switch_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find switch request", e))
    }

    async fn list_pending(&self, limit: u32) -> AppResult<Vec<SwitchRequest>> {
        sqlx::query_as::<_, SwitchRequest>(
            "SELECT * FROM switch_requests WHERE status = 'pending' \
             ORDER BY queued_at ASC, id ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list switch requests", e))
    }

    async fn claim(&self, id: SwitchRequestId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE switch_requests SET status = 'running', attempts = attempts + 1, updated_at = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim switch request", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn resolve_succeeded(
        &self,
        code_id: CodeId,
        email: &str,
        mother_id_next: Option<MotherId>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE switch_requests SET status = 'succeeded', mother_id_next = $3, \
             last_error = NULL, updated_at = $4 \
             WHERE redeem_code_id = $1 AND email = $2 AND status IN ('pending', 'running')",
        )
        .bind(code_id)
        .bind(email)
        .bind(mother_id_next)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to resolve switch request", e))?;
        Ok(result.rows_affected())
    }

    async fn set_status(
        &self,
        id: SwitchRequestId,
        status: SwitchStatus,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE switch_requests SET status = $2, last_error = COALESCE($3, last_error), \
             updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(last_error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update switch request", e))?;
        Ok(())
    }

    async fn requeue(
        &self,
        id: SwitchRequestId,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SwitchStatus>> {
        self.requeue_one(id, last_error, now).await
    }

    async fn reclaim_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let stale: Vec<SwitchRequestId> = sqlx::query_scalar(
            "SELECT id FROM switch_requests WHERE status = 'running' AND updated_at < $1",
        )
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list stale switch requests", e))?;

        let mut reclaimed = 0u64;
        for id in stale {
            if self.requeue_one(id, "claim lease expired", now).await?.is_some() {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
