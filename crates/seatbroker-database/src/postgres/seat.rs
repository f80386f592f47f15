//! Seat allocation repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{CodeId, MotherId, SeatId};
use seatbroker_entity::SeatAllocation;

use crate::store::{HoldOutcome, SeatRepository};

/// PostgreSQL storage for the seat pool.
#[derive(Debug, Clone)]
pub struct PgSeatRepository {
    pool: PgPool,
}

impl PgSeatRepository {
    /// Create a new seat repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Advisory lock key serializing holds for one mailbox on one team.
fn mailbox_lock_key(team_id: &str, email: &str) -> String {
    format!("seat:{team_id}:{email}")
}

#[async_trait]
impl SeatRepository for PgSeatRepository {
    async fn ensure_slots(
        &self,
        mother_id: MotherId,
        seat_limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<(u64, u64)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        let existing: Vec<i32> = sqlx::query_scalar(
            "SELECT slot_index FROM seat_allocations WHERE mother_id = $1 FOR UPDATE",
        )
        .bind(mother_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list slots", e))?;

        let mut created = 0u64;
        for slot in 0..seat_limit.max(0) {
            if existing.contains(&slot) {
                continue;
            }
            let seat = SeatAllocation::free(mother_id, slot, now);
            sqlx::query(
                "INSERT INTO seat_allocations (id, mother_id, slot_index, status, updated_at) \
                 VALUES ($1, $2, $3, 'free', $4) ON CONFLICT (mother_id, slot_index) DO NOTHING",
            )
            .bind(seat.id)
            .bind(mother_id)
            .bind(slot)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create slot", e))?;
            created += 1;
        }

        let removed = sqlx::query(
            "DELETE FROM seat_allocations WHERE mother_id = $1 AND slot_index >= $2 AND status = 'free'",
        )
        .bind(mother_id)
        .bind(seat_limit)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to shrink slots", e))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit slots", e))?;
        Ok((created, removed))
    }

    async fn find_by_id(&self, id: SeatId) -> AppResult<Option<SeatAllocation>> {
        sqlx::query_as::<_, SeatAllocation>("SELECT * FROM seat_allocations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find seat", e))
    }

    async fn find_free_seat(&self, mother_id: MotherId) -> AppResult<Option<SeatAllocation>> {
        sqlx::query_as::<_, SeatAllocation>(
            "SELECT * FROM seat_allocations WHERE mother_id = $1 AND status = 'free' \
             ORDER BY slot_index ASC LIMIT 1",
        )
        .bind(mother_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find free seat", e))
    }

    async fn find_active_by_email(
        &self,
        team_id: &str,
        email: &str,
    ) -> AppResult<Option<SeatAllocation>> {
        sqlx::query_as::<_, SeatAllocation>(
            "SELECT * FROM seat_allocations \
             WHERE team_id = $1 AND email = $2 AND status IN ('held', 'used') LIMIT 1",
        )
        .bind(team_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find seat by email", e))
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
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(mailbox_lock_key(team_id, email))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock mailbox", e))?;

        let duplicate: Option<SeatId> = sqlx::query_scalar(
            "SELECT id FROM seat_allocations \
             WHERE team_id = $1 AND email = $2 AND status IN ('held', 'used') LIMIT 1",
        )
        .bind(team_id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check mailbox", e))?;

        if duplicate.is_some() {
            return Ok(HoldOutcome::AlreadyAssigned);
        }

        let held = sqlx::query_as::<_, SeatAllocation>(
            "UPDATE seat_allocations SET status = 'held', held_until = $2, team_id = $3, email = $4, \
             code_id = $5, invite_request_id = NULL, member_id = NULL, updated_at = $6 \
             WHERE id = $1 AND status = 'free' RETURNING *",
        )
        .bind(seat_id)
        .bind(held_until)
        .bind(team_id)
        .bind(email)
        .bind(code_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await;

        let held = match held {
            Ok(held) => held,
            Err(e) if is_unique_violation(&e) => return Ok(HoldOutcome::AlreadyAssigned),
            Err(e) => {
                return Err(AppError::with_source(ErrorKind::Database, "Failed to hold seat", e));
            }
        };

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit hold", e))?;

        Ok(match held {
            Some(seat) => HoldOutcome::Held(seat),
            None => HoldOutcome::Unavailable,
        })
    }

    async fn commit(
        &self,
        seat_id: SeatId,
        invite_request_id: Option<&str>,
        member_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE seat_allocations SET status = 'used', held_until = NULL, \
             invite_request_id = $2, member_id = $3, updated_at = $4 \
             WHERE id = $1 AND status = 'held'",
        )
        .bind(seat_id)
        .bind(invite_request_id)
        .bind(member_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit seat", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, seat_id: SeatId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE seat_allocations SET status = 'free', held_until = NULL, team_id = NULL, \
             email = NULL, invite_request_id = NULL, member_id = NULL, code_id = NULL, updated_at = $2 \
             WHERE id = $1 AND status IN ('held', 'used')",
        )
        .bind(seat_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to release seat", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn sweep_stale_holds(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE seat_allocations SET status = 'free', held_until = NULL, team_id = NULL, \
             email = NULL, invite_request_id = NULL, member_id = NULL, code_id = NULL, updated_at = $1 \
             WHERE status = 'held' AND held_until < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to sweep stale holds", e))?;
        Ok(result.rows_affected())
    }

    async fn count_occupied(&self, mother_id: MotherId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_allocations WHERE mother_id = $1 AND status IN ('held', 'used')",
        )
        .bind(mother_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count occupied seats", e))?;
        Ok(count.max(0) as u64)
    }

    async fn count_free(&self, mother_id: MotherId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM seat_allocations WHERE mother_id = $1 AND status = 'free'",
        )
        .bind(mother_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count free seats", e))?;
        Ok(count.max(0) as u64)
    }

    async fn list_for_mother(&self, mother_id: MotherId) -> AppResult<Vec<SeatAllocation>> {
        sqlx::query_as::<_, SeatAllocation>(
            "SELECT * FROM seat_allocations WHERE mother_id = $1 ORDER BY slot_index ASC",
        )
        .bind(mother_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list seats", e))
    }

    async fn release_all_for_mother(&self, mother_id: MotherId, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE seat_allocations SET status = 'free', held_until = NULL, team_id = NULL, \
             email = NULL, invite_request_id = NULL, member_id = NULL, code_id = NULL, updated_at = $2 \
             WHERE mother_id = $1 AND status IN ('held', 'used')",
        )
        .bind(mother_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to release mother seats", e))?;
        Ok(result.rows_affected())
    }

    async fn occupy_for_member(
        &self,
        mother_id: MotherId,
        team_id: &str,
        email: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SeatAllocation>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(mailbox_lock_key(team_id, email))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock mailbox", e))?;

        let seat = sqlx::query_as::<_, SeatAllocation>(
            "UPDATE seat_allocations SET status = 'used', held_until = NULL, team_id = $2, email = $3, \
             member_id = $4, invite_request_id = NULL, code_id = NULL, updated_at = $5 \
             WHERE id = ( \
                SELECT id FROM seat_allocations \
                WHERE mother_id = $1 AND status = 'free' \
                AND NOT EXISTS ( \
                    SELECT 1 FROM seat_allocations \
                    WHERE team_id = $2 AND email = $3 AND status IN ('held', 'used') \
                ) \
                ORDER BY slot_index ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING *",
        )
        .bind(mother_id)
        .bind(team_id)
        .bind(email)
        .bind(member_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to occupy seat", e))?;

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit seat", e))?;
        Ok(seat)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
