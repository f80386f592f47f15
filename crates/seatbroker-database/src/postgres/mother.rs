//! Mother account repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use seatbroker_core::error::{AppError, ErrorKind};
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{GroupId, MotherId};
use seatbroker_entity::{MotherAccount, MotherGroup};

use crate::store::MotherRepository;

/// PostgreSQL storage for mother accounts and naming groups.
#[derive(Debug, Clone)]
pub struct PgMotherRepository {
    pool: PgPool,
}

impl PgMotherRepository {
    /// Create a new mother repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MotherRepository for PgMotherRepository {
    async fn insert(&self, mother: &MotherAccount) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO mother_accounts (id, name, group_id, team_id, team_name, access_token, \
             seat_limit, status, last_seen_alive_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(mother.id)
        .bind(&mother.name)
        .bind(mother.group_id)
        .bind(&mother.team_id)
        .bind(&mother.team_name)
        .bind(&mother.access_token)
        .bind(mother.seat_limit)
        .bind(mother.status)
        .bind(mother.last_seen_alive_at)
        .bind(mother.created_at)
        .bind(mother.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert mother account", e))?;
        Ok(())
    }

    async fn find_by_id(&self, id: MotherId) -> AppResult<Option<MotherAccount>> {
        sqlx::query_as::<_, MotherAccount>("SELECT * FROM mother_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find mother account", e))
    }

    async fn list_active(&self) -> AppResult<Vec<MotherAccount>> {
        sqlx::query_as::<_, MotherAccount>(
            "SELECT * FROM mother_accounts WHERE status = 'active' ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list mother accounts", e))
    }

    async fn mark_invalid(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE mother_accounts SET status = 'invalid', updated_at = $2 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to invalidate mother account", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn touch_alive(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE mother_accounts SET last_seen_alive_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to touch mother account", e))?;
        Ok(())
    }

    async fn set_team_name(&self, id: MotherId, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE mother_accounts SET team_name = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to rename mother team", e))?;
        Ok(())
    }

    async fn insert_group(&self, group: &MotherGroup) -> AppResult<()> {
        sqlx::query("INSERT INTO mother_groups (id, name, team_name_prefix) VALUES ($1, $2, $3)")
            .bind(group.id)
            .bind(&group.name)
            .bind(&group.team_name_prefix)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert mother group", e))?;
        Ok(())
    }

    async fn find_group(&self, id: GroupId) -> AppResult<Option<MotherGroup>> {
        sqlx::query_as::<_, MotherGroup>("SELECT * FROM mother_groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find mother group", e))
    }
}
