use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::types::{GroupId, MotherId};
use seatbroker_entity::{MotherAccount, MotherGroup, MotherStatus};

use super::MemoryStore;
use crate::store::MotherRepository;

#[async_trait]
impl MotherRepository for MemoryStore {
    async fn insert(&self, mother: &MotherAccount) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.mothers.values().any(|m| m.team_id == mother.team_id) {
            return Err(AppError::conflict(format!(
                "Team '{}' already has a mother account",
                mother.team_id
            )));
        }
        tables.mothers.insert(mother.id, mother.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MotherId) -> AppResult<Option<MotherAccount>> {
        Ok(self.tables.lock().await.mothers.get(&id).cloned())
    }

    async fn list_active(&self) -> AppResult<Vec<MotherAccount>> {
        let tables = self.tables.lock().await;
        let mut active: Vec<_> = tables
            .mothers
            .values()
            .filter(|m| m.status == MotherStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(active)
    }

    async fn mark_invalid(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.mothers.get_mut(&id) {
            Some(mother) if mother.status == MotherStatus::Active => {
                mother.status = MotherStatus::Invalid;
                mother.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_alive(&self, id: MotherId, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(mother) = self.tables.lock().await.mothers.get_mut(&id) {
            mother.last_seen_alive_at = Some(now);
            mother.updated_at = now;
        }
        Ok(())
    }

    async fn set_team_name(&self, id: MotherId, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(mother) = self.tables.lock().await.mothers.get_mut(&id) {
            mother.team_name = Some(name.to_string());
            mother.updated_at = now;
        }
        Ok(())
    }

    async fn insert_group(&self, group: &MotherGroup) -> AppResult<()> {
        self.tables.lock().await.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_group(&self, id: GroupId) -> AppResult<Option<MotherGroup>> {
        Ok(self.tables.lock().await.groups.get(&id).cloned())
    }
}
