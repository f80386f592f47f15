use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;
use seatbroker_core::types::CodeId;
use seatbroker_entity::{CodeBinding, CodeEvent, CodeStatus, RedeemCode};

use super::MemoryStore;
use crate::store::CodeRepository;

#[async_trait]
impl CodeRepository for MemoryStore {
    async fn insert_batch(&self, codes: &[RedeemCode]) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(dup) = codes
            .iter()
            .find(|c| tables.code_hashes.contains_key(&c.code_hash))
        {
            return Err(AppError::conflict(format!("Duplicate code hash in batch {}", dup.batch_id)));
        }
        for code in codes {
            tables.code_hashes.insert(code.code_hash.clone(), code.id);
            tables.codes.insert(code.id, code.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, id: CodeId) -> AppResult<Option<RedeemCode>> {
        Ok(self.tables.lock().await.codes.get(&id).cloned())
    }

    async fn find_by_hash(&self, code_hash: &str) -> AppResult<Option<RedeemCode>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .code_hashes
            .get(code_hash)
            .and_then(|id| tables.codes.get(id))
            .cloned())
    }

    async fn try_block(&self, code_hash: &str, now: DateTime<Utc>) -> AppResult<Option<RedeemCode>> {
        let mut tables = self.tables.lock().await;
        let Some(id) = tables.code_hashes.get(code_hash).copied() else {
            return Ok(None);
        };
        let Some(code) = tables.codes.get_mut(&id) else {
            return Ok(None);
        };
        if code.status != CodeStatus::Unused
            || !code.active
            || code.is_past_redeem_deadline(now)
            || code.is_lifecycle_expired(now)
        {
            return Ok(None);
        }
        code.status = CodeStatus::Blocked;
        code.updated_at = now;
        Ok(Some(code.clone()))
    }

    async fn unblock(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code) if code.status == CodeStatus::Blocked => {
                code.status = CodeStatus::Unused;
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_used(
        &self,
        id: CodeId,
        binding: &CodeBinding,
        lifecycle_expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code) if code.status == CodeStatus::Blocked => {
                code.status = CodeStatus::Used;
                code.bound_email = Some(binding.email.clone());
                code.bound_team_id.get_or_insert_with(|| binding.team_id.clone());
                code.current_team_id = Some(binding.team_id.clone());
                code.bound_mother_id = Some(binding.mother_id);
                code.lifecycle_started_at.get_or_insert(now);
                if code.lifecycle_expires_at.is_none() {
                    code.lifecycle_expires_at = lifecycle_expires_at;
                }
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_expired(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code) if code.status == CodeStatus::Unused && code.is_past_redeem_deadline(now) => {
                code.status = CodeStatus::Expired;
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code) if code.active => {
                code.active = false;
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_switch(
        &self,
        id: CodeId,
        expected_switch_count: i32,
        binding: &CodeBinding,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code)
                if code.status == CodeStatus::Used
                    && code.active
                    && code.switch_count == expected_switch_count
                    && code.has_switches_left() =>
            {
                code.switch_count += 1;
                code.bound_email = Some(binding.email.clone());
                code.current_team_id = Some(binding.team_id.clone());
                code.bound_mother_id = Some(binding.mother_id);
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_refresh(&self, id: CodeId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.codes.get_mut(&id) {
            Some(code) if code.refresh_used < code.refresh_limit => {
                code.refresh_used += 1;
                code.last_refreshed_at = Some(now);
                code.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_reserved(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.codes.values().filter(|c| c.is_reserved(now)).count() as u64)
    }

    async fn append_event(&self, event: &CodeEvent) -> AppResult<()> {
        self.tables.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, code_id: CodeId) -> AppResult<Vec<CodeEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.code_id == code_id)
            .cloned()
            .collect())
    }
}
