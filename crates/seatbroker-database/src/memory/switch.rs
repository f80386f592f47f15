use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{CodeId, MotherId, SwitchRequestId};
use seatbroker_entity::{SwitchRequest, SwitchStatus};

use super::MemoryStore;
use crate::store::SwitchRepository;

const SUPERSEDED: &str = "superseded by a newer pending request";

fn requeue_in(
    switches: &mut HashMap<SwitchRequestId, SwitchRequest>,
    id: SwitchRequestId,
    last_error: &str,
    now: DateTime<Utc>,
) -> Option<SwitchStatus> {
    let (code_id, email) = match switches.get(&id) {
        Some(r) if r.status == SwitchStatus::Running => (r.redeem_code_id, r.email.clone()),
        _ => return None,
    };
    let has_pending = switches.values().any(|r| {
        r.id != id && r.redeem_code_id == code_id && r.email == email && r.status == SwitchStatus::Pending
    });
    let request = switches.get_mut(&id)?;
    if has_pending {
        request.status = SwitchStatus::Failed;
        request.last_error = Some(SUPERSEDED.to_string());
    } else {
        request.status = SwitchStatus::Pending;
        request.last_error = Some(last_error.to_string());
    }
    request.updated_at = now;
    Some(request.status)
}

#[async_trait]
impl SwitchRepository for MemoryStore {
    async fn upsert_pending(
        &self,
        code_id: CodeId,
        email: &str,
        reason: &str,
        mother_id_prev: Option<MotherId>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<SwitchRequest> {
        let mut tables = self.tables.lock().await;
        let existing = tables.switches.values_mut().find(|r| {
            r.redeem_code_id == code_id && r.email == email && r.status == SwitchStatus::Pending
        });

        if let Some(request) = existing {
            request.reason = Some(reason.to_string());
            request.queued_at = now;
            request.expires_at = expires_at;
            if mother_id_prev.is_some() {
                request.mother_id_prev = mother_id_prev;
            }
            request.updated_at = now;
            return Ok(request.clone());
        }

        let request = SwitchRequest {
            id: SwitchRequestId::new(),
            redeem_code_id: code_id,
            email: email.to_string(),
            status: SwitchStatus::Pending,
            reason: Some(reason.to_string()),
            attempts: 0,
            queued_at: now,
            expires_at,
            mother_id_prev,
            mother_id_next: None,
            last_error: None,
            updated_at: now,
        };
        tables.switches.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_pending(&self, code_id: CodeId, email: &str) -> AppResult<Option<SwitchRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .switches
            .values()
            .find(|r| {
                r.redeem_code_id == code_id && r.email == email && r.status == SwitchStatus::Pending
            })
            .cloned())
    }

    async fn find_by_id(&self, id: SwitchRequestId) -> AppResult<Option<SwitchRequest>> {
        Ok(self.tables.lock().await.switches.get(&id).cloned())
    }

    async fn list_pending(&self, limit: u32) -> AppResult<Vec<SwitchRequest>> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<_> = tables
            .switches
            .values()
            .filter(|r| r.status == SwitchStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (a.queued_at, a.id).cmp(&(b.queued_at, b.id)));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn claim(&self, id: SwitchRequestId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.switches.get_mut(&id) {
            Some(request) if request.status == SwitchStatus::Pending => {
                request.status = SwitchStatus::Running;
                request.attempts += 1;
                request.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn resolve_succeeded(
        &self,
        code_id: CodeId,
        email: &str,
        mother_id_next: Option<MotherId>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut resolved = 0u64;
        for request in tables.switches.values_mut() {
            if request.redeem_code_id == code_id
                && request.email == email
                && matches!(request.status, SwitchStatus::Pending | SwitchStatus::Running)
            {
                request.status = SwitchStatus::Succeeded;
                request.mother_id_next = mother_id_next;
                request.last_error = None;
                request.updated_at = now;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    async fn set_status(
        &self,
        id: SwitchRequestId,
        status: SwitchStatus,
        last_error: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(request) = self.tables.lock().await.switches.get_mut(&id) {
            request.status = status;
            if let Some(error) = last_error {
                request.last_error = Some(error.to_string());
            }
            request.updated_at = now;
        }
        Ok(())
    }

    async fn requeue(
        &self,
        id: SwitchRequestId,
        last_error: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SwitchStatus>> {
        let mut tables = self.tables.lock().await;
        Ok(requeue_in(&mut tables.switches, id, last_error, now))
    }

    async fn reclaim_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let stale: Vec<SwitchRequestId> = tables
            .switches
            .values()
            .filter(|r| r.status == SwitchStatus::Running && r.updated_at < claimed_before)
            .map(|r| r.id)
            .collect();
        let mut reclaimed = 0u64;
        for id in stale {
            if requeue_in(&mut tables.switches, id, "claim lease expired", now).is_some() {
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}
