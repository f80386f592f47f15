use async_trait::async_trait;
use chrono::{DateTime, Utc};

use seatbroker_core::result::AppResult;
use seatbroker_core::types::{CodeId, MotherId, SeatId};
use seatbroker_entity::{SeatAllocation, SeatStatus};

use super::{MemoryStore, Tables};
use crate::store::{HoldOutcome, SeatRepository};

impl Tables {
    fn mailbox_taken(&self, team_id: &str, email: &str) -> bool {
        self.seats.values().any(|s| {
            s.status.is_occupied()
                && s.team_id.as_deref() == Some(team_id)
                && s.email.as_deref() == Some(email)
        })
    }

    fn lowest_free_seat(&self, mother_id: MotherId) -> Option<SeatId> {
        self.seats
            .values()
            .filter(|s| s.mother_id == mother_id && s.status == SeatStatus::Free)
            .min_by_key(|s| s.slot_index)
            .map(|s| s.id)
    }
}

#[async_trait]
impl SeatRepository for MemoryStore {
    async fn ensure_slots(
        &self,
        mother_id: MotherId,
        seat_limit: i32,
        now: DateTime<Utc>,
    ) -> AppResult<(u64, u64)> {
        let mut tables = self.tables.lock().await;
        let existing: Vec<i32> = tables
            .seats
            .values()
            .filter(|s| s.mother_id == mother_id)
            .map(|s| s.slot_index)
            .collect();

        let mut created = 0u64;
        for slot in 0..seat_limit.max(0) {
            if !existing.contains(&slot) {
                let seat = SeatAllocation::free(mother_id, slot, now);
                tables.seats.insert(seat.id, seat);
                created += 1;
            }
        }

        let before = tables.seats.len();
        tables.seats.retain(|_, s| {
            !(s.mother_id == mother_id && s.slot_index >= seat_limit && s.status == SeatStatus::Free)
        });
        let removed = (before - tables.seats.len()) as u64;

        Ok((created, removed))
    }

    async fn find_by_id(&self, id: SeatId) -> AppResult<Option<SeatAllocation>> {
        Ok(self.tables.lock().await.seats.get(&id).cloned())
    }

    async fn find_free_seat(&self, mother_id: MotherId) -> AppResult<Option<SeatAllocation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .lowest_free_seat(mother_id)
            .and_then(|id| tables.seats.get(&id))
            .cloned())
    }

    async fn find_active_by_email(
        &self,
        team_id: &str,
        email: &str,
    ) -> AppResult<Option<SeatAllocation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .seats
            .values()
            .find(|s| {
                s.status.is_occupied()
                    && s.team_id.as_deref() == Some(team_id)
                    && s.email.as_deref() == Some(email)
            })
            .cloned())
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
        let mut tables = self.tables.lock().await;
        if tables.mailbox_taken(team_id, email) {
            return Ok(HoldOutcome::AlreadyAssigned);
        }
        match tables.seats.get_mut(&seat_id) {
            Some(seat) if seat.status == SeatStatus::Free => {
                seat.status = SeatStatus::Held;
                seat.held_until = Some(held_until);
                seat.team_id = Some(team_id.to_string());
                seat.email = Some(email.to_string());
                seat.code_id = code_id;
                seat.invite_request_id = None;
                seat.member_id = None;
                seat.updated_at = now;
                Ok(HoldOutcome::Held(seat.clone()))
            }
            _ => Ok(HoldOutcome::Unavailable),
        }
    }

    async fn commit(
        &self,
        seat_id: SeatId,
        invite_request_id: Option<&str>,
        member_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.seats.get_mut(&seat_id) {
            Some(seat) if seat.status == SeatStatus::Held => {
                seat.status = SeatStatus::Used;
                seat.held_until = None;
                seat.invite_request_id = invite_request_id.map(str::to_string);
                seat.member_id = member_id.map(str::to_string);
                seat.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, seat_id: SeatId, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.seats.get_mut(&seat_id) {
            Some(seat) if seat.status.is_occupied() => {
                seat.clear(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn sweep_stale_holds(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut released = 0u64;
        for seat in tables.seats.values_mut() {
            if seat.is_stale_hold(now) {
                seat.clear(now);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn count_occupied(&self, mother_id: MotherId) -> AppResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .seats
            .values()
            .filter(|s| s.mother_id == mother_id && s.status.is_occupied())
            .count() as u64)
    }

    async fn count_free(&self, mother_id: MotherId) -> AppResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .seats
            .values()
            .filter(|s| s.mother_id == mother_id && s.status == SeatStatus::Free)
            .count() as u64)
    }

    async fn list_for_mother(&self, mother_id: MotherId) -> AppResult<Vec<SeatAllocation>> {
        let tables = self.tables.lock().await;
        let mut seats: Vec<_> = tables
            .seats
            .values()
            .filter(|s| s.mother_id == mother_id)
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.slot_index);
        Ok(seats)
    }

    async fn release_all_for_mother(&self, mother_id: MotherId, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut released = 0u64;
        for seat in tables.seats.values_mut() {
            if seat.mother_id == mother_id && seat.status.is_occupied() {
                seat.clear(now);
                released += 1;
            }
        }
        Ok(released)
    }

    async fn occupy_for_member(
        &self,
        mother_id: MotherId,
        team_id: &str,
        email: &str,
        member_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<SeatAllocation>> {
        let mut tables = self.tables.lock().await;
        if tables.mailbox_taken(team_id, email) {
            return Ok(None);
        }
        let Some(seat_id) = tables.lowest_free_seat(mother_id) else {
            return Ok(None);
        };
        let Some(seat) = tables.seats.get_mut(&seat_id) else {
            return Ok(None);
        };
        seat.status = SeatStatus::Used;
        seat.held_until = None;
        seat.team_id = Some(team_id.to_string());
        seat.email = Some(email.to_string());
        seat.member_id = Some(member_id.to_string());
        seat.invite_request_id = None;
        seat.code_id = None;
        seat.updated_at = now;
        Ok(Some(seat.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store_with_slots(limit: i32) -> (MemoryStore, MotherId, DateTime<Utc>) {
        let store = MemoryStore::new();
        let mother_id = MotherId::new();
        let now = Utc::now();
        store.ensure_slots(mother_id, limit, now).await.unwrap();
        (store, mother_id, now)
    }

    #[tokio::test]
    async fn test_hold_rejects_duplicate_mailbox() {
        let (store, mother_id, now) = store_with_slots(2).await;
        let first = store.find_free_seat(mother_id).await.unwrap().unwrap();
        assert_eq!(first.slot_index, 0);

        let held = store
            .hold(first.id, "team", "a@x.io", None, now + Duration::minutes(5), now)
            .await
            .unwrap();
        assert!(matches!(held, HoldOutcome::Held(_)));

        let second = store.find_free_seat(mother_id).await.unwrap().unwrap();
        let dup = store
            .hold(second.id, "team", "a@x.io", None, now + Duration::minutes(5), now)
            .await
            .unwrap();
        assert!(matches!(dup, HoldOutcome::AlreadyAssigned));

        let again = store
            .hold(first.id, "team", "b@x.io", None, now + Duration::minutes(5), now)
            .await
            .unwrap();
        assert!(matches!(again, HoldOutcome::Unavailable));
    }

    #[tokio::test]
    async fn test_shrink_only_removes_free_rows() {
        let (store, mother_id, now) = store_with_slots(3).await;
        let seats = store.list_for_mother(mother_id).await.unwrap();
        let last = &seats[2];
        store
            .hold(last.id, "team", "c@x.io", None, now + Duration::minutes(5), now)
            .await
            .unwrap();

        let (created, removed) = store.ensure_slots(mother_id, 1, now).await.unwrap();
        assert_eq!((created, removed), (0, 1));
        let remaining = store.list_for_mother(mother_id).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|s| s.id == last.id));
    }
}
