//! Integration tests for switching and the switch queue.

use chrono::Duration;

use seatbroker_entity::{CodeEventKind, MotherAccount, SwitchStatus};
use seatbroker_service::SwitchKind;

use crate::helpers::{sku, TestEngine};

async fn occupied(t: &TestEngine, mothers: &[&MotherAccount]) -> u64 {
    let mut total = 0;
    for mother in mothers {
        total += t.engine.allocator.count_occupied(mother.id).await.unwrap();
    }
    total
}

#[tokio::test]
async fn test_switch_moves_code_to_another_mother() {
    let t = TestEngine::new();
    let a = t.add_mother(1).await;
    let b = t.add_mother(1).await;
    let codes = t.generate(1).await;

    let redeemed = t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let from = redeemed.mother_id.unwrap();
    let (from_team, to) = if from == a.id {
        (a.team_id.clone(), b.clone())
    } else {
        (b.team_id.clone(), a.clone())
    };

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.kind, SwitchKind::Switched);
    assert_eq!(outcome.mother_id, Some(to.id));

    let code = t.code(&codes[0]).await;
    assert_eq!(code.switch_count, 1);
    assert_eq!(code.bound_mother_id, Some(to.id));
    assert_eq!(code.current_team_id.as_deref(), Some(to.team_id.as_str()));
    assert_eq!(code.bound_team_id.as_deref(), Some(from_team.as_str()));

    // The old invite was withdrawn and its seat freed.
    assert!(t
        .provider
        .cancelled()
        .contains(&(from_team.clone(), "a@example.com".to_string())));
    assert_eq!(t.engine.allocator.count_occupied(from).await.unwrap(), 0);
    assert_eq!(t.engine.allocator.count_occupied(to.id).await.unwrap(), 1);

    let events = t.engine.ledger.events(code.id).await.unwrap();
    assert!(events.iter().any(|e| e.kind == CodeEventKind::Switch));
}

#[tokio::test]
async fn test_switch_without_free_seat_queues_once() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();

    let first = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert!(first.queued);
    assert_eq!(first.kind, SwitchKind::Queued);

    let second = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert!(second.queued);
    assert_eq!(second.request_id, first.request_id);

    let code = t.code(&codes[0]).await;
    let pending = t
        .engine
        .repos
        .switches
        .list_pending(10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].redeem_code_id, code.id);
    assert_eq!(pending[0].mother_id_prev, Some(mother.id));

    // Queuing never touches the current seat or the switch budget.
    assert_eq!(code.switch_count, 0);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 1);
    assert!(t.provider.cancelled().is_empty());
}

#[tokio::test]
async fn test_switch_without_queue_reports_no_seat() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", false)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::NoSeat);
    assert!(!outcome.queued);
    assert!(t.engine.repos.switches.list_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drain_completes_queued_switch_when_seat_appears() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let queued = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    let request_id = queued.request_id.unwrap();

    // Nothing changes while no seat exists.
    let report = t.engine.switcher.drain(10).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.requeued, 1);
    let request = t.engine.switcher.request(request_id).await.unwrap().unwrap();
    assert_eq!(request.status, SwitchStatus::Pending);

    let fresh = t.add_mother(1).await;
    let report = t.engine.switcher.drain(10).await.unwrap();
    assert_eq!(report.succeeded, 1);

    let request = t.engine.switcher.request(request_id).await.unwrap().unwrap();
    assert_eq!(request.status, SwitchStatus::Succeeded);
    assert_eq!(request.mother_id_next, Some(fresh.id));
    let code = t.code(&codes[0]).await;
    assert_eq!(code.current_team_id.as_deref(), Some(fresh.team_id.as_str()));
}

#[tokio::test]
async fn test_queued_switch_expires() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let queued = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();

    t.clock
        .advance(Duration::seconds(t.config.engine.switch_queue_ttl_seconds + 1));
    let report = t.engine.switcher.drain(10).await.unwrap();
    assert_eq!(report.expired, 1);
    let request = t
        .engine
        .switcher
        .request(queued.request_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, SwitchStatus::Expired);
}

#[tokio::test]
async fn test_switch_budget_is_enforced() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    t.add_mother(1).await;
    let codes = t.generate_with(1, sku(0, 1)).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Rejected);
    assert_eq!(outcome.message, "Switch limit reached");
}

#[tokio::test]
async fn test_switch_of_unredeemed_code_is_rejected() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Rejected);
}

#[tokio::test]
async fn test_lifecycle_expiry_deactivates_code() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    t.add_mother(1).await;
    let mut plan = sku(3, 3);
    plan.lifecycle_days = Some(1);
    let codes = t.generate_with(1, plan).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    assert!(t.code(&codes[0]).await.lifecycle_expires_at.is_some());

    t.clock.advance(Duration::days(2));
    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Rejected);
    assert!(!t.code(&codes[0]).await.active);
}

#[tokio::test]
async fn test_end_to_end_redeem_then_queue_switch() {
    let t = TestEngine::new();
    let mother = t.add_mother(3).await;
    let codes = t.generate(3).await;
    assert_eq!(codes.len(), 3);

    let first = t.engine.redemption.redeem(&codes[0], "email1@example.com").await.unwrap();
    assert!(first.success);
    let seat = t
        .engine
        .allocator
        .find_active(&mother.team_id, "email1@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(seat.status.is_occupied());

    let again = t.engine.redemption.redeem(&codes[0], "email1@example.com").await.unwrap();
    assert!(!again.success);
    assert_eq!(again.message, "Code already used");

    // Fill the remaining seats so the switch has nowhere to go.
    assert!(t.engine.redemption.redeem(&codes[1], "other1@example.com").await.unwrap().success);
    assert!(t.engine.redemption.redeem(&codes[2], "other2@example.com").await.unwrap().success);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 3);

    let switched = t.engine.redemption.switch(&codes[0], "email2@example.com").await.unwrap();
    assert!(switched.queued);

    let code = t.code(&codes[0]).await;
    let pending = t
        .engine
        .repos
        .switches
        .find_pending(code.id, "email2@example.com")
        .await
        .unwrap();
    assert!(pending.is_some());
    assert_eq!(code.bound_email.as_deref(), Some("email1@example.com"));
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_switch_uses_free_seat_on_current_mother() {
    let t = TestEngine::new();
    let mother = t.add_mother(3).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "email1@example.com").await.unwrap();

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "email2@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Switched);
    assert_eq!(outcome.mother_id, Some(mother.id));

    let code = t.code(&codes[0]).await;
    assert_eq!(code.switch_count, 1);
    assert_eq!(code.bound_email.as_deref(), Some("email2@example.com"));
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 1);
    assert!(t
        .engine
        .allocator
        .find_active(&mother.team_id, "email1@example.com")
        .await
        .unwrap()
        .is_none());
    assert!(t
        .provider
        .cancelled()
        .contains(&(mother.team_id.clone(), "email1@example.com".to_string())));
    assert!(t.engine.repos.switches.list_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_switches_of_one_code_commit_once() {
    let t = TestEngine::new();
    let home = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let b = t.add_mother(1).await;
    let c = t.add_mother(1).await;
    let d = t.add_mother(1).await;
    t.provider.delay_invites(std::time::Duration::from_millis(20));

    let attempts = (0..3).map(|_| t.engine.switcher.switch(&codes[0], "b@example.com", true));
    let outcomes: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let switched: Vec<_> = outcomes.iter().filter(|o| o.kind == SwitchKind::Switched).collect();
    assert_eq!(switched.len(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| o.kind != SwitchKind::Switched)
        .all(|o| o.kind == SwitchKind::Conflict));

    let code = t.code(&codes[0]).await;
    assert_eq!(code.switch_count, 1);
    assert_eq!(code.bound_mother_id, switched[0].mother_id);
    assert_eq!(occupied(&t, &[&home, &b, &c, &d]).await, 1);

    // Losing binds withdrew their invites.
    let cancelled_b = t
        .provider
        .cancelled()
        .into_iter()
        .filter(|(_, email)| email == "b@example.com")
        .count();
    assert_eq!(cancelled_b, 2);
}

#[tokio::test]
async fn test_failed_bind_keeps_current_seat() {
    let t = TestEngine::new();
    let home = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let broken = t.add_mother(1).await;
    t.provider.fail_team(&broken.team_id, 503);

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "b@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Queued);

    let code = t.code(&codes[0]).await;
    assert_eq!(code.switch_count, 0);
    assert_eq!(code.current_team_id.as_deref(), Some(home.team_id.as_str()));
    assert!(t
        .engine
        .allocator
        .find_active(&home.team_id, "a@example.com")
        .await
        .unwrap()
        .is_some());
    assert_eq!(t.engine.allocator.count_occupied(broken.id).await.unwrap(), 0);
    assert!(t.provider.cancelled().is_empty());
}

#[tokio::test]
async fn test_failed_detach_keeps_previous_seat_occupied() {
    let t = TestEngine::new();
    let home = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let next = t.add_mother(1).await;
    t.provider.fail_team(&home.team_id, 503);

    let outcome = t
        .engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    assert_eq!(outcome.kind, SwitchKind::Switched);
    assert_eq!(outcome.mother_id, Some(next.id));

    let code = t.code(&codes[0]).await;
    assert_eq!(code.current_team_id.as_deref(), Some(next.team_id.as_str()));
    // The remote member could not be removed, so its seat is not handed out.
    assert_eq!(t.engine.allocator.count_occupied(home.id).await.unwrap(), 1);
    assert_eq!(t.engine.allocator.count_occupied(next.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_drain_merges_request_requeued_behind_user_retry() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let queued = t
        .engine
        .switcher
        .switch(&codes[0], "b@example.com", true)
        .await
        .unwrap();
    let first_id = queued.request_id.unwrap();

    // A seat appears whose invites fail slowly, so the drain is still
    // holding the request when the user asks again.
    let flaky = t.add_mother(1).await;
    t.provider.fail_team(&flaky.team_id, 503);
    t.provider.delay_invites(std::time::Duration::from_millis(50));

    let user_retry = async {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        t.engine
            .switcher
            .switch(&codes[0], "b@example.com", true)
            .await
            .unwrap()
    };
    let (report, retry) = tokio::join!(t.engine.switcher.drain(10), user_retry);
    let report = report.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(retry.queued);
    assert_ne!(retry.request_id, Some(first_id));

    let code = t.code(&codes[0]).await;
    let pending = t.engine.repos.switches.list_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].redeem_code_id, code.id);
    assert_eq!(Some(pending[0].id), retry.request_id);

    let first = t.engine.switcher.request(first_id).await.unwrap().unwrap();
    assert_eq!(first.status, SwitchStatus::Failed);
}

#[tokio::test]
async fn test_drain_reclaims_request_with_lapsed_claim() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    let queued = t
        .engine
        .switcher
        .switch(&codes[0], "b@example.com", true)
        .await
        .unwrap();
    let request_id = queued.request_id.unwrap();

    // A worker claimed the request and never finished it.
    assert!(t.engine.repos.switches.claim(request_id, t.now()).await.unwrap());
    let report = t.engine.switcher.drain(10).await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.processed, 0);

    t.clock
        .advance(Duration::seconds(t.config.engine.switch_claim_lease_seconds + 1));
    let report = t.engine.switcher.drain(10).await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.requeued, 1);

    let request = t.engine.switcher.request(request_id).await.unwrap().unwrap();
    assert_eq!(request.status, SwitchStatus::Pending);
    assert_eq!(request.attempts, 2);
}
