//! Integration tests for code redemption and rate limiting.

use chrono::Duration;
use futures::future::join_all;

use seatbroker_core::error::ErrorKind;
use seatbroker_core::traits::RateLimitPolicy;
use seatbroker_entity::{CodeEventKind, CodeStatus, MotherStatus, SeatStatus};
use seatbroker_service::RedeemStatus;

use crate::helpers::{sku, TestEngine};

#[tokio::test]
async fn test_redeem_binds_seat_and_sends_invite() {
    let t = TestEngine::new();
    let mother = t.add_mother(2).await;
    let codes = t.generate(1).await;

    let outcome = t
        .engine
        .ledger
        .redeem(&codes[0], "  Alice@Example.com ")
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.status, RedeemStatus::Redeemed);
    assert_eq!(outcome.mother_id, Some(mother.id));
    assert_eq!(outcome.team_id.as_deref(), Some(mother.team_id.as_str()));
    assert!(outcome.invite_request_id.is_some());

    let code = t.code(&codes[0]).await;
    assert_eq!(code.status, CodeStatus::Used);
    assert_eq!(code.bound_email.as_deref(), Some("alice@example.com"));
    assert_eq!(code.bound_team_id.as_deref(), Some(mother.team_id.as_str()));
    assert_eq!(code.current_team_id, code.bound_team_id);

    let seats = t.engine.allocator.list_for_mother(mother.id).await.unwrap();
    let used: Vec<_> = seats.iter().filter(|s| s.status == SeatStatus::Used).collect();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].email.as_deref(), Some("alice@example.com"));
    assert_eq!(used[0].code_id, Some(code.id));

    assert_eq!(t.provider.invites_for(&mother.team_id), vec!["alice@example.com"]);
    let events = t.engine.ledger.events(code.id).await.unwrap();
    assert!(events.iter().any(|e| e.kind == CodeEventKind::Bind));
}

#[tokio::test]
async fn test_code_lookup_ignores_case_and_whitespace() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;

    let mangled = format!("  {}  ", codes[0].to_lowercase());
    let outcome = t.engine.ledger.redeem(&mangled, "bob@example.com").await.unwrap();
    assert!(outcome.success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeem_of_one_code_succeeds_once() {
    let t = TestEngine::new();
    t.add_mother(10).await;
    let codes = t.generate(1).await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = t.engine.clone();
            let code = codes[0].clone();
            tokio::spawn(async move {
                engine
                    .ledger
                    .redeem(&code, &format!("user{i}@example.com"))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let successes = outcomes.iter().filter(|o| o.success).count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .filter(|o| !o.success)
        .all(|o| matches!(o.status, RedeemStatus::AlreadyUsed | RedeemStatus::InProgress)));

    let code = t.code(&codes[0]).await;
    assert_eq!(code.status, CodeStatus::Used);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_seats_never_exceed_seat_limit() {
    let t = TestEngine::new();
    let mother = t.add_mother(5).await;

    let mut codes = t.generate(5).await;
    let redeem_all = |codes: Vec<String>, offset: usize| {
        let engine = t.engine.clone();
        async move {
            let handles: Vec<_> = codes
                .into_iter()
                .enumerate()
                .map(|(i, code)| {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        engine
                            .ledger
                            .redeem(&code, &format!("member{}@example.com", i + offset))
                            .await
                            .unwrap()
                    })
                })
                .collect();
            join_all(handles)
                .await
                .into_iter()
                .map(|r| r.unwrap())
                .collect::<Vec<_>>()
        }
    };

    let first = redeem_all(codes.clone(), 0).await;
    assert!(first.iter().all(|o| o.success));
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 5);

    // Used codes no longer reserve capacity, so another batch is accepted.
    codes = t.generate(5).await;
    let second = redeem_all(codes.clone(), 100).await;
    assert!(second.iter().all(|o| o.status == RedeemStatus::NoSeat));
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 5);

    // Codes that found no seat are redeemable later.
    for code in &codes {
        assert_eq!(t.code(code).await.status, CodeStatus::Unused);
    }
}

#[tokio::test]
async fn test_redeem_twice_reports_already_used() {
    let t = TestEngine::new();
    t.add_mother(2).await;
    let codes = t.generate(1).await;

    assert!(t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap().success);
    let again = t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    assert!(!again.success);
    assert_eq!(again.status, RedeemStatus::AlreadyUsed);
    assert_eq!(again.message, "Code already used");
}

#[tokio::test]
async fn test_unknown_and_disabled_codes_are_rejected() {
    let t = TestEngine::new();
    t.add_mother(2).await;
    let codes = t.generate(1).await;

    let unknown = t.engine.ledger.redeem("NOPE-NOT-A-CODE", "a@example.com").await.unwrap();
    assert_eq!(unknown.status, RedeemStatus::NotFound);

    let id = t.code(&codes[0]).await.id;
    assert_eq!(t.engine.ledger.disable_codes(&[id]).await.unwrap(), 1);
    let disabled = t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    assert_eq!(disabled.status, RedeemStatus::Disabled);
}

#[tokio::test]
async fn test_invalid_email_is_a_validation_error() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;

    let err = t.engine.ledger.redeem(&codes[0], "not-an-email").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(t.code(&codes[0]).await.status, CodeStatus::Unused);
}

#[tokio::test]
async fn test_code_past_deadline_expires() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let deadline = t.now() + Duration::hours(1);
    let batch = t
        .engine
        .ledger
        .generate_codes(1, Some("vip"), Some(deadline), sku(1, 1))
        .await
        .unwrap();
    assert!(batch.codes[0].starts_with("VIP"));

    t.clock.advance(Duration::hours(2));
    let outcome = t.engine.ledger.redeem(&batch.codes[0], "a@example.com").await.unwrap();
    assert_eq!(outcome.status, RedeemStatus::Expired);
    assert_eq!(t.code(&batch.codes[0]).await.status, CodeStatus::Expired);
}

#[tokio::test]
async fn test_rejected_credentials_invalidate_mother() {
    let t = TestEngine::new();
    let mother = t.add_mother(2).await;
    let codes = t.generate(1).await;
    t.provider.fail_team(&mother.team_id, 401);

    let outcome = t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    assert_eq!(outcome.status, RedeemStatus::NoSeat);
    assert_eq!(t.mother(mother.id).await.status, MotherStatus::Invalid);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 0);
    assert_eq!(t.code(&codes[0]).await.status, CodeStatus::Unused);

    let snapshot = t.engine.capacity.snapshot().await.unwrap();
    assert_eq!(snapshot.total_slots, 0);
}

#[tokio::test]
async fn test_redeem_falls_over_to_healthy_mother() {
    let t = TestEngine::new();
    let broken = t.add_mother(1).await;
    let healthy = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.provider.fail_team(&broken.team_id, 503);

    let outcome = t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.mother_id, Some(healthy.id));
    assert_eq!(t.engine.allocator.count_occupied(broken.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_token_bucket_allows_burst_then_refills() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let limits = t.engine.redemption.limits();
    limits.set_policy("redeem", RateLimitPolicy::per_hour(5, 5)).await;

    for _ in 0..5 {
        let outcome = t.engine.redemption.redeem("MISSING", "a@example.com").await.unwrap();
        assert_eq!(outcome.status, RedeemStatus::NotFound);
    }
    let err = t
        .engine
        .redemption
        .redeem("MISSING", "a@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    let retry_after = err.retry_after_secs().unwrap();
    assert!((719..=721).contains(&retry_after), "retry after {retry_after}");

    // Other mailboxes have their own bucket.
    assert!(t.engine.redemption.redeem("MISSING", "b@example.com").await.is_ok());

    t.clock.advance(Duration::seconds(721));
    assert!(t.engine.redemption.redeem("MISSING", "a@example.com").await.is_ok());
    assert!(t.engine.redemption.redeem("MISSING", "a@example.com").await.is_err());
}

#[tokio::test]
async fn test_invite_outliving_its_hold_is_withdrawn() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.provider.delay_invites(std::time::Duration::from_millis(50));

    // The hold lapses and is swept while the invite is still in flight.
    let sweep = async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        t.clock
            .advance(Duration::seconds(t.config.engine.hold_ttl_seconds + 1));
        t.engine.allocator.sweep_stale_holds().await.unwrap()
    };
    let (outcome, swept) = tokio::join!(t.engine.ledger.redeem(&codes[0], "a@example.com"), sweep);
    assert_eq!(swept, 1);
    assert_eq!(outcome.unwrap().status, RedeemStatus::NoSeat);

    assert_eq!(t.provider.invites_for(&mother.team_id), vec!["a@example.com".to_string()]);
    assert!(t
        .provider
        .cancelled()
        .contains(&(mother.team_id.clone(), "a@example.com".to_string())));
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 0);
    assert_eq!(t.code(&codes[0]).await.status, CodeStatus::Unused);
}
