//! Integration tests for invite refresh.

use chrono::Duration;

use seatbroker_entity::CodeEventKind;

use crate::helpers::{sku, TestEngine};

#[tokio::test]
async fn test_refresh_resends_invite_and_applies_cooldown() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let codes = t.generate_with(1, sku(1, 2)).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();

    let outcome = t
        .engine
        .refresher
        .refresh(&codes[0], "a@example.com", None)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.refresh_remaining, Some(1));
    assert_eq!(t.provider.invites_for(&mother.team_id).len(), 2);

    let cooling = t
        .engine
        .refresher
        .refresh(&codes[0], "a@example.com", None)
        .await
        .unwrap();
    assert!(!cooling.success);
    assert_eq!(
        cooling.cooldown_seconds,
        Some(t.config.engine.refresh_cooldown_seconds)
    );

    t.clock
        .advance(Duration::seconds(t.config.engine.refresh_cooldown_seconds + 1));
    let second = t
        .engine
        .refresher
        .refresh(&codes[0], "a@example.com", None)
        .await
        .unwrap();
    assert!(second.success);
    assert_eq!(second.refresh_remaining, Some(0));

    t.clock
        .advance(Duration::seconds(t.config.engine.refresh_cooldown_seconds + 1));
    let exhausted = t
        .engine
        .refresher
        .refresh(&codes[0], "a@example.com", None)
        .await
        .unwrap();
    assert!(!exhausted.success);
    assert_eq!(exhausted.refresh_remaining, Some(0));

    let code = t.code(&codes[0]).await;
    let refreshes = t
        .engine
        .ledger
        .events(code.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == CodeEventKind::Refresh)
        .count();
    assert_eq!(refreshes, 2);
}

#[tokio::test]
async fn test_refresh_requires_bound_email() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();

    let outcome = t
        .engine
        .refresher
        .refresh(&codes[0], "someone@example.com", None)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(t.code(&codes[0]).await.refresh_used, 0);
}

#[tokio::test]
async fn test_refresh_to_new_mailbox_moves_seat() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "old@example.com").await.unwrap();

    let outcome = t
        .engine
        .refresher
        .refresh(&codes[0], "old@example.com", Some("New@Example.com"))
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.queued);

    let code = t.code(&codes[0]).await;
    assert_eq!(code.bound_email.as_deref(), Some("new@example.com"));
    assert_eq!(code.refresh_used, 1);
}

#[tokio::test]
async fn test_refresh_with_rejected_credentials_invalidates_mother() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    t.provider.fail_team(&mother.team_id, 403);

    let outcome = t
        .engine
        .refresher
        .refresh(&codes[0], "a@example.com", None)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(
        t.mother(mother.id).await.status,
        seatbroker_entity::MotherStatus::Invalid
    );
    assert_eq!(t.code(&codes[0]).await.refresh_used, 0);
}
