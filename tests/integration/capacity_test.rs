//! Integration tests for the capacity guard.

use chrono::Duration;

use seatbroker_core::error::ErrorKind;

use crate::helpers::{sku, TestEngine};

#[tokio::test]
async fn test_generation_beyond_capacity_is_refused() {
    let t = TestEngine::new();
    t.add_mother(2).await;
    t.add_mother(1).await;

    let err = t
        .engine
        .ledger
        .generate_codes(4, None, None, sku(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(err.available_slots(), Some(3));

    let snapshot = t.engine.capacity.snapshot().await.unwrap();
    assert_eq!(snapshot.reserved_codes, 0);
    assert_eq!(snapshot.available_slots, 3);
}

#[tokio::test]
async fn test_unused_codes_reserve_capacity_immediately() {
    let t = TestEngine::new();
    t.add_mother(3).await;

    t.generate(2).await;
    let snapshot = t.engine.capacity.snapshot().await.unwrap();
    assert_eq!(snapshot.total_slots, 3);
    assert_eq!(snapshot.alive_mothers, 1);
    assert_eq!(snapshot.reserved_codes, 2);
    assert_eq!(snapshot.available_slots, 1);
    assert!(snapshot.warn);

    t.generate(1).await;
    let err = t
        .engine
        .ledger
        .generate_codes(1, None, None, sku(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);

    let snapshot = t.engine.capacity.snapshot().await.unwrap();
    assert!(snapshot.reserved_codes <= snapshot.total_slots);
}

#[tokio::test]
async fn test_codes_past_deadline_release_capacity() {
    let t = TestEngine::new();
    t.add_mother(3).await;
    let deadline = t.now() + Duration::hours(1);
    t.engine
        .ledger
        .generate_codes(3, None, Some(deadline), sku(1, 1))
        .await
        .unwrap();
    assert_eq!(t.engine.capacity.snapshot().await.unwrap().available_slots, 0);

    t.clock.advance(Duration::hours(2));
    assert_eq!(t.engine.capacity.snapshot().await.unwrap().available_slots, 3);
}

#[tokio::test]
async fn test_silent_mothers_drop_out_of_capacity() {
    let t = TestEngine::new();
    let mother = t.add_mother(4).await;
    t.engine
        .repos
        .mothers
        .touch_alive(mother.id, t.now())
        .await
        .unwrap();
    assert_eq!(t.engine.capacity.snapshot().await.unwrap().total_slots, 4);

    t.clock
        .advance(Duration::seconds(t.config.engine.alive_grace_seconds + 1));
    let snapshot = t.engine.capacity.snapshot().await.unwrap();
    assert_eq!(snapshot.total_slots, 0);
    assert_eq!(snapshot.alive_mothers, 0);
}

#[tokio::test]
async fn test_invalid_batch_requests_are_rejected() {
    let t = TestEngine::new();
    t.add_mother(3).await;

    let err = t
        .engine
        .ledger
        .generate_codes(0, None, None, sku(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let past = t.now() - Duration::minutes(1);
    let err = t
        .engine
        .ledger
        .generate_codes(1, None, Some(past), sku(1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = t
        .engine
        .ledger
        .generate_codes(1, None, None, sku(-1, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}
