//! Integration tests for pool maintenance.

use std::sync::Arc;

use seatbroker_core::types::GroupId;
use seatbroker_database::Repositories;
use seatbroker_entity::{InviteTarget, MotherGroup, MotherStatus, SeatStatus};

use crate::helpers::{test_config, FlakySeats, TestEngine};

#[tokio::test]
async fn test_sync_adopts_remote_members() {
    let t = TestEngine::new();
    let mother = t.add_mother(3).await;
    t.provider
        .set_members(&mother.team_id, &["One@Example.com", "two@example.com"]);

    let report = t.engine.pool.sync_mother(mother.id, None).await.unwrap();
    assert_eq!(report.members_adopted, 2);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 2);
    assert!(t.mother(mother.id).await.last_seen_alive_at.is_some());

    let seat = t
        .engine
        .allocator
        .find_active(&mother.team_id, "one@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seat.status, SeatStatus::Used);
    assert_eq!(seat.member_id.as_deref(), Some("member-0"));

    let again = t.engine.pool.sync_mother(mother.id, None).await.unwrap();
    assert_eq!(again.members_adopted, 0);
    assert_eq!(again.members_skipped, 2);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 2);

    // Adopted members are removed by member id.
    let counts = t
        .engine
        .pool
        .remove_members(&[InviteTarget {
            mother_id: mother.id,
            email: "one@example.com".to_string(),
        }])
        .await
        .unwrap();
    assert_eq!(counts.succeeded, 1);
    assert_eq!(
        t.provider.removed(),
        vec![(mother.team_id.clone(), "member-0".to_string())]
    );
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_sync_renames_team_to_group_pattern() {
    let t = TestEngine::new();
    let group = MotherGroup {
        id: GroupId::new(),
        name: "north".to_string(),
        team_name_prefix: "north".to_string(),
    };
    t.engine.repos.mothers.insert_group(&group).await.unwrap();
    let mother = t.add_mother_in_group(2, Some(group.id)).await;

    let report = t.engine.pool.sync_mother(mother.id, Some(group.id)).await.unwrap();
    assert!(report.renamed);
    let renamed = t.provider.renamed();
    assert_eq!(renamed.len(), 1);
    assert_eq!(renamed[0].1, group.target_team_name(mother.id));
    assert_eq!(
        t.mother(mother.id).await.team_name,
        Some(group.target_team_name(mother.id))
    );

    let again = t.engine.pool.sync_mother(mother.id, Some(group.id)).await.unwrap();
    assert!(!again.renamed);
    assert_eq!(t.provider.renamed().len(), 1);
}

#[tokio::test]
async fn test_sync_with_revoked_credentials_invalidates_mother() {
    let t = TestEngine::new();
    let mother = t.add_mother(2).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    t.provider.fail_team(&mother.team_id, 401);

    t.engine.pool.sync_mother(mother.id, None).await.unwrap();
    assert_eq!(t.mother(mother.id).await.status, MotherStatus::Invalid);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_and_remove_free_seats() {
    let t = TestEngine::new();
    let mother = t.add_mother(3).await;
    let codes = t.generate(2).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    t.engine.ledger.redeem(&codes[1], "b@example.com").await.unwrap();

    let counts = t
        .engine
        .pool
        .cancel_invites(&[InviteTarget {
            mother_id: mother.id,
            email: "a@example.com".to_string(),
        }])
        .await
        .unwrap();
    assert_eq!(counts.succeeded, 1);
    assert!(!counts.has_failures());

    let counts = t
        .engine
        .pool
        .remove_members(&[
            InviteTarget {
                mother_id: mother.id,
                email: "B@example.com".to_string(),
            },
            InviteTarget {
                mother_id: seatbroker_core::types::MotherId::new(),
                email: "c@example.com".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.succeeded, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_remote_target_counts_as_done() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    t.provider.fail_team(&mother.team_id, 404);

    let counts = t
        .engine
        .pool
        .cancel_invites(&[InviteTarget {
            mother_id: mother.id,
            email: "gone@example.com".to_string(),
        }])
        .await
        .unwrap();
    assert_eq!(counts.succeeded, 1);
    assert_eq!(t.mother(mother.id).await.status, MotherStatus::Active);
}

#[tokio::test]
async fn test_local_release_failure_counts_target_as_failed() {
    let mut repos = Repositories::memory();
    let seats = Arc::new(FlakySeats::new(repos.seats.clone()));
    repos.seats = seats.clone();
    let t = TestEngine::with_repos(test_config(), repos);
    let mother = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    seats.fail_releases();

    let counts = t
        .engine
        .pool
        .cancel_invites(&[InviteTarget {
            mother_id: mother.id,
            email: "a@example.com".to_string(),
        }])
        .await
        .unwrap();
    assert_eq!(counts.succeeded, 0);
    assert_eq!(counts.failed, 1);
    assert!(counts.has_failures());
    assert_eq!(t.engine.allocator.count_occupied(mother.id).await.unwrap(), 1);
}
