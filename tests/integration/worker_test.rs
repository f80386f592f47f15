//! Integration tests for the job queue, runner, scheduler and seat sweep.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::future::join_all;

use seatbroker_database::HoldOutcome;
use seatbroker_entity::{InviteTarget, JobPayload, JobStatus, SeatStatus};
use seatbroker_worker::{CronScheduler, JobQueue};

use crate::helpers::TestEngine;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pool_sync_enqueue_creates_one_job() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let queue = t.queue();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .enqueue(JobPayload::PoolSyncMother {
                        mother_id: mother.id,
                        group_id: None,
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|e| e.created).count(), 1);
    let first = results[0].job.id;
    assert!(results.iter().all(|e| e.job.id == first));
    assert_eq!(queue.stats().await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_scheduled_pool_sync_is_deduplicated_and_runs() {
    let t = TestEngine::new();
    let a = t.add_mother(1).await;
    let b = t.add_mother(1).await;
    t.provider.set_members(&a.team_id, &["member@example.com"]);
    let queue = t.queue();

    let created = CronScheduler::enqueue_pool_syncs(&queue, &t.engine.pool)
        .await
        .unwrap();
    assert_eq!(created, 2);
    let created = CronScheduler::enqueue_pool_syncs(&queue, &t.engine.pool)
        .await
        .unwrap();
    assert_eq!(created, 0);

    let runner = t.runner(Arc::clone(&queue));
    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Succeeded));
    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Succeeded));
    assert_eq!(runner.run_once().await.unwrap(), None);

    assert_eq!(t.engine.allocator.count_occupied(a.id).await.unwrap(), 1);
    assert_eq!(t.engine.allocator.count_occupied(b.id).await.unwrap(), 0);
    assert_eq!(queue.stats().await.unwrap().succeeded, 2);
}

#[tokio::test]
async fn test_drain_job_completes_with_report() {
    let t = TestEngine::new();
    t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    t.engine
        .switcher
        .switch(&codes[0], "a@example.com", true)
        .await
        .unwrap();
    let queue = t.queue();

    CronScheduler::enqueue_switch_drain(&queue, 10).await.unwrap();
    let runner = t.runner(Arc::clone(&queue));
    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Succeeded));

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn test_failed_invite_job_is_retried_after_backoff() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let codes = t.generate(1).await;
    t.engine.ledger.redeem(&codes[0], "a@example.com").await.unwrap();
    t.provider.fail_team(&mother.team_id, 503);

    let queue = t.queue();
    let enqueued = queue
        .enqueue(JobPayload::ResendInvite {
            targets: vec![InviteTarget {
                mother_id: mother.id,
                email: "a@example.com".to_string(),
            }],
        })
        .await
        .unwrap();
    let runner = t.runner(Arc::clone(&queue));

    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Pending));
    let job = queue.find(enqueued.job.id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.is_some());
    assert_eq!(runner.run_once().await.unwrap(), None);

    t.provider.heal_team(&mother.team_id);
    t.clock
        .advance(Duration::seconds(t.config.worker.backoff_base_seconds as i64 + 1));
    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Succeeded));
    assert_eq!(t.provider.invites_for(&mother.team_id).len(), 2);
}

#[tokio::test]
async fn test_job_fails_when_attempts_are_exhausted() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    t.provider.fail_team(&mother.team_id, 503);

    let queue = t.queue();
    queue
        .enqueue_with_attempts(
            JobPayload::ResendInvite {
                targets: vec![InviteTarget {
                    mother_id: mother.id,
                    email: "a@example.com".to_string(),
                }],
            },
            1,
        )
        .await
        .unwrap();
    let runner = t.runner(Arc::clone(&queue));
    assert_eq!(runner.run_once().await.unwrap(), Some(JobStatus::Failed));
    assert_eq!(queue.stats().await.unwrap().failed, 1);
}

#[tokio::test]
async fn test_abandoned_lease_is_reclaimed() {
    let t = TestEngine::new();
    let queue = t.queue();
    queue
        .enqueue(JobPayload::DrainSwitchQueue { limit: 5 })
        .await
        .unwrap();
    let abandoned = queue.claim().await.unwrap().unwrap();

    let other = JobQueue::new(
        t.engine.repos.jobs.clone(),
        t.engine.lock.clone(),
        t.clock.clone(),
        t.config.worker.clone(),
        "other-worker".to_string(),
        StdDuration::from_secs(5),
    );
    assert!(other.claim().await.unwrap().is_none());

    t.clock
        .advance(Duration::seconds(t.config.worker.lease_seconds as i64 + 1));
    let reclaimed = other.claim().await.unwrap().unwrap();
    assert_eq!(reclaimed.id, abandoned.id);
    assert_eq!(reclaimed.locked_by.as_deref(), Some("other-worker"));

    // The original holder can no longer settle the job.
    assert!(!queue.complete(&abandoned, None).await.unwrap());
    assert!(other.complete(&reclaimed, None).await.unwrap());
}

#[tokio::test]
async fn test_stale_hold_is_swept_only_after_expiry() {
    let t = TestEngine::new();
    let mother = t.add_mother(1).await;
    let seat = t
        .engine
        .allocator
        .find_free_seat(mother.id)
        .await
        .unwrap()
        .unwrap();
    let held = match t
        .engine
        .allocator
        .hold(&seat, &mother.team_id, "a@example.com", None)
        .await
        .unwrap()
    {
        HoldOutcome::Held(held) => held,
        other => panic!("expected a hold, got {other:?}"),
    };
    assert_eq!(held.status, SeatStatus::Held);

    assert_eq!(t.engine.allocator.sweep_stale_holds().await.unwrap(), 0);
    t.clock
        .advance(Duration::seconds(t.config.engine.hold_ttl_seconds - 1));
    assert_eq!(t.engine.allocator.sweep_stale_holds().await.unwrap(), 0);

    t.clock.advance(Duration::seconds(2));
    assert_eq!(t.engine.allocator.sweep_stale_holds().await.unwrap(), 1);

    let seats = t.engine.allocator.list_for_mother(mother.id).await.unwrap();
    let seat = seats.iter().find(|s| s.id == held.id).unwrap();
    assert_eq!(seat.status, SeatStatus::Free);
    assert!(seat.held_until.is_none());
    assert!(seat.team_id.is_none());
    assert!(seat.email.is_none());
    assert!(seat.code_id.is_none());
}
