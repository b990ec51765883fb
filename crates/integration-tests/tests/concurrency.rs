// Concurrent dequeue on a shared file database

mod common;

use common::Harness;
use relsync_core::domain::JobStatus;
use relsync_core::port::release_provider::mocks::ScriptedReleaseProvider;
use std::collections::HashSet;
use std::sync::Arc;

const JOBS: usize = 40;
const CONSUMERS: usize = 6;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pop_no_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let h = Harness::build(&url, ScriptedReleaseProvider::new(), None).await;

    let mut created = HashSet::new();
    for i in 0..JOBS {
        let id = h
            .queue
            .add_sync_module_job(i as i64 + 1, &format!("acme/m{}", i), None, None)
            .await
            .unwrap();
        created.insert(id);
    }

    let mut handles = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&h.queue);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.get_next_job().await.unwrap() {
                assert_eq!(job.status, JobStatus::Running);
                claimed.push(job.id);
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "job {} was dequeued twice", id);
        }
    }

    assert_eq!(total, JOBS);
    assert_eq!(seen, created);
    assert_eq!(
        h.queue.count_by_status(JobStatus::Running).await.unwrap(),
        JOBS as i64
    );
    assert_eq!(h.queue.count_by_status(JobStatus::Pending).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_and_complete_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("race.db").display());
    let h = Harness::build(&url, ScriptedReleaseProvider::new(), None).await;

    let id = h.queue.add_sync_batch_job(5, None).await.unwrap();
    h.queue.get_next_job().await.unwrap().unwrap();

    let q1 = Arc::clone(&h.queue);
    let q2 = Arc::clone(&h.queue);
    let complete = tokio::spawn(async move { q1.complete_job(id, None).await });
    let cancel = tokio::spawn(async move { q2.cancel_job(id).await });

    let completed = complete.await.unwrap();
    let cancelled = cancel.await.unwrap();
    assert!(
        completed.is_ok() != cancelled.is_ok(),
        "exactly one terminal transition must win"
    );

    let job = h.queue.get_job(id).await.unwrap();
    if completed.is_ok() {
        assert_eq!(job.status, JobStatus::Completed);
    } else {
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
