//! Integration tests for the durable job scheduler.

mod helpers;

use helpers::TestDatabase;
use ridelink_backend::services::JobScheduler;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_due_job_runs_once() {
    let db = TestDatabase::new().await;
    let scheduler = Arc::new(JobScheduler::new(db.pool.clone(), 1));

    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    scheduler
        .define("test_counter", move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await;

    scheduler
        .schedule(Duration::ZERO, "test_counter", serde_json::json!({}))
        .await
        .unwrap();

    scheduler.run_due_jobs().await.unwrap();
    // Job is done; a second poll must not run it again
    scheduler.run_due_jobs().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_future_job_not_claimed_early() {
    let db = TestDatabase::new().await;
    let scheduler = Arc::new(JobScheduler::new(db.pool.clone(), 1));

    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    scheduler
        .define("test_future", move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await;

    scheduler
        .schedule(Duration::from_secs(3600), "test_future", serde_json::json!({}))
        .await
        .unwrap();

    scheduler.run_due_jobs().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_failing_job_is_rescheduled() {
    let db = TestDatabase::new().await;
    let scheduler = Arc::new(JobScheduler::new(db.pool.clone(), 1));

    scheduler
        .define("test_failing", move |_payload| {
            Box::pin(async move { anyhow::bail!("deliberate failure") })
        })
        .await;

    let job_id = scheduler
        .schedule(Duration::ZERO, "test_failing", serde_json::json!({}))
        .await
        .unwrap();

    scheduler.run_due_jobs().await.unwrap();

    // First failure: back to pending with the error recorded
    let (status, last_error): (String, Option<String>) =
        sqlx::query_as("SELECT status, last_error FROM scheduled_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&db.pool)
            .await
            .unwrap();
    assert_eq!(status, "pending");
    assert!(last_error.unwrap().contains("deliberate failure"));
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_cancelled_job_never_runs() {
    let db = TestDatabase::new().await;
    let scheduler = Arc::new(JobScheduler::new(db.pool.clone(), 1));

    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    scheduler
        .define("test_cancelled", move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await;

    let job_id = scheduler
        .schedule(Duration::ZERO, "test_cancelled", serde_json::json!({}))
        .await
        .unwrap();
    assert!(scheduler.cancel(job_id).await.unwrap());

    scheduler.run_due_jobs().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_stale_running_job_is_reclaimed() {
    let db = TestDatabase::new().await;
    let scheduler = Arc::new(JobScheduler::new(db.pool.clone(), 1));

    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    scheduler
        .define("test_stale", move |_payload| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await;

    let job_id = scheduler
        .schedule(Duration::ZERO, "test_stale", serde_json::json!({}))
        .await
        .unwrap();

    // A poller claimed the job and died; the row is stranded in 'running'
    sqlx::query(
        "UPDATE scheduled_jobs SET status = 'running', run_at = NOW() - INTERVAL '10 minutes' WHERE id = $1",
    )
    .bind(job_id)
    .execute(&db.pool)
    .await
    .unwrap();

    scheduler.run_due_jobs().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A freshly claimed job is still within its lease
    sqlx::query("UPDATE scheduled_jobs SET status = 'running', run_at = NOW() WHERE id = $1")
        .bind(job_id)
        .execute(&db.pool)
        .await
        .unwrap();

    scheduler.run_due_jobs().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
