//! Durable job scheduler backed by the scheduled_jobs table.
//!
//! Jobs survive process restarts: scheduling inserts a row, and a poll loop
//! claims due rows with FOR UPDATE SKIP LOCKED so multiple instances can run
//! the loop without double-executing a job. Handlers are registered by name
//! at startup; a claimed job whose handler is missing is marked failed.

use crate::models::ScheduledJob;
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

pub type JobHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// How long a claimed job may sit in 'running' before another poller may
/// take it over. Covers a process that crashed between claim and finish.
const RUNNING_LEASE_SECS: f64 = 300.0;

pub struct JobScheduler {
    pool: PgPool,
    handlers: RwLock<HashMap<String, JobHandler>>,
    poll_interval: Duration,
}

impl JobScheduler {
    pub fn new(pool: PgPool, poll_secs: u64) -> Self {
        Self {
            pool,
            handlers: RwLock::new(HashMap::new()),
            poll_interval: Duration::from_secs(poll_secs),
        }
    }

    /// Register a handler for a job name. Must be called before `start`.
    pub async fn define<F>(&self, name: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> BoxFuture<'static, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(name.to_string(), Arc::new(handler));
        info!("Registered job handler: {}", name);
    }

    /// Enqueue a job to run after `delay`. The row is the source of truth;
    /// nothing is held in memory.
    pub async fn schedule(
        &self,
        delay: Duration,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, sqlx::Error> {
        let delay_secs = delay.as_secs() as f64;
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO scheduled_jobs (name, payload, run_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(&payload)
        .bind(delay_secs)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Cancel a pending job by id. No-op when the job already ran.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET status = 'done' WHERE id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Run the poll loop until the process shuts down
    pub async fn start(self: Arc<Self>) {
        info!(
            "Job scheduler started, polling every {:?}",
            self.poll_interval
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.run_due_jobs().await {
                error!("Scheduler poll failed: {}", e);
            }
        }
    }

    /// Claim and execute every job that is due. Claiming flips the row to
    /// 'running' under SKIP LOCKED so a concurrent poller passes it by.
    /// A row stuck in 'running' past the lease (a poller crashed mid-job)
    /// is claimed again; handlers are reference-keyed so a re-run is safe.
    pub async fn run_due_jobs(&self) -> Result<usize, sqlx::Error> {
        let claimed: Vec<ScheduledJob> = sqlx::query_as::<_, ScheduledJob>(
            r#"
            UPDATE scheduled_jobs
            SET status = 'running', attempts = attempts + 1
            WHERE id IN (
                SELECT id FROM scheduled_jobs
                WHERE (status = 'pending' AND run_at <= NOW())
                   OR (status = 'running' AND run_at <= NOW() - make_interval(secs => $1))
                ORDER BY run_at
                LIMIT 50
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, name, payload, run_at, attempts, max_attempts, status,
                      last_error, created_at
            "#,
        )
        .bind(RUNNING_LEASE_SECS)
        .fetch_all(&self.pool)
        .await?;

        let count = claimed.len();
        for job in claimed {
            self.execute(job).await;
        }

        Ok(count)
    }

    async fn execute(&self, job: ScheduledJob) {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job.name).cloned()
        };

        let Some(handler) = handler else {
            warn!("No handler registered for job '{}', marking failed", job.name);
            let _ = self
                .finish(job.id, "failed", Some("no handler registered"))
                .await;
            return;
        };

        match handler(job.payload.clone()).await {
            Ok(()) => {
                if let Err(e) = self.finish(job.id, "done", None).await {
                    error!("Failed to mark job {} done: {}", job.id, e);
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Job '{}' ({}) failed: {}", job.name, job.id, message);

                if job.attempts >= job.max_attempts {
                    let _ = self.finish(job.id, "failed", Some(&message)).await;
                } else {
                    // Back off linearly on the attempt count before retrying
                    let backoff = 10.0 * job.attempts as f64;
                    let result = sqlx::query(
                        r#"
                        UPDATE scheduled_jobs
                        SET status = 'pending',
                            run_at = NOW() + make_interval(secs => $2),
                            last_error = $3
                        WHERE id = $1
                        "#,
                    )
                    .bind(job.id)
                    .bind(backoff)
                    .bind(&message)
                    .execute(&self.pool)
                    .await;
                    if let Err(e) = result {
                        error!("Failed to reschedule job {}: {}", job.id, e);
                    }
                }
            }
        }
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE scheduled_jobs SET status = $2, last_error = $3 WHERE id = $1")
            .bind(job_id)
            .bind(status)
            .bind(last_error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
