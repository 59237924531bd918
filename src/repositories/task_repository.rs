//! Repository for reward tasks and per-driver progress.
//!
//! Progress counters are increment-and-cap: they never decrement, stop at
//! the goal, and never touch rows whose reward was already claimed.

use crate::error::RepositoryError;
use crate::models::{RewardTask, TaskProgress};
use sqlx::PgPool;
use uuid::Uuid;

pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a reward task definition
    pub async fn create_task(
        &self,
        title: &str,
        kind: &str,
        goal: i32,
        reward: i64,
    ) -> Result<RewardTask, RepositoryError> {
        let task = sqlx::query_as::<_, RewardTask>(
            "INSERT INTO reward_tasks (title, kind, goal, reward)
             VALUES ($1, $2, $3, $4)
             RETURNING id, title, kind, goal, reward, created_at",
        )
        .bind(title)
        .bind(kind)
        .bind(goal)
        .bind(reward)
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }

    /// All task definitions counting a trip kind
    pub async fn find_by_kind(&self, kind: &str) -> Result<Vec<RewardTask>, RepositoryError> {
        let tasks = sqlx::query_as::<_, RewardTask>(
            "SELECT id, title, kind, goal, reward, created_at FROM reward_tasks WHERE kind = $1",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    pub async fn find_task(&self, task_id: Uuid) -> Result<Option<RewardTask>, RepositoryError> {
        let task = sqlx::query_as::<_, RewardTask>(
            "SELECT id, title, kind, goal, reward, created_at FROM reward_tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// Advance a driver's progress on one task by a single completion.
    /// Capped at the goal, marks `completed` when the goal is reached, and
    /// leaves claimed rows untouched.
    pub async fn advance_progress(
        &self,
        task_id: Uuid,
        driver_id: Uuid,
        goal: i32,
    ) -> Result<Option<TaskProgress>, RepositoryError> {
        let progress = sqlx::query_as::<_, TaskProgress>(
            r#"
            INSERT INTO task_progress (task_id, driver_id, count, completed)
            VALUES ($1, $2, LEAST(1, $3), LEAST(1, $3) >= $3)
            ON CONFLICT (task_id, driver_id) DO UPDATE
            SET count = LEAST(task_progress.count + 1, $3),
                completed = LEAST(task_progress.count + 1, $3) >= $3,
                updated_at = NOW()
            WHERE NOT task_progress.claimed
            RETURNING task_id, driver_id, count, completed, claimed, updated_at
            "#,
        )
        .bind(task_id)
        .bind(driver_id)
        .bind(goal)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }

    pub async fn find_progress(
        &self,
        task_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<TaskProgress>, RepositoryError> {
        let progress = sqlx::query_as::<_, TaskProgress>(
            "SELECT task_id, driver_id, count, completed, claimed, updated_at
             FROM task_progress WHERE task_id = $1 AND driver_id = $2",
        )
        .bind(task_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }

    /// Mark a completed task claimed; matches only once
    pub async fn claim_if_completed(
        &self,
        task_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<TaskProgress>, RepositoryError> {
        let progress = sqlx::query_as::<_, TaskProgress>(
            r#"
            UPDATE task_progress
            SET claimed = TRUE, updated_at = NOW()
            WHERE task_id = $1 AND driver_id = $2 AND completed AND NOT claimed
            RETURNING task_id, driver_id, count, completed, claimed, updated_at
            "#,
        )
        .bind(task_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(progress)
    }
}
