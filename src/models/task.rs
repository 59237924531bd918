//! Reward task models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A reward task, e.g. "complete 10 rides"
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RewardTask {
    pub id: Uuid,
    pub title: String,
    /// Trip kind the task counts: "ride" or "delivery"
    pub kind: String,
    pub goal: i32,
    /// Reward amount in minor currency units, credited on claim
    pub reward: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-driver progress against a task. `count` only ever increases, capped at
/// the goal; claimed progress is never touched again.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub driver_id: Uuid,
    pub count: i32,
    pub completed: bool,
    pub claimed: bool,
    pub updated_at: DateTime<Utc>,
}
