use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Rider / sender account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    /// Push tokens for this account's devices; stale tokens are pruned on
    /// delivery failure
    pub device_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
}
