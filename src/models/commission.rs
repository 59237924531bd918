//! Commission audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only commission record, created once per completed trip.
/// An audit trail parallel to the transaction log; never mutated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub amount: i64,
    pub credited: bool,
    pub created_at: DateTime<Utc>,
}
