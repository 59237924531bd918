use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Driver account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub vehicle_type: String,
    /// Set while the driver is on an active ride; cleared on completion or
    /// cancellation
    pub busy: bool,
    pub completed_trips: i64,
    pub device_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn vehicle_type_enum(&self) -> Option<crate::models::VehicleType> {
        crate::models::VehicleType::from_str(&self.vehicle_type).ok()
    }
}
