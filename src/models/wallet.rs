//! Wallet and platform-wallet models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Wallet owner discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Rider,
    Driver,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Rider => "rider",
            OwnerType::Driver => "driver",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rider" => Some(OwnerType::Rider),
            "driver" => Some(OwnerType::Driver),
            _ => None,
        }
    }
}

/// A wallet holding a non-negative balance in integer minor currency units.
/// The balance is only ever mutated inside a transaction that also writes a
/// ledger Transaction record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_type: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn owner_type_enum(&self) -> Option<OwnerType> {
        OwnerType::from_str(&self.owner_type)
    }
}

/// Singleton platform wallet credited with commission on every completed trip
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AppWallet {
    pub id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_type_round_trip() {
        assert_eq!(OwnerType::Rider.as_str(), "rider");
        assert_eq!(OwnerType::from_str("driver"), Some(OwnerType::Driver));
        assert_eq!(OwnerType::from_str("cat"), None);
    }
}
