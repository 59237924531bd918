//! Ledger transaction models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transaction types for fund movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Gateway top-up into a rider or driver wallet
    Funding,
    /// Rider fare payment for a trip
    Payment,
    /// Withdrawal transferred out through the gateway
    Payout,
    /// Driver earnings credited on trip completion
    DriverPayment,
    /// Reward credited for a completed task
    Reward,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funding => "funding",
            Self::Payment => "payment",
            Self::Payout => "payout",
            Self::DriverPayment => "driver_payment",
            Self::Reward => "reward",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "funding" => Some(Self::Funding),
            "payment" => Some(Self::Payment),
            "payout" => Some(Self::Payout),
            "driver_payment" => Some(Self::DriverPayment),
            "reward" => Some(Self::Reward),
            _ => None,
        }
    }
}

/// Transaction status. `pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Ledger entry. Immutable once settled; the unique `reference` is the
/// idempotency key for webhook replays and scheduled-job retries.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub tx_type: String,
    pub amount: i64,
    pub status: String,
    pub channel: String,
    pub trip_id: Option<Uuid>,
    pub reference: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn tx_type_enum(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.tx_type)
    }

    pub fn status_enum(&self) -> Option<TransactionStatus> {
        TransactionStatus::from_str(&self.status)
    }

    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Signed amount for conservation checks: credits positive, debits negative
    pub fn signed_amount(&self) -> i64 {
        match self.tx_type_enum() {
            Some(TransactionType::Funding)
            | Some(TransactionType::DriverPayment)
            | Some(TransactionType::Reward) => self.amount,
            Some(TransactionType::Payment) | Some(TransactionType::Payout) => -self.amount,
            None => 0,
        }
    }
}
