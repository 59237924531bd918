//! Append-only activity log.
//!
//! Business events are written as JSON lines to a daily file under the
//! configured directory. Writing is best-effort: a failed append is logged
//! and never fails the operation that produced the event.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct ActivityRecord {
    timestamp: String,
    event: String,
    detail: serde_json::Value,
}

pub struct ActivityLog {
    dir: PathBuf,
    // Serializes appends so concurrent events never interleave a line
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_env() -> Self {
        let dir = std::env::var("ACTIVITY_LOG_DIR").unwrap_or_else(|_| "activity".to_string());
        Self::new(dir)
    }

    fn current_file(&self) -> PathBuf {
        let day = Utc::now().format("%Y-%m-%d");
        self.dir.join(format!("activity-{}.jsonl", day))
    }

    async fn append(&self, event: &str, detail: serde_json::Value) {
        let record = ActivityRecord {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            detail,
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize activity record: {}", e);
                return;
            }
        };

        let _guard = self.write_lock.lock().await;

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Failed to create activity dir: {}", e);
            return;
        }

        let path = self.current_file();
        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to append activity record: {}", e);
        }
    }

    pub async fn trip_created(&self, trip_id: Uuid, rider_id: Uuid, kind: &str, fare: i64) {
        self.append(
            "trip_created",
            json!({ "trip_id": trip_id, "rider_id": rider_id, "kind": kind, "fare": fare }),
        )
        .await;
    }

    pub async fn trip_accepted(&self, trip_id: Uuid, driver_id: Uuid) {
        self.append(
            "trip_accepted",
            json!({ "trip_id": trip_id, "driver_id": driver_id }),
        )
        .await;
    }

    pub async fn trip_cancelled(&self, trip_id: Uuid, by: &str, reason: &str) {
        self.append(
            "trip_cancelled",
            json!({ "trip_id": trip_id, "by": by, "reason": reason }),
        )
        .await;
    }

    pub async fn trip_expired(&self, trip_id: Uuid, attempts: i32) {
        self.append(
            "trip_expired",
            json!({ "trip_id": trip_id, "attempts": attempts }),
        )
        .await;
    }

    pub async fn trip_settled(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
        earnings: i64,
        commission: i64,
    ) {
        self.append(
            "trip_settled",
            json!({
                "trip_id": trip_id,
                "driver_id": driver_id,
                "driver_earnings": earnings,
                "commission": commission,
            }),
        )
        .await;
    }

    pub async fn wallet_funded(&self, owner_id: Uuid, amount: i64, reference: &str) {
        self.append(
            "wallet_funded",
            json!({ "owner_id": owner_id, "amount": amount, "reference": reference }),
        )
        .await;
    }

    pub async fn payout_initiated(&self, driver_id: Uuid, amount: i64, reference: &str) {
        self.append(
            "payout_initiated",
            json!({ "driver_id": driver_id, "amount": amount, "reference": reference }),
        )
        .await;
    }

    pub async fn reward_claimed(&self, task_id: Uuid, driver_id: Uuid, reward: i64) {
        self.append(
            "reward_claimed",
            json!({ "task_id": task_id, "driver_id": driver_id, "reward": reward }),
        )
        .await;
    }
}
