//! Trip completion and settlement.
//!
//! Completion is the money moment: the driver's earnings are credited, the
//! platform commission is booked, and the trip flips to its terminal status.
//! Each step is individually idempotent (keyed by the trip's settlement
//! reference or the unique commission row), so a retry after a crash resumes
//! without double-paying.

use crate::error::{AppError, AppResult};
use crate::models::{TimestampField, TransactionType, Trip, TripKind, OwnerType};
use crate::notifier::{Notifier, WsMessage};
use crate::push::PushClient;
use crate::repositories::{DriverRepository, TaskRepository, TripRepository, WalletRepository};
use crate::services::activity::ActivityLog;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct SettlementService {
    trips: Arc<TripRepository>,
    wallets: Arc<WalletRepository>,
    drivers: Arc<DriverRepository>,
    tasks: Arc<TaskRepository>,
    notifier: Arc<Notifier>,
    push: Arc<PushClient>,
    activity: Arc<ActivityLog>,
}

impl SettlementService {
    pub fn new(
        trips: Arc<TripRepository>,
        wallets: Arc<WalletRepository>,
        drivers: Arc<DriverRepository>,
        tasks: Arc<TaskRepository>,
        notifier: Arc<Notifier>,
        push: Arc<PushClient>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            trips,
            wallets,
            drivers,
            tasks,
            notifier,
            push,
            activity,
        }
    }

    /// Complete a trip and settle its money. Safe to call more than once:
    /// a trip that already settled is returned unchanged.
    pub async fn complete(&self, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self
            .trips
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))?;

        let kind = trip.kind_enum();
        let terminal = kind.terminal_status();
        let pre_completion = kind.pre_completion_status();

        // Already settled: nothing to do
        if trip.status_enum() == terminal && trip.driver_paid {
            return Ok(trip);
        }

        if trip.status_enum() != pre_completion {
            return Err(AppError::InvalidStateTransition {
                action: "complete",
                expected: pre_completion.as_str(),
                actual: trip.status.clone(),
            });
        }

        if !trip.is_paid() {
            return Err(AppError::Validation(
                "Trip fare has not been paid".to_string(),
            ));
        }

        let driver_id = trip
            .driver_id
            .ok_or_else(|| AppError::Validation("Trip has no assigned driver".to_string()))?;

        let driver_wallet = self
            .wallets
            .find_by_owner(driver_id, OwnerType::Driver)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Wallet for driver {} not found", driver_id))
            })?;

        // Credit the driver. The pending row pins the reference; crediting
        // it again after a crash is a no-op.
        self.wallets
            .create_pending_transaction(
                driver_wallet.id,
                TransactionType::DriverPayment,
                trip.driver_earnings,
                "wallet",
                Some(trip.id),
                &trip.settlement_reference(),
                json!({ "trip_id": trip.id, "fare": trip.fare }),
            )
            .await?;

        let (credited_wallet, _) = self
            .wallets
            .credit_wallet(&trip.settlement_reference())
            .await?;

        // Book the platform's cut; unique per trip
        self.wallets.fund_app_wallet(trip.id, trip.commission).await?;

        // Flip to terminal. A concurrent completion loses this update and
        // sees the already-settled trip on re-read. The flip winner alone
        // bumps the driver's trip counter, so a retry never double-counts.
        let flipped = self
            .trips
            .settle_terminal_if(trip_id, pre_completion, terminal)
            .await?;
        if flipped.is_some() {
            self.drivers.increment_completed_trips(driver_id).await?;
        }

        let completion_field = match kind {
            TripKind::Ride => TimestampField::CompletedAt,
            TripKind::Delivery => TimestampField::DeliveredAt,
        };
        self.trips.record_timestamp(trip_id, completion_field).await?;

        let settled = self
            .trips
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))?;

        if let Err(e) = self.drivers.set_busy(driver_id, false).await {
            warn!("Failed to release driver {} after settlement: {}", driver_id, e);
        }

        info!(
            "Settled trip {}: {} to driver {}, {} commission",
            trip_id, trip.driver_earnings, driver_id, trip.commission
        );

        self.notify_settled(&settled, driver_id, credited_wallet.balance)
            .await;

        Ok(settled)
    }

    /// Post-settlement fan-out. Nothing here can fail the settlement.
    async fn notify_settled(&self, trip: &Trip, driver_id: Uuid, driver_balance: i64) {
        self.activity
            .trip_settled(trip.id, driver_id, trip.driver_earnings, trip.commission)
            .await;

        self.notifier
            .emit_to_user(
                trip.rider_id,
                WsMessage::TripCompleted {
                    trip_id: trip.id.to_string(),
                    fare: trip.fare,
                },
            )
            .await;
        self.notifier
            .emit_to_driver(
                driver_id,
                WsMessage::WalletCredited {
                    amount: trip.driver_earnings,
                    balance: driver_balance,
                },
            )
            .await;

        match self.drivers.find_by_id(driver_id).await {
            Ok(Some(driver)) => {
                let invalid = self
                    .push
                    .send(
                        &driver.device_tokens,
                        "Trip completed",
                        &format!("You earned {} from this trip", trip.driver_earnings),
                        json!({ "trip_id": trip.id }),
                    )
                    .await;
                for token in invalid {
                    if let Err(e) = self.drivers.remove_device_token(driver_id, &token).await {
                        warn!("Failed to prune device token: {}", e);
                    }
                }

                // Advance any reward tasks counting this trip kind
                if let Err(e) = self.advance_reward_tasks(driver_id, &trip.kind).await {
                    error!("Failed to advance reward tasks for {}: {}", driver_id, e);
                }
            }
            Ok(None) => warn!("Driver {} vanished before notification", driver_id),
            Err(e) => error!("Failed to load driver {} for notification: {}", driver_id, e),
        }
    }

    async fn advance_reward_tasks(&self, driver_id: Uuid, trip_kind: &str) -> AppResult<()> {
        let tasks = self.tasks.find_by_kind(trip_kind).await?;
        for task in tasks {
            self.tasks
                .advance_progress(task.id, driver_id, task.goal)
                .await?;
        }
        Ok(())
    }
}
