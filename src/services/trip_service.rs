//! Trip state machine operations.
//!
//! Every transition runs as a conditional UPDATE in the repository, so two
//! racing callers can never both win: the loser's guard fails to match and
//! surfaces here as a state transition error or conflict. This service adds
//! the identity checks, the ordering rules (fare paid before movement), and
//! the notification fan-out around each transition.

use crate::auth::{Claims, Role};
use crate::error::{AppError, AppResult};
use crate::models::{
    CancelledBy, TimestampField, TransactionType, Trip, TripAction, TripStatus, OwnerType,
};
use crate::notifier::{Notifier, WsMessage};
use crate::repositories::{DebitParams, DriverRepository, TripRepository, WalletRepository};
use crate::services::activity::ActivityLog;
use crate::services::settlement::SettlementService;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct TripService {
    trips: Arc<TripRepository>,
    drivers: Arc<DriverRepository>,
    wallets: Arc<WalletRepository>,
    settlement: Arc<SettlementService>,
    notifier: Arc<Notifier>,
    activity: Arc<ActivityLog>,
}

impl TripService {
    pub fn new(
        trips: Arc<TripRepository>,
        drivers: Arc<DriverRepository>,
        wallets: Arc<WalletRepository>,
        settlement: Arc<SettlementService>,
        notifier: Arc<Notifier>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            trips,
            drivers,
            wallets,
            settlement,
            notifier,
            activity,
        }
    }

    async fn load(&self, trip_id: Uuid) -> AppResult<Trip> {
        self.trips
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))
    }

    fn require_assigned_driver(claims: &Claims, trip: &Trip) -> AppResult<Uuid> {
        let driver_id = trip
            .driver_id
            .ok_or_else(|| AppError::Validation("Trip has no assigned driver".to_string()))?;
        if !claims.is_admin() && claims.id != driver_id {
            return Err(AppError::Unauthorized(
                "Trip is assigned to another driver".to_string(),
            ));
        }
        Ok(driver_id)
    }

    fn require_rider(claims: &Claims, trip: &Trip) -> AppResult<()> {
        if !claims.is_admin() && claims.id != trip.rider_id {
            return Err(AppError::Unauthorized(
                "Trip belongs to another rider".to_string(),
            ));
        }
        Ok(())
    }

    /// Run a guarded transition, translating a failed guard into a state
    /// transition error that names the expected predecessor
    async fn transition(
        &self,
        trip: &Trip,
        action: TripAction,
        to: TripStatus,
    ) -> AppResult<Trip> {
        let kind = trip.kind_enum();
        let allowed = action.allowed_from(kind);
        if allowed.is_empty() {
            return Err(AppError::Validation(format!(
                "Action '{}' does not apply to a {}",
                action.as_str(),
                trip.kind
            )));
        }

        self.trips
            .update_status_if(trip.id, allowed, to)
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                action: action.as_str(),
                expected: action.expected_status(kind),
                actual: trip.status.clone(),
            })
    }

    /// Record a write-once lifecycle timestamp and return the fresh row
    async fn stamp_and_reload(
        &self,
        trip_id: Uuid,
        field: TimestampField,
    ) -> AppResult<Trip> {
        self.trips.record_timestamp(trip_id, field).await?;
        self.load(trip_id).await
    }

    /// Driver claims an open request. Exactly one concurrent caller wins;
    /// the rest get a conflict.
    pub async fn accept_trip(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        claims.require_role(Role::Driver)?;

        let accepted = self.trips.try_accept(trip_id, claims.id).await?;
        let trip = match accepted {
            Some(trip) => trip,
            None => {
                // Lost the race, or the request is gone
                let current = self.load(trip_id).await?;
                return Err(AppError::Conflict(format!(
                    "Trip is no longer open (status: {})",
                    current.status
                )));
            }
        };

        info!("Driver {} accepted trip {}", claims.id, trip_id);
        self.activity.trip_accepted(trip_id, claims.id).await;

        // Pre-booked trips do not occupy the driver until activation
        if !trip.is_scheduled_for_future() {
            self.drivers.set_busy(claims.id, true).await?;
        }

        self.notifier
            .emit_to_user(
                trip.rider_id,
                WsMessage::TripAccepted {
                    trip_id: trip.id.to_string(),
                    driver_id: claims.id.to_string(),
                },
            )
            .await;
        self.notifier
            .broadcast_trip_withdrawn(&trip.vehicle_type, trip.id)
            .await;

        Ok(trip)
    }

    pub async fn mark_arrived(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_assigned_driver(claims, &trip)?;

        self.transition(&trip, TripAction::Arrive, TripStatus::Arrived)
            .await?;
        let updated = self
            .stamp_and_reload(trip_id, TimestampField::ArrivedAt)
            .await?;

        self.notifier
            .emit_to_user(
                trip.rider_id,
                WsMessage::DriverArrived {
                    trip_id: trip_id.to_string(),
                },
            )
            .await;

        Ok(updated)
    }

    /// Rider pays the fare from their wallet. Idempotent: paying a paid trip
    /// returns it unchanged.
    pub async fn pay_trip(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_rider(claims, &trip)?;

        if trip.is_paid() {
            return Ok(trip);
        }
        if trip.is_terminal() {
            return Err(AppError::Validation(
                "Trip is no longer payable".to_string(),
            ));
        }
        if trip.driver_id.is_none() {
            return Err(AppError::Validation(
                "Trip must be accepted before payment".to_string(),
            ));
        }

        self.wallets
            .debit_wallet(DebitParams {
                owner_id: trip.rider_id,
                owner_type: OwnerType::Rider,
                amount: trip.fare,
                tx_type: TransactionType::Payment,
                channel: "wallet".to_string(),
                trip_id: Some(trip.id),
                reference: trip.fare_reference(),
                metadata: json!({ "trip_id": trip.id }),
            })
            .await?;

        let paid = match self.trips.mark_paid_if_unpaid(trip_id).await? {
            Some(trip) => trip,
            // Concurrent payment already flipped it; the debit above was
            // idempotent on the fare reference
            None => self.load(trip_id).await?,
        };

        info!("Trip {} paid: {}", trip_id, trip.fare);

        if let Some(driver_id) = paid.driver_id {
            self.notifier
                .emit_to_driver(
                    driver_id,
                    WsMessage::TripPaid {
                        trip_id: trip_id.to_string(),
                    },
                )
                .await;
        }

        Ok(paid)
    }

    /// Ride only: begin the journey. The fare must already be paid.
    pub async fn start_trip(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_assigned_driver(claims, &trip)?;
        self.require_paid_for(&trip, TripAction::Start)?;

        self.transition(&trip, TripAction::Start, TripStatus::Ongoing)
            .await?;
        let updated = self
            .stamp_and_reload(trip_id, TimestampField::StartedAt)
            .await?;

        self.notifier
            .emit_to_user(
                trip.rider_id,
                WsMessage::TripStarted {
                    trip_id: trip_id.to_string(),
                },
            )
            .await;

        Ok(updated)
    }

    /// Delivery only: the courier has collected the package
    pub async fn pick_up(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_assigned_driver(claims, &trip)?;

        self.transition(&trip, TripAction::PickUp, TripStatus::PickedUp)
            .await?;
        self.stamp_and_reload(trip_id, TimestampField::PickedUpAt)
            .await
    }

    /// Delivery only: the package is moving. The fare must already be paid.
    pub async fn start_transit(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_assigned_driver(claims, &trip)?;
        self.require_paid_for(&trip, TripAction::StartTransit)?;

        self.transition(&trip, TripAction::StartTransit, TripStatus::InTransit)
            .await?;
        let updated = self
            .stamp_and_reload(trip_id, TimestampField::InTransitAt)
            .await?;

        self.notifier
            .emit_to_user(
                trip.rider_id,
                WsMessage::TripStarted {
                    trip_id: trip_id.to_string(),
                },
            )
            .await;

        Ok(updated)
    }

    fn require_paid_for(&self, trip: &Trip, action: TripAction) -> AppResult<()> {
        if action.requires_payment(trip.kind_enum()) && !trip.is_paid() {
            return Err(AppError::Validation(
                "Fare must be paid before movement begins".to_string(),
            ));
        }
        Ok(())
    }

    /// Complete and settle the trip
    pub async fn complete_trip(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;
        Self::require_assigned_driver(claims, &trip)?;

        self.settlement.complete(trip_id).await
    }

    /// Cancel a trip. Riders and drivers lose the right once the fare-paid
    /// movement begins; an admin may cancel any trip that is not yet
    /// terminal, in-progress included.
    pub async fn cancel_trip(
        &self,
        claims: &Claims,
        trip_id: Uuid,
        reason: &str,
    ) -> AppResult<Trip> {
        let trip = self.load(trip_id).await?;

        let (by, allowed, expected): (CancelledBy, &[TripStatus], &'static str) =
            if claims.is_admin() {
                (
                    CancelledBy::Admin,
                    &[
                        TripStatus::Pending,
                        TripStatus::Scheduled,
                        TripStatus::Accepted,
                        TripStatus::Arrived,
                        TripStatus::PickedUp,
                        TripStatus::Ongoing,
                        TripStatus::InTransit,
                    ],
                    "a non-terminal status",
                )
            } else if claims.id == trip.rider_id {
                (
                    CancelledBy::Rider,
                    TripAction::Cancel.allowed_from(trip.kind_enum()),
                    "a pre-movement status",
                )
            } else if trip.driver_id == Some(claims.id) {
                (
                    CancelledBy::Driver,
                    TripAction::Cancel.allowed_from(trip.kind_enum()),
                    "a pre-movement status",
                )
            } else {
                return Err(AppError::Unauthorized(
                    "Not a participant in this trip".to_string(),
                ));
            };

        let cancelled = self
            .trips
            .cancel_if(trip_id, allowed, by, reason)
            .await?
            .ok_or_else(|| AppError::InvalidStateTransition {
                action: "cancel",
                expected,
                actual: trip.status.clone(),
            })?;

        info!("Trip {} cancelled by {} ({})", trip_id, by.as_str(), reason);
        self.activity
            .trip_cancelled(trip_id, by.as_str(), reason)
            .await;

        // Free the driver if one was attached
        if let Some(driver_id) = cancelled.driver_id {
            if let Err(e) = self.drivers.set_busy(driver_id, false).await {
                warn!("Failed to release driver {} on cancel: {}", driver_id, e);
            }
            self.notifier
                .emit_to_driver(
                    driver_id,
                    WsMessage::TripCancelled {
                        trip_id: trip_id.to_string(),
                        by: by.as_str().to_string(),
                        reason: reason.to_string(),
                    },
                )
                .await;
        }
        self.notifier
            .emit_to_user(
                cancelled.rider_id,
                WsMessage::TripCancelled {
                    trip_id: trip_id.to_string(),
                    by: by.as_str().to_string(),
                    reason: reason.to_string(),
                },
            )
            .await;

        Ok(cancelled)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_trip(&self, trip_id: Uuid) -> AppResult<Trip> {
        self.load(trip_id).await
    }

    pub async fn rider_history(&self, rider_id: Uuid, limit: i64) -> AppResult<Vec<Trip>> {
        Ok(self.trips.find_by_rider(rider_id, limit).await?)
    }

    pub async fn driver_history(&self, driver_id: Uuid, limit: i64) -> AppResult<Vec<Trip>> {
        Ok(self.trips.find_by_driver(driver_id, limit).await?)
    }

    pub async fn open_trips(&self, vehicle_type: &str) -> AppResult<Vec<Trip>> {
        Ok(self.trips.find_open_for_vehicle(vehicle_type).await?)
    }
}
