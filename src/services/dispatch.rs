//! Trip request intake and driver matching.
//!
//! A new request is broadcast to every free driver on the vehicle channel,
//! then re-broadcast on a durable retry timer until someone accepts or the
//! attempt budget runs out, at which point the request expires. Pre-booked
//! trips additionally carry an activation job that fires at the scheduled
//! time. Both timers live in the scheduled_jobs table, so a restart never
//! strands a request.

use crate::auth::{Claims, Role};
use crate::config::DispatchConfig;
use crate::error::{AppError, AppResult};
use crate::models::{NewTrip, Trip, TripStatus};
use crate::notifier::{Notifier, WsMessage};
use crate::push::PushClient;
use crate::repositories::{DriverRepository, TripRepository, UserRepository};
use crate::services::activity::ActivityLog;
use crate::services::scheduler::JobScheduler;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const JOB_TRIP_RETRY: &str = "trip_request_retry";
pub const JOB_TRIP_ACTIVATE: &str = "trip_scheduled_activate";

#[derive(Debug, Deserialize)]
struct TripJobPayload {
    trip_id: Uuid,
}

pub struct DispatchService {
    trips: Arc<TripRepository>,
    drivers: Arc<DriverRepository>,
    users: Arc<UserRepository>,
    scheduler: Arc<JobScheduler>,
    notifier: Arc<Notifier>,
    push: Arc<PushClient>,
    activity: Arc<ActivityLog>,
    config: DispatchConfig,
    commission_bps: i64,
}

impl DispatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trips: Arc<TripRepository>,
        drivers: Arc<DriverRepository>,
        users: Arc<UserRepository>,
        scheduler: Arc<JobScheduler>,
        notifier: Arc<Notifier>,
        push: Arc<PushClient>,
        activity: Arc<ActivityLog>,
        config: DispatchConfig,
        commission_bps: i64,
    ) -> Self {
        Self {
            trips,
            drivers,
            users,
            scheduler,
            notifier,
            push,
            activity,
            config,
            commission_bps,
        }
    }

    /// Wire the durable job handlers into the scheduler. Call once at
    /// startup, before the scheduler's poll loop starts.
    pub async fn register(self: &Arc<Self>) {
        let service = Arc::clone(self);
        self.scheduler
            .define(JOB_TRIP_RETRY, move |payload| {
                let service = Arc::clone(&service);
                Box::pin(async move {
                    let payload: TripJobPayload = serde_json::from_value(payload)?;
                    service.run_retry(payload.trip_id).await?;
                    Ok(())
                })
            })
            .await;

        let service = Arc::clone(self);
        self.scheduler
            .define(JOB_TRIP_ACTIVATE, move |payload| {
                let service = Arc::clone(&service);
                Box::pin(async move {
                    let payload: TripJobPayload = serde_json::from_value(payload)?;
                    service.activate_scheduled(payload.trip_id).await?;
                    Ok(())
                })
            })
            .await;
    }

    /// Create a trip request and start matching.
    ///
    /// Immediate trips begin the broadcast/retry cycle right away. Pre-booked
    /// trips are broadcast so a driver can claim them early, and an
    /// activation job fires at the scheduled time to put them in motion.
    pub async fn request_trip(&self, claims: &Claims, new_trip: NewTrip) -> AppResult<Trip> {
        claims.require_role(Role::Rider)?;
        if !claims.is_admin() && claims.id != new_trip.rider_id {
            return Err(AppError::Unauthorized(
                "Cannot request a trip for another rider".to_string(),
            ));
        }

        new_trip.validate().map_err(AppError::Validation)?;

        let trip = self.trips.create(&new_trip, self.commission_bps).await?;
        info!(
            "Created {} trip {} for rider {} ({})",
            trip.kind, trip.id, trip.rider_id, trip.fare
        );
        self.activity
            .trip_created(trip.id, trip.rider_id, &trip.kind, trip.fare)
            .await;

        self.broadcast_request(&trip).await;

        if let Some(scheduled_time) = trip.scheduled_time {
            let delay = (scheduled_time - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.scheduler
                .schedule(delay, JOB_TRIP_ACTIVATE, json!({ "trip_id": trip.id }))
                .await
                .map_err(AppError::Sqlx)?;
        } else {
            self.schedule_retry(trip.id).await?;
        }

        Ok(trip)
    }

    async fn schedule_retry(&self, trip_id: Uuid) -> AppResult<()> {
        self.scheduler
            .schedule(
                self.config.retry_interval(),
                JOB_TRIP_RETRY,
                json!({ "trip_id": trip_id }),
            )
            .await
            .map_err(AppError::Sqlx)?;
        Ok(())
    }

    /// Fan the request out over the websocket channel and push to every
    /// free driver of the right vehicle class
    async fn broadcast_request(&self, trip: &Trip) {
        self.notifier
            .broadcast_trip_requested(WsMessage::TripRequested {
                trip_id: trip.id.to_string(),
                kind: trip.kind.clone(),
                vehicle_type: trip.vehicle_type.clone(),
                pickup_address: trip.pickup_address.clone(),
                destination_address: trip.destination_address.clone(),
                fare: trip.fare,
            })
            .await;

        let available = match self
            .drivers
            .find_available_by_vehicle(&trip.vehicle_type)
            .await
        {
            Ok(drivers) => drivers,
            Err(e) => {
                warn!("Failed to load available drivers: {}", e);
                return;
            }
        };

        for driver in available {
            let invalid = self
                .push
                .send(
                    &driver.device_tokens,
                    "New trip request",
                    &format!("{} to {}", trip.pickup_address, trip.destination_address),
                    json!({ "trip_id": trip.id }),
                )
                .await;
            for token in invalid {
                if let Err(e) = self.drivers.remove_device_token(driver.id, &token).await {
                    warn!("Failed to prune device token: {}", e);
                }
            }
        }
    }

    /// Retry timer body: re-broadcast an unmatched request, or expire it
    /// once the attempt budget is spent
    pub async fn run_retry(&self, trip_id: Uuid) -> AppResult<()> {
        let trip = match self.trips.find_by_id(trip_id).await? {
            Some(trip) => trip,
            None => return Ok(()),
        };

        // Accepted, cancelled, or otherwise in motion: the timer is done
        if trip.driver_id.is_some()
            || !matches!(trip.status_enum(), TripStatus::Pending | TripStatus::Scheduled)
        {
            return Ok(());
        }

        let attempts = self.trips.increment_dispatch_attempts(trip_id).await?;

        if attempts >= self.config.max_attempts {
            // The guard inside keeps a last-instant accept from being clobbered
            let Some(expired) = self.trips.expire_if_unmatched(trip_id).await? else {
                return Ok(());
            };

            info!("Trip {} expired after {} attempts", trip_id, attempts);
            self.activity.trip_expired(trip_id, attempts).await;

            self.notifier
                .emit_to_user(
                    expired.rider_id,
                    WsMessage::TripExpired {
                        trip_id: trip_id.to_string(),
                    },
                )
                .await;
            self.notifier
                .broadcast_trip_withdrawn(&expired.vehicle_type, trip_id)
                .await;

            if let Ok(Some(rider)) = self.users.find_by_id(expired.rider_id).await {
                self.push
                    .send(
                        &rider.device_tokens,
                        "No drivers found",
                        "Your trip request expired. Tap to try again.",
                        json!({ "trip_id": trip_id }),
                    )
                    .await;
            }
            return Ok(());
        }

        self.broadcast_request(&trip).await;
        self.schedule_retry(trip_id).await
    }

    /// Re-request an expired trip: a fresh request is created from the old
    /// one, and the expired record stays as history
    pub async fn retry_expired(&self, claims: &Claims, trip_id: Uuid) -> AppResult<Trip> {
        let old = self
            .trips
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Trip {} not found", trip_id)))?;

        if !claims.is_admin() && claims.id != old.rider_id {
            return Err(AppError::Unauthorized(
                "Trip belongs to another rider".to_string(),
            ));
        }
        if old.status_enum() != TripStatus::Expired {
            return Err(AppError::Validation(
                "Only expired trips can be retried".to_string(),
            ));
        }

        let new_trip = NewTrip {
            kind: old.kind_enum(),
            rider_id: old.rider_id,
            pickup: crate::models::GeoPoint {
                lat: old.pickup_lat,
                lng: old.pickup_lng,
                address: old.pickup_address.clone(),
            },
            destination: crate::models::GeoPoint {
                lat: old.destination_lat,
                lng: old.destination_lng,
                address: old.destination_address.clone(),
            },
            fare: old.fare,
            vehicle_type: crate::models::VehicleType::from_str(&old.vehicle_type)
                .map_err(AppError::Validation)?,
            package: old.package_info(),
            scheduled_time: None,
        };

        self.request_trip(claims, new_trip).await
    }

    /// Activation timer body for pre-booked trips.
    ///
    /// If the accepting driver is free they go busy and the trip proceeds
    /// as accepted. A busy driver forfeits the claim: the trip is released
    /// back to pending and re-broadcast. An unclaimed trip just starts the
    /// normal retry cycle.
    pub async fn activate_scheduled(&self, trip_id: Uuid) -> AppResult<()> {
        let trip = match self.trips.find_by_id(trip_id).await? {
            Some(trip) => trip,
            None => return Ok(()),
        };

        match trip.status_enum() {
            TripStatus::Scheduled | TripStatus::Accepted => {}
            // Cancelled before activation, or already moving
            _ => return Ok(()),
        }

        if let Some(driver_id) = trip.driver_id {
            let driver = self.drivers.find_by_id(driver_id).await?;
            let driver_is_free = driver.map(|d| !d.busy).unwrap_or(false);

            if driver_is_free {
                self.drivers.set_busy(driver_id, true).await?;
                self.notifier
                    .emit_to_driver(
                        driver_id,
                        WsMessage::TripAccepted {
                            trip_id: trip.id.to_string(),
                            driver_id: driver_id.to_string(),
                        },
                    )
                    .await;
                return Ok(());
            }

            warn!(
                "Driver {} busy at activation of trip {}, releasing",
                driver_id, trip_id
            );
            let Some(released) = self.trips.release_to_pending(trip_id).await? else {
                return Ok(());
            };
            self.broadcast_request(&released).await;
            return self.schedule_retry(trip_id).await;
        }

        self.broadcast_request(&trip).await;
        self.schedule_retry(trip_id).await
    }
}
