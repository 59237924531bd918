//! Repository for trip data access.
//!
//! Status changes go through conditional updates with the guard baked into
//! the query filter, so concurrent requests race safely at the database row
//! rather than in application memory.

use crate::error::RepositoryError;
use crate::models::{
    split_fare, CancelledBy, NewTrip, TimestampField, Trip, TripStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

const TRIP_COLUMNS: &str = "id, kind, rider_id, driver_id, \
    pickup_lat, pickup_lng, pickup_address, \
    destination_lat, destination_lng, destination_address, \
    status, fare, driver_earnings, commission, payment_status, \
    vehicle_type, package, scheduled, scheduled_time, \
    accepted_at, arrived_at, picked_up_at, started_at, in_transit_at, \
    completed_at, delivered_at, cancelled_at, cancelled_by, cancel_reason, \
    driver_paid, dispatch_attempts, created_at";

pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new trip. The fare split is computed here and never altered
    /// afterwards: driver_earnings + commission == fare.
    pub async fn create(
        &self,
        new_trip: &NewTrip,
        commission_bps: i64,
    ) -> Result<Trip, RepositoryError> {
        let (driver_earnings, commission) = split_fare(new_trip.fare, commission_bps);
        let package = new_trip
            .package
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| RepositoryError::InvalidInput(format!("Invalid package: {}", e)))?;

        let query = format!(
            r#"
            INSERT INTO trips (kind, rider_id,
                pickup_lat, pickup_lng, pickup_address,
                destination_lat, destination_lng, destination_address,
                status, fare, driver_earnings, commission,
                vehicle_type, package, scheduled, scheduled_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );

        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(new_trip.kind.as_str())
            .bind(new_trip.rider_id)
            .bind(new_trip.pickup.lat)
            .bind(new_trip.pickup.lng)
            .bind(&new_trip.pickup.address)
            .bind(new_trip.destination.lat)
            .bind(new_trip.destination.lng)
            .bind(&new_trip.destination.address)
            .bind(new_trip.initial_status().as_str())
            .bind(new_trip.fare)
            .bind(driver_earnings)
            .bind(commission)
            .bind(new_trip.vehicle_type.as_str())
            .bind(package)
            .bind(new_trip.scheduled_time.is_some())
            .bind(new_trip.scheduled_time)
            .fetch_one(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Find a trip by id
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Trip>, RepositoryError> {
        let query = format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS);
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Open (pending) requests for a vehicle class, oldest first
    pub async fn find_open_for_vehicle(
        &self,
        vehicle_type: &str,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let query = format!(
            "SELECT {} FROM trips WHERE status = 'pending' AND vehicle_type = $1 ORDER BY created_at ASC",
            TRIP_COLUMNS
        );
        let trips = sqlx::query_as::<_, Trip>(&query)
            .bind(vehicle_type)
            .fetch_all(&self.pool)
            .await?;

        Ok(trips)
    }

    /// Trip history for a rider, most recent first
    pub async fn find_by_rider(
        &self,
        rider_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let query = format!(
            "SELECT {} FROM trips WHERE rider_id = $1 ORDER BY created_at DESC LIMIT $2",
            TRIP_COLUMNS
        );
        let trips = sqlx::query_as::<_, Trip>(&query)
            .bind(rider_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(trips)
    }

    /// Trip history for a driver, most recent first
    pub async fn find_by_driver(
        &self,
        driver_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Trip>, RepositoryError> {
        let query = format!(
            "SELECT {} FROM trips WHERE driver_id = $1 ORDER BY created_at DESC LIMIT $2",
            TRIP_COLUMNS
        );
        let trips = sqlx::query_as::<_, Trip>(&query)
            .bind(driver_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(trips)
    }

    /// Conditional accept: assigns the driver only while the trip is still
    /// unassigned and pending/scheduled. Exactly one of two concurrent
    /// acceptance attempts can match the filter; the loser gets `None`.
    pub async fn try_accept(
        &self,
        trip_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<Trip>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE trips
            SET driver_id = $2, status = 'accepted', accepted_at = COALESCE(accepted_at, NOW())
            WHERE id = $1
              AND status IN ('pending', 'scheduled')
              AND driver_id IS NULL
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Move to `to` only if the current status is in `from`; `None` when the
    /// guard does not match
    pub async fn update_status_if(
        &self,
        trip_id: Uuid,
        from: &[TripStatus],
        to: TripStatus,
    ) -> Result<Option<Trip>, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            r#"
            UPDATE trips
            SET status = $2
            WHERE id = $1 AND status = ANY($3)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .bind(to.as_str())
            .bind(&from)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Append a lifecycle timestamp, write-once: an already-set field is
    /// left untouched
    pub async fn record_timestamp(
        &self,
        trip_id: Uuid,
        field: TimestampField,
    ) -> Result<(), RepositoryError> {
        // Column name comes from the enum, never from input
        let query = format!(
            "UPDATE trips SET {col} = COALESCE({col}, NOW()) WHERE id = $1",
            col = field.column()
        );
        sqlx::query(&query).bind(trip_id).execute(&self.pool).await?;

        Ok(())
    }

    /// Mark the fare paid, only if currently unpaid
    pub async fn mark_paid_if_unpaid(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<Trip>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE trips
            SET payment_status = 'paid'
            WHERE id = $1 AND payment_status = 'unpaid'
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Cancel the trip if its current status is in `allowed_from`, recording
    /// who cancelled and why
    pub async fn cancel_if(
        &self,
        trip_id: Uuid,
        allowed_from: &[TripStatus],
        by: CancelledBy,
        reason: &str,
    ) -> Result<Option<Trip>, RepositoryError> {
        let allowed: Vec<String> = allowed_from.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            r#"
            UPDATE trips
            SET status = 'cancelled',
                cancelled_by = $2,
                cancel_reason = $3,
                cancelled_at = COALESCE(cancelled_at, NOW())
            WHERE id = $1 AND status = ANY($4)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .bind(by.as_str())
            .bind(reason)
            .bind(&allowed)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Expire a request that nobody accepted. Matches only while the trip is
    /// still unassigned, so a concurrent accept always beats the timer.
    pub async fn expire_if_unmatched(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<Trip>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE trips
            SET status = 'expired'
            WHERE id = $1
              AND status IN ('pending', 'scheduled')
              AND driver_id IS NULL
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Release a scheduled trip whose driver turned out busy at activation:
    /// clear the assignment and put it back in the broadcast pool
    pub async fn release_to_pending(&self, trip_id: Uuid) -> Result<Option<Trip>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE trips
            SET driver_id = NULL, status = 'pending', dispatch_attempts = 0
            WHERE id = $1 AND status IN ('scheduled', 'accepted')
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Bump the broadcast attempt counter, returning the new count
    pub async fn increment_dispatch_attempts(
        &self,
        trip_id: Uuid,
    ) -> Result<i32, RepositoryError> {
        let (attempts,): (i32,) = sqlx::query_as(
            "UPDATE trips SET dispatch_attempts = dispatch_attempts + 1
             WHERE id = $1 RETURNING dispatch_attempts",
        )
        .bind(trip_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    /// Terminal settlement update: move to the terminal status and flag the
    /// driver as paid, only from the expected pre-completion status
    pub async fn settle_terminal_if(
        &self,
        trip_id: Uuid,
        from: TripStatus,
        to: TripStatus,
    ) -> Result<Option<Trip>, RepositoryError> {
        let query = format!(
            r#"
            UPDATE trips
            SET status = $2, driver_paid = TRUE
            WHERE id = $1 AND status = $3
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let trip = sqlx::query_as::<_, Trip>(&query)
            .bind(trip_id)
            .bind(to.as_str())
            .bind(from.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(trip)
    }

    /// Admin-only hard delete; normal flow only ever transitions to a
    /// terminal status
    pub async fn delete(&self, trip_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(trip_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
