use crate::error::RepositoryError;
use crate::models::Driver;
use sqlx::PgPool;
use uuid::Uuid;

const DRIVER_COLUMNS: &str =
    "id, name, phone, email, vehicle_type, busy, completed_trips, device_tokens, created_at";

/// Repository for driver data access
pub struct DriverRepository {
    pool: PgPool,
}

impl DriverRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new driver
    pub async fn create(
        &self,
        name: &str,
        phone: &str,
        email: &str,
        vehicle_type: &str,
    ) -> Result<Driver, RepositoryError> {
        let query = format!(
            "INSERT INTO drivers (name, phone, email, vehicle_type)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            DRIVER_COLUMNS
        );
        let driver = sqlx::query_as::<_, Driver>(&query)
            .bind(name)
            .bind(phone)
            .bind(email)
            .bind(vehicle_type)
            .fetch_one(&self.pool)
            .await?;

        Ok(driver)
    }

    /// Find a driver by id
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Driver>, RepositoryError> {
        let query = format!("SELECT {} FROM drivers WHERE id = $1", DRIVER_COLUMNS);
        let driver = sqlx::query_as::<_, Driver>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(driver)
    }

    /// Drivers currently free to take a request for a vehicle class
    pub async fn find_available_by_vehicle(
        &self,
        vehicle_type: &str,
    ) -> Result<Vec<Driver>, RepositoryError> {
        let query = format!(
            "SELECT {} FROM drivers WHERE vehicle_type = $1 AND busy = FALSE",
            DRIVER_COLUMNS
        );
        let drivers = sqlx::query_as::<_, Driver>(&query)
            .bind(vehicle_type)
            .fetch_all(&self.pool)
            .await?;

        Ok(drivers)
    }

    /// Set or clear the busy flag
    pub async fn set_busy(&self, id: Uuid, busy: bool) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE drivers SET busy = $2 WHERE id = $1")
            .bind(id)
            .bind(busy)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Bump the completed-trip counter
    pub async fn increment_completed_trips(&self, id: Uuid) -> Result<i64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "UPDATE drivers SET completed_trips = completed_trips + 1
             WHERE id = $1 RETURNING completed_trips",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Register a push token for the driver's device
    pub async fn add_device_token(&self, id: Uuid, token: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE drivers
             SET device_tokens = array_append(array_remove(device_tokens, $2), $2)
             WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Prune a stale push token after a delivery failure
    pub async fn remove_device_token(&self, id: Uuid, token: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE drivers SET device_tokens = array_remove(device_tokens, $2) WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
