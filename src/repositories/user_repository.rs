use crate::error::RepositoryError;
use crate::models::User;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, phone, email, device_tokens, created_at";

/// Repository for rider/sender data access
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new user
    pub async fn create(
        &self,
        name: &str,
        phone: &str,
        email: &str,
    ) -> Result<User, RepositoryError> {
        let query = format!(
            "INSERT INTO users (name, phone, email) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(name)
            .bind(phone)
            .bind(email)
            .fetch_one(&self.pool)
            .await?;

        Ok(user)
    }

    /// Find a user by id
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Register a push token for the user's device
    pub async fn add_device_token(&self, id: Uuid, token: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users
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
        sqlx::query("UPDATE users SET device_tokens = array_remove(device_tokens, $2) WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
