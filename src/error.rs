use crate::database::DatabaseError;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unauthorized access errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A lifecycle guard was violated: the trip is not in the status the
    /// requested action requires
    #[error("Invalid state transition: {action} requires status {expected}, trip is {actual}")]
    InvalidStateTransition {
        action: &'static str,
        expected: &'static str,
        actual: String,
    },

    /// Wallet balance is too low to cover the requested amount
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },

    /// Another request won a conditional update race (e.g. a concurrent accept)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Idempotency short-circuit: the operation already ran to completion.
    /// Callers treat this as an informational success, not a failure.
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    /// Payment gateway or notification channel failure
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Errors the client should treat as a success response
    /// ("already paid", "already completed", "already claimed")
    pub fn is_informational(&self) -> bool {
        matches!(self, AppError::AlreadyProcessed(_))
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 403,
            AppError::Validation(_) => 400,
            AppError::InvalidStateTransition { .. } => 400,
            AppError::InsufficientFunds { .. } => 400,
            AppError::Conflict(_) => 409,
            AppError::AlreadyProcessed(_) => 200,
            AppError::UpstreamFailure(_) => 502,
            AppError::Config(_) => 500,
            AppError::Database(_) | AppError::Sqlx(_) => 500,
            _ => 500,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Wallet balance too low for the requested debit
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: i64, required: i64 },
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::Conflict(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
            RepositoryError::InsufficientFunds {
                available,
                required,
            } => AppError::InsufficientFunds {
                available,
                required,
            },
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if code.as_deref() == Some("23503") {
                    // Foreign key violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else if code.as_deref() == Some("23514") {
                    // Check constraint violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = AppError::NotFound("trip".into());
        assert_eq!(err.status_code(), 404);

        let err = AppError::InsufficientFunds {
            available: 500,
            required: 1000,
        };
        assert_eq!(err.status_code(), 400);

        let err = AppError::Conflict("ride no longer available".into());
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_already_processed_is_informational() {
        let err = AppError::AlreadyProcessed("trip already paid".into());
        assert!(err.is_informational());
        assert_eq!(err.status_code(), 200);
    }

    #[test]
    fn test_repository_error_conversion() {
        let err: AppError = RepositoryError::InsufficientFunds {
            available: 100,
            required: 250,
        }
        .into();
        assert!(matches!(err, AppError::InsufficientFunds { .. }));

        let err: AppError = RepositoryError::NotFound("wallet".into()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = AppError::InvalidStateTransition {
            action: "start",
            expected: "arrived",
            actual: "accepted".into(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("start"));
        assert!(msg.contains("arrived"));
    }
}
