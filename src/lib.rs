//! RideLink Backend Library
//!
//! This module exposes the backend components for use by tests and other consumers.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notifier;
pub mod push;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repositories::*;
use std::sync::Arc;

/// Application state containing all repositories
pub struct AppState {
    pub user_repo: Arc<UserRepository>,
    pub driver_repo: Arc<DriverRepository>,
    pub trip_repo: Arc<TripRepository>,
    pub wallet_repo: Arc<WalletRepository>,
    pub task_repo: Arc<TaskRepository>,
}

impl AppState {
    /// Create a new AppState with initialized repositories
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            user_repo: Arc::new(UserRepository::new(pool.clone())),
            driver_repo: Arc::new(DriverRepository::new(pool.clone())),
            trip_repo: Arc::new(TripRepository::new(pool.clone())),
            wallet_repo: Arc::new(WalletRepository::new(pool.clone())),
            task_repo: Arc::new(TaskRepository::new(pool)),
        }
    }
}
