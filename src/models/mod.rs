//! Domain models for the RideLink backend.
//!
//! This module contains all database-backed models representing
//! the core entities of the ride-hailing and delivery marketplace.

pub mod commission;
pub mod driver;
pub mod job;
pub mod task;
pub mod transaction;
pub mod trip;
pub mod user;
pub mod wallet;

// Re-export all models for convenient access
pub use commission::Commission;
pub use driver::Driver;
pub use job::{JobStatus, ScheduledJob};
pub use task::{RewardTask, TaskProgress};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use trip::{
    split_fare, CancelledBy, GeoPoint, NewTrip, PackageInfo, PaymentStatus, TimestampField, Trip,
    TripAction, TripKind, TripStatus, VehicleType,
};
pub use user::User;
pub use wallet::{AppWallet, OwnerType, Wallet};
