pub mod driver_repository;
pub mod task_repository;
pub mod trip_repository;
pub mod user_repository;
pub mod wallet_repository;

// Re-export all repositories for convenient access
pub use driver_repository::DriverRepository;
pub use task_repository::TaskRepository;
pub use trip_repository::TripRepository;
pub use user_repository::UserRepository;
pub use wallet_repository::{DebitParams, WalletRepository};
