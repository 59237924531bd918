pub mod activity;
pub mod dispatch;
pub mod rewards;
pub mod scheduler;
pub mod settlement;
pub mod trip_service;
pub mod wallet_service;

pub use activity::ActivityLog;
pub use dispatch::DispatchService;
pub use rewards::RewardService;
pub use scheduler::{JobHandler, JobScheduler};
pub use settlement::SettlementService;
pub use trip_service::TripService;
pub use wallet_service::WalletService;
