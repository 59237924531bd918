//! RideLink Backend Service
//!
//! Main entry point for the RideLink marketplace backend.
//! This service provides:
//! - Trip lifecycle state machine for rides and deliveries
//! - Wallet ledger with atomic settlement on completion
//! - WebSocket server for real-time dispatch and trip updates
//! - Durable job scheduler for dispatch retries and pre-booked trips

use ridelink_backend::config::AppConfig;
use ridelink_backend::database::{create_pool, run_migrations};
use ridelink_backend::error::{AppError, AppResult};
use ridelink_backend::gateway::PaymentGateway;
use ridelink_backend::notifier::Notifier;
use ridelink_backend::push::PushClient;
use ridelink_backend::services::{
    ActivityLog, DispatchService, JobScheduler, RewardService, SettlementService, TripService,
    WalletService,
};
use ridelink_backend::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ridelink_backend={},sqlx=warn", config.log_level).into()
            }),
        )
        .init();

    info!("RideLink backend service starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Commission: {} bps", config.commission_bps);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let app_state = Arc::new(AppState::new(pool.clone()));
    info!("✓ Application state initialized with repositories");

    let notifier = Arc::new(Notifier::new());
    info!("✓ Realtime notifier initialized");

    let push = Arc::new(PushClient::from_env());
    info!("✓ Push client initialized");

    let gateway = Arc::new(PaymentGateway::from_env());
    if gateway.is_simulated() {
        warn!("GATEWAY_SECRET_KEY not configured - payment gateway in simulation mode");
    }
    info!("✓ Payment gateway initialized");

    let activity = Arc::new(ActivityLog::from_env());
    info!("✓ Activity log initialized");

    let scheduler = Arc::new(JobScheduler::new(pool.clone(), config.scheduler_poll_secs));
    info!("✓ Job scheduler initialized");

    let settlement = Arc::new(SettlementService::new(
        app_state.trip_repo.clone(),
        app_state.wallet_repo.clone(),
        app_state.driver_repo.clone(),
        app_state.task_repo.clone(),
        notifier.clone(),
        push.clone(),
        activity.clone(),
    ));
    info!("✓ Settlement service initialized");

    let _trip_service = Arc::new(TripService::new(
        app_state.trip_repo.clone(),
        app_state.driver_repo.clone(),
        app_state.wallet_repo.clone(),
        settlement.clone(),
        notifier.clone(),
        activity.clone(),
    ));
    info!("✓ Trip service initialized");

    let dispatch = Arc::new(DispatchService::new(
        app_state.trip_repo.clone(),
        app_state.driver_repo.clone(),
        app_state.user_repo.clone(),
        scheduler.clone(),
        notifier.clone(),
        push.clone(),
        activity.clone(),
        config.dispatch.clone(),
        config.commission_bps,
    ));
    dispatch.register().await;
    info!("✓ Dispatch service initialized");

    let _wallet_service = Arc::new(WalletService::new(
        app_state.wallet_repo.clone(),
        app_state.user_repo.clone(),
        app_state.driver_repo.clone(),
        gateway.clone(),
        notifier.clone(),
        activity.clone(),
    ));
    info!("✓ Wallet service initialized");

    let _reward_service = Arc::new(RewardService::new(
        app_state.task_repo.clone(),
        app_state.wallet_repo.clone(),
        notifier.clone(),
        activity.clone(),
    ));
    info!("✓ Reward service initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let scheduler_handle = tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            scheduler.start().await;
        }
    });
    info!(
        "✓ Job scheduler poll loop started ({}s interval)",
        config.scheduler_poll_secs
    );

    // =========================================================================
    // START SERVERS
    // =========================================================================

    let ws_handle = if let Some(ws_port) = config.ws_port {
        let ws_addr: SocketAddr = format!("0.0.0.0:{}", ws_port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid WebSocket address: {}", e)))?;

        info!("Starting WebSocket server on {}...", ws_addr);

        let notifier_clone = notifier.clone();
        let listener = TcpListener::bind(ws_addr)
            .await
            .map_err(|e| AppError::Message(format!("Failed to bind WebSocket server: {}", e)))?;

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from {}", addr);
                        let notifier = notifier_clone.clone();
                        tokio::spawn(async move {
                            if let Err(e) = notifier.handle_connection(stream).await {
                                error!("WebSocket connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("WebSocket accept error: {}", e);
                    }
                }
            }
        });

        info!("✓ WebSocket server started on {}", ws_addr);
        Some(handle)
    } else {
        warn!("WS_PORT not configured - WebSocket server not started");
        None
    };

    info!("RideLink backend service ready");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = scheduler_handle => {
            error!("Job scheduler exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = ws_handle {
                handle.await.ok();
            } else {
                // Never completes if WebSocket is not running
                futures::future::pending::<()>().await;
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    info!("RideLink backend service shutdown complete");
    Ok(())
}
