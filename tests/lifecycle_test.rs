//! Integration tests for the trip lifecycle and settlement.
//!
//! These run against a real Postgres instance (TEST_DATABASE_URL) and are
//! ignored by default; run them with `cargo test -- --ignored`.

mod helpers;

use helpers::*;
use ridelink_backend::auth::{Claims, Role};
use ridelink_backend::error::AppError;
use ridelink_backend::models::*;
use ridelink_backend::notifier::Notifier;
use ridelink_backend::push::PushClient;
use ridelink_backend::repositories::DebitParams;
use ridelink_backend::services::{ActivityLog, SettlementService, TripService};
use std::sync::Arc;
use uuid::Uuid;

const COMMISSION_BPS: i64 = 1500;

fn build_services(db: &TestDatabase) -> (Arc<TripService>, Arc<SettlementService>) {
    let notifier = Arc::new(Notifier::new());
    let push = Arc::new(PushClient::from_env());
    let activity = Arc::new(ActivityLog::new(
        std::env::temp_dir().join(format!("ridelink-test-{}", Uuid::new_v4())),
    ));

    let settlement = Arc::new(SettlementService::new(
        db.trip_repo.clone(),
        db.wallet_repo.clone(),
        db.driver_repo.clone(),
        db.task_repo.clone(),
        notifier.clone(),
        push,
        activity.clone(),
    ));
    let trips = Arc::new(TripService::new(
        db.trip_repo.clone(),
        db.driver_repo.clone(),
        db.wallet_repo.clone(),
        settlement.clone(),
        notifier,
        activity,
    ));
    (trips, settlement)
}

/// Run a ride up to the point where completion is legal
async fn drive_to_ongoing(
    db: &TestDatabase,
    trips: &TripService,
    fixtures: &TestFixtures,
    fare: i64,
) -> Trip {
    let rider = Claims::new(fixtures.rider.id, Role::Rider);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, fare), COMMISSION_BPS)
        .await
        .expect("create trip");

    trips.accept_trip(&driver, trip.id).await.expect("accept");
    trips.mark_arrived(&driver, trip.id).await.expect("arrive");
    trips.pay_trip(&rider, trip.id).await.expect("pay");
    trips.start_trip(&driver, trip.id).await.expect("start")
}

// ============================================================================
// Fare split and creation
// ============================================================================

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_trip_creation_stores_fare_split() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();

    assert_eq!(trip.fare, 1000);
    assert_eq!(trip.driver_earnings, 850);
    assert_eq!(trip.commission, 150);
    assert_eq!(trip.status, "pending");
    assert_eq!(trip.payment_status, "unpaid");
    assert!(trip.driver_id.is_none());
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_ride_happy_path_settles_money() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let app_before = db.wallet_repo.app_wallet().await.unwrap().balance;

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;
    assert_eq!(trip.status, "ongoing");
    assert!(trip.started_at.is_some());

    let settled = trips.complete_trip(&driver, trip.id).await.unwrap();
    assert_eq!(settled.status, "completed");
    assert!(settled.driver_paid);

    // Rider paid the fare, driver got earnings, platform got commission
    let rider_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.rider.id, OwnerType::Rider)
        .await
        .unwrap()
        .unwrap();
    let driver_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.driver.id, OwnerType::Driver)
        .await
        .unwrap()
        .unwrap();
    let app_after = db.wallet_repo.app_wallet().await.unwrap().balance;

    assert_eq!(rider_wallet.balance, 9000);
    assert_eq!(driver_wallet.balance, 850);
    assert_eq!(app_after - app_before, 150);

    // Driver is free again with one more completed trip
    let driver_row = db
        .driver_repo
        .find_by_id(fixtures.driver.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!driver_row.busy);
    assert_eq!(driver_row.completed_trips, 1);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_delivery_happy_path() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);

    let courier = db
        .driver_repo
        .create("Courier", "+1777000001", "courier@example.com", "bike")
        .await
        .unwrap();
    db.wallet_repo
        .get_or_create_wallet(courier.id, OwnerType::Driver)
        .await
        .unwrap();
    let driver = Claims::new(courier.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_delivery(fixtures.rider.id, 800), COMMISSION_BPS)
        .await
        .unwrap();

    trips.accept_trip(&driver, trip.id).await.unwrap();
    trips.mark_arrived(&driver, trip.id).await.unwrap();
    let picked = trips.pick_up(&driver, trip.id).await.unwrap();
    assert_eq!(picked.status, "picked_up");

    // Transit cannot begin before payment
    let blocked = trips.start_transit(&driver, trip.id).await;
    assert!(matches!(blocked, Err(AppError::Validation(_))));

    trips.pay_trip(&rider, trip.id).await.unwrap();
    let moving = trips.start_transit(&driver, trip.id).await.unwrap();
    assert_eq!(moving.status, "in_transit");

    let settled = trips.complete_trip(&driver, trip.id).await.unwrap();
    assert_eq!(settled.status, "delivered");
    assert!(settled.delivered_at.is_some());

    let courier_wallet = db
        .wallet_repo
        .find_by_owner(courier.id, OwnerType::Driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(courier_wallet.balance, 680); // 800 - 15%
}

// ============================================================================
// Guards and ordering
// ============================================================================

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_ride_cannot_start_unpaid() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();
    trips.mark_arrived(&driver, trip.id).await.unwrap();

    let result = trips.start_trip(&driver, trip.id).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_out_of_order_transition_rejected() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();

    // Arrive was skipped
    let result = trips.start_trip(&driver, trip.id).await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStateTransition { .. }) | Err(AppError::Validation(_))
    ));
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_cancel_locked_once_moving() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;

    let result = trips.cancel_trip(&rider, trip.id, "changed my mind").await;
    assert!(matches!(
        result,
        Err(AppError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_admin_cancel_allowed_while_moving() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let admin = Claims::new(Uuid::new_v4(), Role::Admin);

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;

    let cancelled = trips
        .cancel_trip(&admin, trip.id, "fraud report")
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("admin"));

    let driver_row = db
        .driver_repo
        .find_by_id(fixtures.driver.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!driver_row.busy);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_rider_cancel_allowed_after_pickup() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);

    let suffix = Uuid::new_v4().simple().to_string();
    let courier = db
        .driver_repo
        .create(
            "Courier",
            &format!("+1777{}", &suffix[..7]),
            &format!("courier_{}@example.com", &suffix[..8]),
            "bike",
        )
        .await
        .unwrap();
    let driver = Claims::new(courier.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_delivery(fixtures.rider.id, 800), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();
    trips.mark_arrived(&driver, trip.id).await.unwrap();
    trips.pick_up(&driver, trip.id).await.unwrap();

    // Transit has not begun; the package is still at the door
    let cancelled = trips
        .cancel_trip(&rider, trip.id, "wrong address")
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("rider"));
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_rider_cancel_before_movement_frees_driver() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();

    let cancelled = trips
        .cancel_trip(&rider, trip.id, "no longer needed")
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("rider"));

    let driver_row = db
        .driver_repo
        .find_by_id(fixtures.driver.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!driver_row.busy);
}

// ============================================================================
// Concurrency and idempotency
// ============================================================================

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_concurrent_accept_single_winner() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;

    let driver2 = db
        .driver_repo
        .create("Second Driver", "+1777000002", "driver2@example.com", "car")
        .await
        .unwrap();

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        db.trip_repo.try_accept(trip.id, fixtures.driver.id),
        db.trip_repo.try_accept(trip.id, driver2.id),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a.is_some() != b.is_some(), "exactly one accept must win");

    let winner = a.or(b).unwrap();
    let reloaded = db.trip_repo.find_by_id(trip.id).await.unwrap().unwrap();
    assert_eq!(reloaded.driver_id, winner.driver_id);
    assert_eq!(reloaded.status, "accepted");
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_double_completion_pays_once() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, settlement) = build_services(&db);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;

    trips.complete_trip(&driver, trip.id).await.unwrap();
    // Direct second settlement attempt, as a retried job would issue
    let again = settlement.complete(trip.id).await.unwrap();
    assert_eq!(again.status, "completed");

    let driver_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.driver.id, OwnerType::Driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver_wallet.balance, 850);

    let commission = db
        .wallet_repo
        .find_commission_by_trip(trip.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commission.amount, 150);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_double_payment_debits_once() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();

    trips.pay_trip(&rider, trip.id).await.unwrap();
    trips.pay_trip(&rider, trip.id).await.unwrap();

    let rider_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.rider.id, OwnerType::Rider)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rider_wallet.balance, 9000);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_concurrent_completion_counts_trip_once() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, settlement) = build_services(&db);

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;

    let (first, second) = tokio::join!(settlement.complete(trip.id), settlement.complete(trip.id));
    assert!(first.is_ok());
    assert!(second.is_ok());

    let driver_row = db
        .driver_repo
        .find_by_id(fixtures.driver.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver_row.completed_trips, 1);

    let driver_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.driver.id, OwnerType::Driver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(driver_wallet.balance, 850);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_payment_retry_heals_unpaid_flag() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();

    // The debit landed but the process died before the paid flag was set
    let params = DebitParams {
        owner_id: fixtures.rider.id,
        owner_type: OwnerType::Rider,
        amount: trip.fare,
        tx_type: TransactionType::Payment,
        channel: "wallet".to_string(),
        trip_id: Some(trip.id),
        reference: trip.fare_reference(),
        metadata: serde_json::json!({}),
    };
    db.wallet_repo.debit_wallet(params).await.unwrap();

    // The client retry converges: paid flag set, no second debit
    let paid = trips.pay_trip(&rider, trip.id).await.unwrap();
    assert_eq!(paid.payment_status, "paid");

    let rider_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.rider.id, OwnerType::Rider)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rider_wallet.balance, 9000);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_insufficient_funds_rejected() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create_with_balance(&db, 100).await;
    let (trips, _) = build_services(&db);
    let rider = Claims::new(fixtures.rider.id, Role::Rider);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();
    trips.accept_trip(&driver, trip.id).await.unwrap();

    let result = trips.pay_trip(&rider, trip.id).await;
    match result {
        Err(AppError::InsufficientFunds {
            available,
            required,
        }) => {
            assert_eq!(available, 100);
            assert_eq!(required, 1000);
        }
        other => panic!("expected insufficient funds, got {:?}", other.map(|t| t.id)),
    }

    // Balance untouched, trip still unpaid
    let rider_wallet = db
        .wallet_repo
        .find_by_owner(fixtures.rider.id, OwnerType::Rider)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rider_wallet.balance, 100);
    let reloaded = db.trip_repo.find_by_id(trip.id).await.unwrap().unwrap();
    assert_eq!(reloaded.payment_status, "unpaid");
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_expiry_loses_to_accept() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;

    let trip = db
        .trip_repo
        .create(&sample_ride(fixtures.rider.id, 1000), COMMISSION_BPS)
        .await
        .unwrap();

    db.trip_repo
        .try_accept(trip.id, fixtures.driver.id)
        .await
        .unwrap()
        .expect("accept should win");

    // Expiry after a successful accept must be a no-op
    let expired = db.trip_repo.expire_if_unmatched(trip.id).await.unwrap();
    assert!(expired.is_none());
    let reloaded = db.trip_repo.find_by_id(trip.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, "accepted");
}

// ============================================================================
// Ledger conservation
// ============================================================================

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_wallet_balance_matches_ledger() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;
    let (trips, _) = build_services(&db);
    let driver = Claims::new(fixtures.driver.id, Role::Driver);

    let trip = drive_to_ongoing(&db, &trips, &fixtures, 1000).await;
    trips.complete_trip(&driver, trip.id).await.unwrap();

    for wallet in [&fixtures.rider_wallet, &fixtures.driver_wallet] {
        let transactions = db
            .wallet_repo
            .get_wallet_transactions(wallet.id, 100)
            .await
            .unwrap();
        let ledger_sum: i64 = transactions
            .iter()
            .filter(|t| t.is_success())
            .map(|t| t.signed_amount())
            .sum();
        let current = db
            .wallet_repo
            .find_by_id(wallet.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.balance, ledger_sum, "wallet {}", wallet.id);
    }
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_credit_same_reference_once() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create_with_balance(&db, 0).await;

    let reference = format!("test_credit_{}", Uuid::new_v4());
    db.wallet_repo
        .create_pending_transaction(
            fixtures.driver_wallet.id,
            TransactionType::Funding,
            500,
            "test",
            None,
            &reference,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let (first, _) = db.wallet_repo.credit_wallet(&reference).await.unwrap();
    let (second, _) = db.wallet_repo.credit_wallet(&reference).await.unwrap();

    assert_eq!(first.balance, 500);
    assert_eq!(second.balance, 500);
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn test_debit_same_reference_once() {
    let db = TestDatabase::new().await;
    let fixtures = TestFixtures::create(&db).await;

    let params = DebitParams {
        owner_id: fixtures.rider.id,
        owner_type: OwnerType::Rider,
        amount: 400,
        tx_type: TransactionType::Payment,
        channel: "test".to_string(),
        trip_id: None,
        reference: format!("test_debit_{}", Uuid::new_v4()),
        metadata: serde_json::json!({}),
    };

    let (first, _) = db.wallet_repo.debit_wallet(params.clone()).await.unwrap();
    let (second, _) = db.wallet_repo.debit_wallet(params).await.unwrap();

    assert_eq!(first.balance, 9600);
    assert_eq!(second.balance, 9600);
}
