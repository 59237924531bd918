mod helpers;

use helpers::*;
use ridelink_backend::auth::{Claims, Role};
use ridelink_backend::models::*;
use uuid::Uuid;

// ============================================================================
// Fare split
// ============================================================================

#[test]
fn test_fare_split_conservation() {
    // earnings + commission must equal the fare for any fare and rate
    for fare in [1, 7, 100, 999, 1000, 123_456_789] {
        for bps in [0, 1, 1500, 2500, 9999, 10_000] {
            let (earnings, commission) = split_fare(fare, bps);
            assert_eq!(earnings + commission, fare, "fare={} bps={}", fare, bps);
            assert!(commission >= 0);
            assert!(earnings >= 0);
        }
    }
}

#[test]
fn test_fare_split_default_rate() {
    let (earnings, commission) = split_fare(1000, 1500);
    assert_eq!(earnings, 850);
    assert_eq!(commission, 150);
}

#[test]
fn test_fare_split_rounding_favors_driver() {
    // 15% of 999 is 149.85; truncation books 149 to the platform
    let (earnings, commission) = split_fare(999, 1500);
    assert_eq!(commission, 149);
    assert_eq!(earnings, 850);
}

// ============================================================================
// Lifecycle guard table
// ============================================================================

#[test]
fn test_ride_path_guards() {
    let kind = TripKind::Ride;
    assert_eq!(
        TripAction::Accept.allowed_from(kind),
        &[TripStatus::Pending, TripStatus::Scheduled]
    );
    assert_eq!(TripAction::Arrive.allowed_from(kind), &[TripStatus::Accepted]);
    assert_eq!(TripAction::Start.allowed_from(kind), &[TripStatus::Arrived]);
    assert_eq!(TripAction::Complete.allowed_from(kind), &[TripStatus::Ongoing]);

    // Delivery-only actions do not apply to rides
    assert!(TripAction::PickUp.allowed_from(kind).is_empty());
    assert!(TripAction::StartTransit.allowed_from(kind).is_empty());
}

#[test]
fn test_delivery_path_guards() {
    let kind = TripKind::Delivery;
    assert_eq!(TripAction::PickUp.allowed_from(kind), &[TripStatus::Arrived]);
    assert_eq!(
        TripAction::StartTransit.allowed_from(kind),
        &[TripStatus::PickedUp]
    );
    assert_eq!(
        TripAction::Complete.allowed_from(kind),
        &[TripStatus::InTransit]
    );

    // Ride-only action does not apply to deliveries
    assert!(TripAction::Start.allowed_from(kind).is_empty());
}

#[test]
fn test_payment_gates_movement() {
    assert!(TripAction::Start.requires_payment(TripKind::Ride));
    assert!(TripAction::StartTransit.requires_payment(TripKind::Delivery));
    assert!(!TripAction::Arrive.requires_payment(TripKind::Ride));
    assert!(!TripAction::PickUp.requires_payment(TripKind::Delivery));
}

#[test]
fn test_terminal_statuses_by_kind() {
    assert_eq!(TripKind::Ride.terminal_status(), TripStatus::Completed);
    assert_eq!(TripKind::Delivery.terminal_status(), TripStatus::Delivered);
    assert_eq!(TripKind::Ride.pre_completion_status(), TripStatus::Ongoing);
    assert_eq!(
        TripKind::Delivery.pre_completion_status(),
        TripStatus::InTransit
    );
}

#[test]
fn test_cancel_locked_once_moving() {
    assert!(!TripStatus::Pending.is_cancel_locked());
    assert!(!TripStatus::Accepted.is_cancel_locked());
    assert!(!TripStatus::Arrived.is_cancel_locked());
    assert!(TripStatus::Ongoing.is_cancel_locked());
    assert!(TripStatus::InTransit.is_cancel_locked());
    assert!(TripStatus::Completed.is_cancel_locked());
    assert!(TripStatus::Cancelled.is_cancel_locked());
}

// ============================================================================
// Request validation
// ============================================================================

#[test]
fn test_delivery_requires_package() {
    let rider = Uuid::new_v4();
    let mut request = sample_delivery(rider, 1000);
    request.package = None;
    assert!(request.validate().is_err());
}

#[test]
fn test_ride_rejects_package() {
    let rider = Uuid::new_v4();
    let mut request = sample_ride(rider, 1000);
    request.package = Some(PackageInfo::Document);
    assert!(request.validate().is_err());
}

#[test]
fn test_parcel_weight_bounds() {
    assert!(PackageInfo::Parcel { weight_kg: 2.5 }.validate().is_ok());
    assert!(PackageInfo::Parcel { weight_kg: 0.0 }.validate().is_err());
    assert!(PackageInfo::Parcel { weight_kg: 250.0 }.validate().is_err());
}

#[test]
fn test_fare_must_be_positive() {
    let rider = Uuid::new_v4();
    assert!(sample_ride(rider, 0).validate().is_err());
    assert!(sample_ride(rider, -100).validate().is_err());
    assert!(sample_ride(rider, 1).validate().is_ok());
}

#[test]
fn test_scheduled_time_must_be_future() {
    let rider = Uuid::new_v4();
    let mut request = sample_ride(rider, 1000);
    request.scheduled_time = Some(chrono::Utc::now() - chrono::Duration::minutes(5));
    assert!(request.validate().is_err());

    request.scheduled_time = Some(chrono::Utc::now() + chrono::Duration::hours(2));
    assert!(request.validate().is_ok());
    assert_eq!(request.initial_status(), TripStatus::Scheduled);
}

// ============================================================================
// Auth
// ============================================================================

#[test]
fn test_admin_satisfies_any_role() {
    let admin = Claims::new(Uuid::new_v4(), Role::Admin);
    assert!(admin.require_role(Role::Rider).is_ok());
    assert!(admin.require_role(Role::Driver).is_ok());
    assert!(admin.require_admin().is_ok());
}

#[test]
fn test_rider_cannot_act_as_driver() {
    let rider = Claims::new(Uuid::new_v4(), Role::Rider);
    assert!(rider.require_role(Role::Rider).is_ok());
    assert!(rider.require_role(Role::Driver).is_err());
    assert!(rider.require_admin().is_err());
}

// ============================================================================
// Ledger
// ============================================================================

#[test]
fn test_signed_amounts() {
    let tx = |tx_type: &str, amount: i64| Transaction {
        id: Uuid::new_v4(),
        wallet_id: Uuid::new_v4(),
        tx_type: tx_type.to_string(),
        amount,
        status: "success".to_string(),
        channel: "test".to_string(),
        trip_id: None,
        reference: Uuid::new_v4().to_string(),
        metadata: serde_json::json!({}),
        created_at: chrono::Utc::now(),
    };

    assert_eq!(tx("funding", 500).signed_amount(), 500);
    assert_eq!(tx("driver_payment", 850).signed_amount(), 850);
    assert_eq!(tx("reward", 200).signed_amount(), 200);
    assert_eq!(tx("payment", 1000).signed_amount(), -1000);
    assert_eq!(tx("payout", 300).signed_amount(), -300);
}
