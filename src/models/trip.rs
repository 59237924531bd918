use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Trip kind: a passenger ride or a package delivery. Structurally the same
/// lifecycle, with different mid-trip statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripKind {
    Ride,
    Delivery,
}

impl TripKind {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "ride" => Ok(TripKind::Ride),
            "delivery" => Ok(TripKind::Delivery),
            _ => Err(format!("Invalid trip kind: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripKind::Ride => "ride",
            TripKind::Delivery => "delivery",
        }
    }

    /// Terminal success status for this kind
    pub fn terminal_status(&self) -> TripStatus {
        match self {
            TripKind::Ride => TripStatus::Completed,
            TripKind::Delivery => TripStatus::Delivered,
        }
    }

    /// Status a trip of this kind must be in before completion
    pub fn pre_completion_status(&self) -> TripStatus {
        match self {
            TripKind::Ride => TripStatus::Ongoing,
            TripKind::Delivery => TripStatus::InTransit,
        }
    }
}

/// Trip lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Scheduled,
    Accepted,
    Arrived,
    Ongoing,
    PickedUp,
    InTransit,
    Completed,
    Delivered,
    Cancelled,
    Expired,
    Failed,
}

impl TripStatus {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TripStatus::Pending),
            "scheduled" => Ok(TripStatus::Scheduled),
            "accepted" => Ok(TripStatus::Accepted),
            "arrived" => Ok(TripStatus::Arrived),
            "ongoing" => Ok(TripStatus::Ongoing),
            "picked_up" => Ok(TripStatus::PickedUp),
            "in_transit" => Ok(TripStatus::InTransit),
            "completed" => Ok(TripStatus::Completed),
            "delivered" => Ok(TripStatus::Delivered),
            "cancelled" => Ok(TripStatus::Cancelled),
            "expired" => Ok(TripStatus::Expired),
            "failed" => Ok(TripStatus::Failed),
            _ => Err(format!("Invalid trip status: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Scheduled => "scheduled",
            TripStatus::Accepted => "accepted",
            TripStatus::Arrived => "arrived",
            TripStatus::Ongoing => "ongoing",
            TripStatus::PickedUp => "picked_up",
            TripStatus::InTransit => "in_transit",
            TripStatus::Completed => "completed",
            TripStatus::Delivered => "delivered",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Expired => "expired",
            TripStatus::Failed => "failed",
        }
    }

    /// Terminal statuses accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TripStatus::Completed
                | TripStatus::Delivered
                | TripStatus::Cancelled
                | TripStatus::Expired
                | TripStatus::Failed
        )
    }

    /// Statuses from which a rider or driver may no longer cancel.
    /// An in-progress trip is cancellable only by admin override.
    pub fn is_cancel_locked(&self) -> bool {
        self.is_terminal() || matches!(self, TripStatus::Ongoing | TripStatus::InTransit)
    }
}

impl From<String> for TripStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(TripStatus::Pending)
    }
}

impl From<TripStatus> for String {
    fn from(status: TripStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Lifecycle actions a client can request on a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Accept,
    Arrive,
    Start,
    PickUp,
    StartTransit,
    Complete,
    Cancel,
}

impl TripAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripAction::Accept => "accept",
            TripAction::Arrive => "arrive",
            TripAction::Start => "start",
            TripAction::PickUp => "pick_up",
            TripAction::StartTransit => "start_transit",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
        }
    }

    /// Statuses from which this action is legal for the given trip kind.
    /// An empty slice means the action does not apply to the kind at all.
    pub fn allowed_from(&self, kind: TripKind) -> &'static [TripStatus] {
        match (self, kind) {
            (TripAction::Accept, _) => &[TripStatus::Pending, TripStatus::Scheduled],
            (TripAction::Arrive, _) => &[TripStatus::Accepted],
            (TripAction::Start, TripKind::Ride) => &[TripStatus::Arrived],
            (TripAction::Start, TripKind::Delivery) => &[],
            (TripAction::PickUp, TripKind::Delivery) => &[TripStatus::Arrived],
            (TripAction::PickUp, TripKind::Ride) => &[],
            (TripAction::StartTransit, TripKind::Delivery) => &[TripStatus::PickedUp],
            (TripAction::StartTransit, TripKind::Ride) => &[],
            (TripAction::Complete, TripKind::Ride) => &[TripStatus::Ongoing],
            (TripAction::Complete, TripKind::Delivery) => &[TripStatus::InTransit],
            // Cancel is guarded separately (is_cancel_locked + admin override)
            (TripAction::Cancel, _) => &[
                TripStatus::Pending,
                TripStatus::Scheduled,
                TripStatus::Accepted,
                TripStatus::Arrived,
                TripStatus::PickedUp,
            ],
        }
    }

    /// Human-readable predecessor status, used in error messages
    pub fn expected_status(&self, kind: TripKind) -> &'static str {
        match self.allowed_from(kind).first() {
            Some(status) => status.as_str(),
            None => "n/a",
        }
    }

    /// Whether the action requires the fare to have been paid first.
    /// Movement never precedes payment.
    pub fn requires_payment(&self, kind: TripKind) -> bool {
        matches!(
            (self, kind),
            (TripAction::Start, TripKind::Ride) | (TripAction::StartTransit, TripKind::Delivery)
        )
    }
}

/// Payment status of a trip fare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Who cancelled a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Rider,
    Driver,
    Admin,
}

impl CancelledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelledBy::Rider => "rider",
            CancelledBy::Driver => "driver",
            CancelledBy::Admin => "admin",
        }
    }
}

/// Vehicle classes a request can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
    Van,
    Truck,
}

impl VehicleType {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "bike" => Ok(VehicleType::Bike),
            "van" => Ok(VehicleType::Van),
            "truck" => Ok(VehicleType::Truck),
            _ => Err(format!("Invalid vehicle type: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Bike => "bike",
            VehicleType::Van => "van",
            VehicleType::Truck => "truck",
        }
    }
}

/// Package contents for a delivery, validated at the boundary before the
/// request enters the lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageInfo {
    Document,
    Parcel { weight_kg: f64 },
    Food,
    Fragile { handling_note: Option<String> },
}

impl PackageInfo {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PackageInfo::Parcel { weight_kg } => {
                if *weight_kg <= 0.0 {
                    return Err("Parcel weight must be positive".to_string());
                }
                if *weight_kg > 100.0 {
                    return Err("Parcel weight exceeds the 100kg limit".to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// A geographic point with its display address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Write-once trip timestamp fields. Each is appended at most once; a second
/// append is a no-op (monotonic, never overwritten).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    AcceptedAt,
    ArrivedAt,
    PickedUpAt,
    StartedAt,
    InTransitAt,
    CompletedAt,
    DeliveredAt,
    CancelledAt,
}

impl TimestampField {
    /// Fixed column name; never derived from user input
    pub fn column(&self) -> &'static str {
        match self {
            TimestampField::AcceptedAt => "accepted_at",
            TimestampField::ArrivedAt => "arrived_at",
            TimestampField::PickedUpAt => "picked_up_at",
            TimestampField::StartedAt => "started_at",
            TimestampField::InTransitAt => "in_transit_at",
            TimestampField::CompletedAt => "completed_at",
            TimestampField::DeliveredAt => "delivered_at",
            TimestampField::CancelledAt => "cancelled_at",
        }
    }
}

/// Split a fare into driver earnings and platform commission.
/// Invariant: earnings + commission == fare, always.
pub fn split_fare(fare: i64, commission_bps: i64) -> (i64, i64) {
    let commission = fare * commission_bps / 10_000;
    (fare - commission, commission)
}

/// Parameters for creating a new trip
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub kind: TripKind,
    pub rider_id: Uuid,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub fare: i64,
    pub vehicle_type: VehicleType,
    pub package: Option<PackageInfo>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl NewTrip {
    /// Boundary validation before the request enters the state machine
    pub fn validate(&self) -> Result<(), String> {
        if self.fare <= 0 {
            return Err("Fare must be positive".to_string());
        }
        match (self.kind, &self.package) {
            (TripKind::Delivery, None) => {
                return Err("Deliveries require package details".to_string())
            }
            (TripKind::Ride, Some(_)) => {
                return Err("Rides do not carry package details".to_string())
            }
            (TripKind::Delivery, Some(package)) => package.validate()?,
            (TripKind::Ride, None) => {}
        }
        if let Some(scheduled_time) = self.scheduled_time {
            if scheduled_time <= Utc::now() {
                return Err("Scheduled time must be in the future".to_string());
            }
        }
        Ok(())
    }

    /// Initial status: pre-booked trips start out scheduled
    pub fn initial_status(&self) -> TripStatus {
        if self.scheduled_time.is_some() {
            TripStatus::Scheduled
        } else {
            TripStatus::Pending
        }
    }
}

/// Trip model representing a ride or delivery
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub kind: String,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>, // Set exactly once, on acceptance
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub pickup_address: String,
    pub destination_lat: f64,
    pub destination_lng: f64,
    pub destination_address: String,
    pub status: String,
    pub fare: i64,
    pub driver_earnings: i64,
    pub commission: i64,
    pub payment_status: String,
    pub vehicle_type: String,
    pub package: Option<serde_json::Value>, // Tagged PackageInfo, deliveries only
    pub scheduled: bool,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub driver_paid: bool,
    pub dispatch_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// Get kind as an enum
    pub fn kind_enum(&self) -> TripKind {
        TripKind::from_str(&self.kind).unwrap_or(TripKind::Ride)
    }

    /// Get status as an enum
    pub fn status_enum(&self) -> TripStatus {
        TripStatus::from_str(&self.status).unwrap_or(TripStatus::Pending)
    }

    /// Get payment status as an enum
    pub fn payment_status_enum(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.payment_status).unwrap_or(PaymentStatus::Unpaid)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status_enum() == PaymentStatus::Paid
    }

    pub fn is_terminal(&self) -> bool {
        self.status_enum().is_terminal()
    }

    /// Package details as the tagged enum, when present
    pub fn package_info(&self) -> Option<PackageInfo> {
        self.package
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Whether the trip is pre-booked for a future time
    pub fn is_scheduled_for_future(&self) -> bool {
        self.scheduled
            && self
                .scheduled_time
                .map(|t| t > Utc::now())
                .unwrap_or(false)
    }

    /// Idempotency reference for the rider's fare payment
    pub fn fare_reference(&self) -> String {
        format!("trip_{}_fare", self.id)
    }

    /// Idempotency reference for the driver's settlement credit
    pub fn settlement_reference(&self) -> String {
        format!("trip_{}_driver_payment", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        assert_eq!(TripStatus::Pending.as_str(), "pending");
        assert_eq!(TripStatus::PickedUp.as_str(), "picked_up");
        assert_eq!(
            TripStatus::from_str("in_transit").unwrap(),
            TripStatus::InTransit
        );
        assert!(TripStatus::from_str("teleporting").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            TripStatus::Completed,
            TripStatus::Delivered,
            TripStatus::Cancelled,
            TripStatus::Expired,
            TripStatus::Failed,
        ] {
            assert!(status.is_terminal(), "{:?} should be terminal", status);
        }
        for status in [
            TripStatus::Pending,
            TripStatus::Accepted,
            TripStatus::Ongoing,
            TripStatus::InTransit,
        ] {
            assert!(!status.is_terminal(), "{:?} should not be terminal", status);
        }
    }

    #[test]
    fn test_accept_allowed_from_pending_and_scheduled_only() {
        let allowed = TripAction::Accept.allowed_from(TripKind::Ride);
        assert!(allowed.contains(&TripStatus::Pending));
        assert!(allowed.contains(&TripStatus::Scheduled));
        assert!(!allowed.contains(&TripStatus::Accepted));
    }

    #[test]
    fn test_kind_specific_actions() {
        assert!(TripAction::Start.allowed_from(TripKind::Delivery).is_empty());
        assert!(TripAction::PickUp.allowed_from(TripKind::Ride).is_empty());
        assert_eq!(
            TripAction::Complete.allowed_from(TripKind::Ride),
            &[TripStatus::Ongoing]
        );
        assert_eq!(
            TripAction::Complete.allowed_from(TripKind::Delivery),
            &[TripStatus::InTransit]
        );
    }

    #[test]
    fn test_payment_precedes_movement() {
        assert!(TripAction::Start.requires_payment(TripKind::Ride));
        assert!(TripAction::StartTransit.requires_payment(TripKind::Delivery));
        assert!(!TripAction::Arrive.requires_payment(TripKind::Ride));
        assert!(!TripAction::PickUp.requires_payment(TripKind::Delivery));
    }

    #[test]
    fn test_cancel_locked_statuses() {
        assert!(TripStatus::Ongoing.is_cancel_locked());
        assert!(TripStatus::InTransit.is_cancel_locked());
        assert!(TripStatus::Completed.is_cancel_locked());
        assert!(!TripStatus::Accepted.is_cancel_locked());
        assert!(!TripStatus::Pending.is_cancel_locked());
    }

    #[test]
    fn test_split_fare_conserves_total() {
        let (earnings, commission) = split_fare(1000, 1500);
        assert_eq!(commission, 150);
        assert_eq!(earnings, 850);
        assert_eq!(earnings + commission, 1000);

        // Rounding must never create or destroy money
        for fare in [1, 7, 99, 1001, 12345] {
            let (e, c) = split_fare(fare, 1500);
            assert_eq!(e + c, fare);
        }
    }

    #[test]
    fn test_new_trip_validation() {
        let base = NewTrip {
            kind: TripKind::Ride,
            rider_id: Uuid::new_v4(),
            pickup: GeoPoint {
                lat: 6.5244,
                lng: 3.3792,
                address: "Ikeja".into(),
            },
            destination: GeoPoint {
                lat: 6.4541,
                lng: 3.3947,
                address: "Victoria Island".into(),
            },
            fare: 1000,
            vehicle_type: VehicleType::Car,
            package: None,
            scheduled_time: None,
        };
        assert!(base.validate().is_ok());
        assert_eq!(base.initial_status(), TripStatus::Pending);

        let mut delivery = base.clone();
        delivery.kind = TripKind::Delivery;
        assert!(delivery.validate().is_err()); // missing package

        delivery.package = Some(PackageInfo::Parcel { weight_kg: 2.5 });
        assert!(delivery.validate().is_ok());

        delivery.package = Some(PackageInfo::Parcel { weight_kg: -1.0 });
        assert!(delivery.validate().is_err());

        let mut zero_fare = base.clone();
        zero_fare.fare = 0;
        assert!(zero_fare.validate().is_err());
    }

    #[test]
    fn test_package_info_tagged_serialization() {
        let parcel = PackageInfo::Parcel { weight_kg: 3.0 };
        let json = serde_json::to_value(&parcel).unwrap();
        assert_eq!(json["kind"], "parcel");
        let back: PackageInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, parcel);
    }
}
