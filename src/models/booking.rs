//! Booking data models and API request/response types.
//!
//! # State Machine
//!
//! ```text
//! PENDING --(payment verified)--> BOOKED --(cancel)--> CANCELLED
//! PENDING --(hold expired / payment failed)--> CANCELLED
//! ```
//!
//! CASH and WALLET bookings start directly at BOOKED. CANCELLED is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::OrderHandle;

text_enum! {
    /// Closed set of payment methods, dispatched by the payment coordinator.
    pub enum PaymentMethod {
        /// Collected in person by the driver
        Cash => "CASH",
        /// Debited from the passenger's prepaid wallet
        Wallet => "WALLET",
        /// Paid through a payment-gateway order
        Online => "ONLINE",
    }
}

text_enum! {
    pub enum BookingStatus {
        Pending => "PENDING",
        Booked => "BOOKED",
        Cancelled => "CANCELLED",
    }
}

text_enum! {
    /// Money side of a booking.
    pub enum BookingPaymentStatus {
        /// Nothing owed (cancelled cash booking)
        NoPayment => "NONE",
        /// Cash to be collected in person, or gateway payment in flight
        Pending => "PENDING",
        Paid => "PAID",
        /// Gateway payment never completed before the hold expired
        Failed => "FAILED",
        /// Gateway refund requested, outcome not yet recorded
        RefundPending => "REFUND_PENDING",
        Refunded => "REFUNDED",
        /// Gateway refund rejected; retryable
        RefundFailed => "REFUND_FAILED",
    }
}

/// A passenger's claim on seats of a ride.
///
/// Bookings are never deleted; cancelled ones are kept for history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,

    /// Fare locked in at booking time (seats x price), in paise
    pub amount_paise: i64,

    /// Expiry of the seat hold for PENDING online bookings
    pub hold_expires_at: Option<DateTime<Utc>>,

    /// Client-supplied key guarding against double-submitted booking forms
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Whether the booking still holds seats on its ride.
    pub fn holds_seats(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Booked)
    }

    /// Whether this is a PENDING hold whose expiry has passed at `now`.
    pub fn hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending
            && self.hold_expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Values needed to insert a booking together with its seat reservation.
///
/// The id is assigned by the coordinator so that ledger idempotency keys
/// derived from it are known before the write.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub amount_paise: i64,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

/// Request body for creating a booking.
///
/// ```json
/// {
///   "rideId": "550e8400-e29b-41d4-a716-446655440000",
///   "seats": 2,
///   "paymentMethod": "WALLET",
///   "idempotencyKey": "form-7f3a"
/// }
/// ```
///
/// `paymentId` lets an ONLINE client that already verified a gateway payment
/// fetch the booking created for it instead of booking again.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub ride_id: Uuid,
    pub seats: i32,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Gateway order details returned alongside a PENDING online booking.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub order_id: String,
    pub amount: i64,
    pub key: String,
    pub currency: String,
}

impl OrderDetails {
    pub fn new(order: &OrderHandle, key: &str) -> Self {
        Self {
            order_id: order.order_id.clone(),
            amount: order.amount_paise,
            key: key.to_string(),
            currency: order.currency.clone(),
        }
    }
}

/// Response body for booking endpoints.
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "rideId": "550e8400-e29b-41d4-a716-446655440000",
///   "seats": 2,
///   "paymentMethod": "WALLET",
///   "status": "BOOKED",
///   "paymentStatus": "PAID",
///   "amountPaise": 20000
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub payment_method: PaymentMethod,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub amount_paise: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderDetails>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            ride_id: booking.ride_id,
            passenger_id: booking.passenger_id,
            seats: booking.seats,
            payment_method: booking.payment_method,
            status: booking.status,
            payment_status: booking.payment_status,
            amount_paise: booking.amount_paise,
            hold_expires_at: booking.hold_expires_at,
            created_at: booking.created_at,
            order: None,
        }
    }
}

impl BookingResponse {
    pub fn with_order(mut self, order: OrderDetails) -> Self {
        self.order = Some(order);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_with_expiry(expires: DateTime<Utc>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            seats: 1,
            payment_method: PaymentMethod::Online,
            status: BookingStatus::Pending,
            payment_status: BookingPaymentStatus::Pending,
            amount_paise: 10_000,
            hold_expires_at: Some(expires),
            idempotency_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn hold_expiry_is_inclusive() {
        let now = Utc::now();
        assert!(pending_with_expiry(now).hold_expired(now));
        assert!(!pending_with_expiry(now + Duration::minutes(1)).hold_expired(now));
    }

    #[test]
    fn booked_booking_never_counts_as_expired() {
        let now = Utc::now();
        let mut booking = pending_with_expiry(now - Duration::minutes(5));
        booking.status = BookingStatus::Booked;
        assert!(!booking.hold_expired(now));
        assert!(booking.holds_seats());
    }

    #[test]
    fn payment_method_uses_client_spelling() {
        let method: PaymentMethod = serde_json::from_str("\"ONLINE\"").unwrap();
        assert_eq!(method, PaymentMethod::Online);
        assert_eq!(
            serde_json::to_string(&BookingPaymentStatus::NoPayment).unwrap(),
            "\"NONE\""
        );
    }
}
