//! Events emitted to the notification port.
//!
//! # Event Flow
//!
//! 1. A booking, cancellation or refund commits in the ledger
//! 2. The service builds a [`DomainEvent`] for each affected user
//! 3. The notification port delivers it downstream (email/push live elsewhere)
//!
//! Events are published only after the state they describe has committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::booking::Booking;

text_enum! {
    pub enum EventType {
        BookingConfirmed => "BOOKING_CONFIRMED",
        BookingCancelled => "BOOKING_CANCELLED",
        RideCancelled => "RIDE_CANCELLED",
        RefundIssued => "REFUND_ISSUED",
        EarningsAdded => "EARNINGS_ADDED",
    }
}

/// Payload handed to the notification port.
///
/// # Example
///
/// ```json
/// {
///   "type": "REFUND_ISSUED",
///   "eventId": "550e8400-e29b-41d4-a716-446655440000",
///   "createdAt": "2026-10-16T10:30:00Z",
///   "data": {
///     "recipientId": "...",
///     "rideId": "...",
///     "bookingId": "...",
///     "seats": 2,
///     "amountPaise": 20000
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// User the notification is addressed to
    pub recipient_id: Uuid,
    pub ride_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paise: Option<i64>,
}

impl DomainEvent {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            data,
        }
    }

    /// Event about `booking`, addressed to its passenger.
    pub fn for_booking(event_type: EventType, booking: &Booking) -> Self {
        Self::new(
            event_type,
            EventData {
                recipient_id: booking.passenger_id,
                ride_id: booking.ride_id,
                booking_id: Some(booking.id),
                seats: Some(booking.seats),
                amount_paise: None,
            },
        )
    }

    /// Event about `booking`, addressed to the driver of its ride.
    pub fn for_driver(event_type: EventType, driver_id: Uuid, booking: &Booking) -> Self {
        let mut event = Self::for_booking(event_type, booking);
        event.data.recipient_id = driver_id;
        event
    }

    pub fn with_amount(mut self, amount_paise: i64) -> Self {
        self.data.amount_paise = Some(amount_paise);
        self
    }
}
