//! Ride data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on seats a single ride may offer.
pub const MAX_SEATS_PER_RIDE: i32 = 50;

text_enum! {
    pub enum RideStatus {
        Open => "OPEN",
        Cancelled => "CANCELLED",
    }
}

/// A ride offered by a driver.
///
/// # Seat Inventory
///
/// `available_seats` is only changed by the seat reservation path and always
/// satisfies `0 <= available_seats <= total_seats` (also enforced by a CHECK
/// constraint in the `rides` table).
///
/// # Price Storage
///
/// Prices are stored as `i64` paise (INR minor units), never floats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ride {
    pub id: Uuid,

    /// Driver who offered the ride
    pub owner_id: Uuid,

    pub total_seats: i32,
    pub available_seats: i32,
    pub price_per_seat_paise: i64,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn is_open(&self) -> bool {
        self.status == RideStatus::Open
    }

    /// Total fare for `seats` seats, or `None` on overflow.
    pub fn fare_for(&self, seats: i32) -> Option<i64> {
        self.price_per_seat_paise.checked_mul(i64::from(seats))
    }
}

/// Values needed to insert a new ride.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub owner_id: Uuid,
    pub total_seats: i32,
    pub price_per_seat_paise: i64,
}

/// Request body for offering a ride.
///
/// ```json
/// { "totalSeats": 3, "pricePerSeatPaise": 25000 }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    pub total_seats: i32,
    pub price_per_seat_paise: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub total_seats: i32,
    pub available_seats: i32,
    pub price_per_seat_paise: i64,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Ride> for RideResponse {
    fn from(ride: Ride) -> Self {
        Self {
            id: ride.id,
            owner_id: ride.owner_id,
            total_seats: ride.total_seats,
            available_seats: ride.available_seats,
            price_per_seat_paise: ride.price_per_seat_paise,
            status: ride.status,
            created_at: ride.created_at,
        }
    }
}
