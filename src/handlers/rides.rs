//! Ride HTTP handlers.
//!
//! - POST /api/rides - Offer a ride
//! - GET /api/rides/{id} - Get ride details and seat availability
//! - GET /api/rides/{id}/bookings - Bookings of a ride (owner only)
//! - DELETE /api/rides/{id} - Cancel a ride and all its bookings

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::booking::BookingResponse;
use crate::models::ride::{CreateRideRequest, RideResponse, RideStatus};
use crate::services::cancellation_service::{
    self, CancellationFailure, RefundFailureReport, RideCancellation,
};
use crate::services::ride_service;
use crate::state::AppState;

/// Response body for a cancelled ride.
///
/// ```json
/// {
///   "rideId": "550e8400-...",
///   "status": "CANCELLED",
///   "affectedBookings": [ ... ],
///   "refundFailures": [
///     { "bookingId": "...", "passengerId": "...", "amountPaise": 25000, "reason": "..." }
///   ],
///   "failures": []
/// }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideCancellationResponse {
    pub ride_id: Uuid,
    pub status: RideStatus,
    pub available_seats: i32,
    pub affected_bookings: Vec<BookingResponse>,
    pub refund_failures: Vec<RefundFailureReport>,
    pub failures: Vec<CancellationFailure>,
}

impl From<RideCancellation> for RideCancellationResponse {
    fn from(c: RideCancellation) -> Self {
        Self {
            ride_id: c.ride.id,
            status: c.ride.status,
            available_seats: c.ride.available_seats,
            affected_bookings: c.affected.into_iter().map(Into::into).collect(),
            refund_failures: c.refund_failures,
            failures: c.failures,
        }
    }
}

/// Offer a new ride.
///
/// # Request Body
///
/// ```json
/// { "totalSeats": 3, "pricePerSeatPaise": 25000 }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "id": "550e8400-...",
///   "ownerId": "...",
///   "totalSeats": 3,
///   "availableSeats": 3,
///   "pricePerSeatPaise": 25000,
///   "status": "OPEN",
///   "createdAt": "2026-10-16T10:00:00Z"
/// }
/// ```
pub async fn create_ride(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateRideRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ride = ride_service::create_ride(&state, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(RideResponse::from(ride))))
}

pub async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideResponse>, AppError> {
    let ride = ride_service::get_ride(&state, ride_id).await?;
    Ok(Json(ride.into()))
}

/// List the bookings of a ride, oldest first.
///
/// # Errors
///
/// - 403 if the caller does not own the ride
pub async fn list_ride_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = ride_service::list_ride_bookings(&state, &actor, ride_id).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

/// Cancel a ride.
///
/// Returns 200 even when some refunds failed; those are listed in
/// `refundFailures` and can be retried per booking.
pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideCancellationResponse>, AppError> {
    let cancellation = cancellation_service::cancel_ride(&state, &actor, ride_id).await?;
    Ok(Json(cancellation.into()))
}
