//! Booking HTTP handlers.
//!
//! - POST /api/bookings - Book seats (CASH, WALLET or ONLINE)
//! - GET /api/bookings/my - Bookings of the caller
//! - GET /api/bookings/{id} - Booking details
//! - DELETE /api/bookings/{id} - Cancel a booking
//! - POST /api/bookings/{id}/refund - Retry a failed gateway refund

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
use crate::models::booking::{
    BookingPaymentStatus, BookingResponse, BookingStatus, CreateBookingRequest, OrderDetails,
};
use crate::services::booking_service;
use crate::services::cancellation_service::{self, BookingCancellation, RefundSummary};
use crate::state::AppState;

/// Response body for a cancelled booking.
///
/// ```json
/// {
///   "id": "770e8400-...",
///   "status": "CANCELLED",
///   "paymentStatus": "REFUNDED",
///   "refund": { "kind": "WALLET_CREDITED", "amountPaise": 20000 }
/// }
/// ```
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCancellationResponse {
    pub id: Uuid,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub refund: RefundSummary,
}

impl From<BookingCancellation> for BookingCancellationResponse {
    fn from(c: BookingCancellation) -> Self {
        Self {
            id: c.booking.id,
            status: c.booking.status,
            payment_status: c.booking.payment_status,
            refund: c.refund,
        }
    }
}

/// Create a booking.
///
/// # Request Body
///
/// ```json
/// {
///   "rideId": "550e8400-...",
///   "seats": 2,
///   "paymentMethod": "ONLINE",
///   "idempotencyKey": "form-7f3a"
/// }
/// ```
///
/// # Response (201)
///
/// ONLINE bookings come back PENDING with the gateway order to pay:
///
/// ```json
/// {
///   "id": "770e8400-...",
///   "status": "PENDING",
///   "paymentStatus": "PENDING",
///   "amountPaise": 50000,
///   "holdExpiresAt": "2026-10-16T10:15:00Z",
///   "order": { "orderId": "order_...", "amount": 50000, "key": "rzp_test_...", "currency": "INR" }
/// }
/// ```
///
/// # Errors
///
/// - 409 if the ride is not open or has too few seats
/// - 422 if the wallet balance is too low (no seats are held)
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let placed = booking_service::create_booking(&state, &actor, request).await?;

    let mut response = BookingResponse::from(placed.booking);
    if let Some(order) = placed.order {
        response = response.with_order(OrderDetails::new(&order, state.gateway.key_id()));
    }
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = booking_service::list_my_bookings(&state, &actor).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = booking_service::get_booking(&state, &actor, booking_id).await?;
    Ok(Json(booking.into()))
}

/// Cancel a booking.
///
/// Seats are released immediately. A gateway refund that fails is reported
/// in `refund` with kind `GATEWAY_FAILED` and the booking stays
/// `REFUND_FAILED` until retried.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingCancellationResponse>, AppError> {
    let cancellation = cancellation_service::cancel_booking(&state, &actor, booking_id).await?;
    Ok(Json(cancellation.into()))
}

/// Retry the gateway refund of a cancelled booking.
///
/// # Errors
///
/// - 400 if no refund is outstanding
/// - 502 if the gateway rejects the refund again
pub async fn retry_refund(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = cancellation_service::retry_refund(&state, &actor, booking_id).await?;
    Ok(Json(booking.into()))
}
