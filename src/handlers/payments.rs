//! Gateway payment HTTP handlers.
//!
//! - POST /api/payments/order - Hold seats and create a gateway order
//! - POST /api/payments/verify - Verify the signed checkout callback

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::payment::{
    CreateOrderRequest, OrderResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::services::{booking_service, verification_service};
use crate::state::AppState;

/// Create a gateway order for an ONLINE booking.
///
/// Seats are held from this moment until the payment is verified or the
/// hold expires.
///
/// # Request Body
///
/// ```json
/// { "rideId": "550e8400-...", "amountPaise": 25000, "seats": 1 }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "orderId": "order_9A33XWu170gUtm",
///   "amount": 25000,
///   "key": "rzp_test_1DP5mmOlF5G5ag",
///   "currency": "INR",
///   "bookingId": "770e8400-..."
/// }
/// ```
pub async fn create_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (booking, order) = booking_service::create_order(&state, &actor, request).await?;

    let response = OrderResponse {
        order_id: order.order_id,
        amount: order.amount_paise,
        key: state.gateway.key_id().to_string(),
        currency: order.currency,
        booking_id: booking.id,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Verify a gateway payment and confirm its booking.
///
/// Replaying the same callback returns the same result.
///
/// # Errors
///
/// - 400 `INVALID_SIGNATURE` if the signature does not match
/// - 502 `ORPHANED_PAYMENT` if the money moved but the booking could not be
///   confirmed; the payment is queued for reconciliation
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let payment = verification_service::verify_payment(&state, &actor, request).await?;
    Ok(Json(payment.into()))
}
