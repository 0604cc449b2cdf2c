//! Error types and HTTP error response handling.
//!
//! This module defines all engine errors, the taxonomy they belong to, and how
//! they are converted into HTTP responses with appropriate status codes and
//! JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::models::booking::BookingStatus;

/// Error taxonomy shared by every caller-facing failure.
///
/// Clients receive the kind in the `error.kind` field so they can tell an
/// inventory rejection (refresh and retry) from a funds rejection (top up first)
/// without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Inventory,
    Funds,
    Verification,
    OrphanedPayment,
    RefundFailure,
    NotFound,
    Auth,
    Gateway,
    Internal,
}

/// Application-wide error type.
///
/// Each variant maps to one [`ErrorKind`] and one HTTP status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Ledger store operation failed (connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Authenticated actor is not allowed to touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Ride not found")]
    RideNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Top-up not found")]
    TopUpNotFound,

    #[error("Orphaned payment record not found")]
    OrphanNotFound,

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Seat count is zero, negative, or larger than the ride can ever hold.
    #[error("Invalid seat count: {0}")]
    InvalidSeatCount(i32),

    #[error("Ride is not open for booking")]
    RideNotOpen,

    /// Booking is not in a state that allows the requested transition.
    #[error("Booking {booking_id} is {status}")]
    InvalidBookingState {
        booking_id: Uuid,
        status: BookingStatus,
    },

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },

    #[error("Insufficient funds: required {required} paise, balance {balance} paise")]
    InsufficientFunds { required: i64, balance: i64 },

    /// Gateway callback signature did not match.
    #[error("Invalid payment signature")]
    InvalidSignature,

    /// Gateway callback referenced an order this engine never created.
    #[error("Unknown gateway order: {0}")]
    UnknownOrder(String),

    /// Money was verified by the gateway but the booking could not be committed.
    #[error("Orphaned payment for order {order_id}: {reason}")]
    OrphanedPayment { order_id: String, reason: String },

    /// A gateway refund request failed; the cancellation itself stands.
    #[error("Refund failed: {0}")]
    RefundFailed(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Internal consistency violation or unexpected state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidRequest(_)
            | AppError::InvalidSeatCount(_)
            | AppError::RideNotOpen
            | AppError::InvalidBookingState { .. } => ErrorKind::Validation,
            AppError::InsufficientSeats { .. } => ErrorKind::Inventory,
            AppError::InsufficientFunds { .. } => ErrorKind::Funds,
            AppError::InvalidSignature | AppError::UnknownOrder(_) => ErrorKind::Verification,
            AppError::OrphanedPayment { .. } => ErrorKind::OrphanedPayment,
            AppError::RefundFailed(_) => ErrorKind::RefundFailure,
            AppError::RideNotFound
            | AppError::BookingNotFound
            | AppError::PaymentNotFound
            | AppError::TopUpNotFound
            | AppError::OrphanNotFound => ErrorKind::NotFound,
            AppError::InvalidApiKey | AppError::Forbidden(_) => ErrorKind::Auth,
            AppError::Gateway(_) => ErrorKind::Gateway,
            AppError::Database(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_seats",
///     "kind": "inventory",
///     "message": "Insufficient seats: requested 2, available 1"
///   }
/// }
/// ```
///
/// Store and internal errors are logged here and their details hidden from the
/// client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::RideNotFound => (StatusCode::NOT_FOUND, "ride_not_found", self.to_string()),
            AppError::BookingNotFound => {
                (StatusCode::NOT_FOUND, "booking_not_found", self.to_string())
            }
            AppError::PaymentNotFound => {
                (StatusCode::NOT_FOUND, "payment_not_found", self.to_string())
            }
            AppError::TopUpNotFound => (StatusCode::NOT_FOUND, "topup_not_found", self.to_string()),
            AppError::OrphanNotFound => (StatusCode::NOT_FOUND, "orphan_not_found", self.to_string()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidSeatCount(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_seat_count",
                self.to_string(),
            ),
            AppError::RideNotOpen => (StatusCode::CONFLICT, "ride_not_open", self.to_string()),
            AppError::InvalidBookingState { .. } => (
                StatusCode::CONFLICT,
                "invalid_booking_state",
                self.to_string(),
            ),
            AppError::InsufficientSeats { .. } => (
                StatusCode::CONFLICT,
                "insufficient_seats",
                self.to_string(),
            ),
            AppError::InsufficientFunds { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_funds",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::UnknownOrder(_) => (StatusCode::BAD_REQUEST, "unknown_order", self.to_string()),
            AppError::OrphanedPayment { .. } => (
                StatusCode::BAD_GATEWAY,
                "orphaned_payment",
                "Payment was received but the booking could not be confirmed; it has been flagged for reconciliation".to_string(),
            ),
            AppError::RefundFailed(_) => (StatusCode::BAD_GATEWAY, "refund_failed", self.to_string()),
            AppError::Gateway(ref e) => {
                tracing::error!(error = %e, "payment gateway call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway_error",
                    "The payment gateway is unavailable".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "ledger store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal consistency error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "kind": kind,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
