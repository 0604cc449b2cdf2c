//! Gateway payment models and API request/response types.
//!
//! A `Payment` is created when an online booking's gateway order is placed,
//! is marked VERIFIED at most once when a signed callback arrives, and after
//! that only its refund tracking fields change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum PaymentStatus {
        Created => "CREATED",
        Verified => "VERIFIED",
        Failed => "FAILED",
    }
}

text_enum! {
    /// Settlement state of a gateway refund.
    pub enum RefundStatus {
        Requested => "REQUESTED",
        Settled => "SETTLED",
        Failed => "FAILED",
    }
}

/// Represents a gateway payment record from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: Uuid,

    /// Booking this payment pays for
    pub booking_id: Option<Uuid>,

    pub ride_id: Uuid,
    pub payer_id: Uuid,

    /// Amount in paise
    pub amount_paise: i64,
    pub currency: String,

    /// Order id issued by the gateway (unique)
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub status: PaymentStatus,

    pub refund_status: Option<RefundStatus>,
    pub gateway_refund_id: Option<String>,
    pub refund_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Idempotency key sent with every refund request for this payment.
    pub fn refund_key(&self) -> String {
        format!("refund:{}", self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub payer_id: Uuid,
    pub amount_paise: i64,
    pub currency: String,
    pub gateway_order_id: String,
}

/// Outcome of a gateway refund request, recorded on the payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Settled { gateway_refund_id: String },
    Failed { reason: String },
}

/// Request body for creating a gateway order.
///
/// ```json
/// { "rideId": "550e8400-...", "amountPaise": 25000, "seats": 1 }
/// ```
///
/// `seats` defaults to 1. `amountPaise` must equal the fare for the seats.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub ride_id: Uuid,
    pub amount_paise: i64,
    pub seats: Option<i32>,
    pub idempotency_key: Option<String>,
}

/// Response body for a created gateway order.
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
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub key: String,
    pub currency: String,
    pub booking_id: Uuid,
}

/// Signed gateway callback relayed by the client after checkout.
///
/// ```json
/// {
///   "rideId": "550e8400-...",
///   "amountPaise": 25000,
///   "gatewayOrderId": "order_9A33XWu170gUtm",
///   "gatewayPaymentId": "pay_29QQoUBi66xm2f",
///   "gatewaySignature": "9ef4dffbfd84f1318f6739a3ce19f9d85851857ae648f114332d8401e0949a3d"
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub ride_id: Uuid,
    pub amount_paise: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    /// Id of the verified payment
    pub id: Uuid,
    pub booking_id: Option<Uuid>,
}

impl From<Payment> for VerifyPaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_id: payment.booking_id,
        }
    }
}
