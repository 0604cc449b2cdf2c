//! Payment gateway port.
//!
//! The engine talks to the third-party gateway only through
//! [`PaymentGateway`]: it creates orders, verifies signed completion callbacks
//! and requests refunds. Two adapters exist:
//!
//! - [`HttpGateway`]: REST gateway reached over HTTPS with basic auth
//! - [`SimulatedGateway`]: in-process gateway for local runs and tests
//!
//! Callback verification is pure HMAC work and never touches the network.

use async_trait::async_trait;
use uuid::Uuid;

pub mod http;
pub mod signature;
pub mod simulated;

pub use http::HttpGateway;
pub use simulated::SimulatedGateway;

/// Failure talking to the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed gateway response: {0}")]
    Malformed(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Context attached to a gateway order.
#[derive(Debug, Clone)]
pub struct OrderMetadata {
    /// Booking the order pays for; doubles as the order receipt
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub payer_id: Uuid,
}

impl OrderMetadata {
    pub fn receipt(&self) -> String {
        self.booking_id.to_string()
    }
}

/// Order created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHandle {
    pub order_id: String,
    pub amount_paise: i64,
    pub currency: String,
}

/// Result of checking a completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub gateway_payment_id: String,
    pub amount_paise: i64,

    /// Stable per payment so retried refunds are deduplicated by the gateway
    pub refund_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundHandle {
    pub refund_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout client.
    fn key_id(&self) -> &str;

    fn currency(&self) -> &str;

    async fn create_order(
        &self,
        amount_paise: i64,
        metadata: OrderMetadata,
    ) -> Result<OrderHandle, GatewayError>;

    /// Recompute the callback signature and compare it in constant time.
    fn verify_callback(&self, order_id: &str, payment_id: &str, signature: &str) -> Verification;

    async fn refund(&self, request: RefundRequest) -> Result<RefundHandle, GatewayError>;
}
