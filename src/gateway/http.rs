//! REST payment gateway adapter.
//!
//! # Endpoints Used
//!
//! - `POST {base}/orders` with `{amount, currency, receipt, notes}`
//! - `POST {base}/payments/{payment_id}/refund` with `{amount, receipt}`
//!
//! Requests authenticate with HTTP basic auth (`key_id:key_secret`). Refunds
//! also send `X-Idempotency-Key` so a retried refund is not paid out twice.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::gateway::{
    GatewayError, OrderHandle, OrderMetadata, PaymentGateway, RefundHandle, RefundRequest,
    Verification, signature,
};

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct RefundBody {
    id: String,
}

impl HttpGateway {
    /// Build an adapter with a 10 second request timeout.
    pub fn new(
        base_url: &str,
        key_id: &str,
        key_secret: &str,
        currency: &str,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
            currency: currency.to_string(),
        })
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn create_order(
        &self,
        amount_paise: i64,
        metadata: OrderMetadata,
    ) -> Result<OrderHandle, GatewayError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_paise,
                "currency": self.currency,
                "receipt": metadata.receipt(),
                "notes": {
                    "bookingId": metadata.booking_id.to_string(),
                    "rideId": metadata.ride_id.to_string(),
                    "userId": metadata.payer_id.to_string(),
                }
            }))
            .send()
            .await?;

        let order: OrderBody = Self::read_json(response).await?;
        if order.id.is_empty() {
            return Err(GatewayError::Malformed("order id is empty".to_string()));
        }
        if order.amount != amount_paise {
            tracing::warn!(
                order_id = %order.id,
                expected = amount_paise,
                actual = order.amount,
                "gateway order amount mismatch"
            );
            return Err(GatewayError::Malformed(format!(
                "order amount {} does not match requested {}",
                order.amount, amount_paise
            )));
        }

        Ok(OrderHandle {
            order_id: order.id,
            amount_paise: order.amount,
            currency: order.currency,
        })
    }

    fn verify_callback(&self, order_id: &str, payment_id: &str, signature: &str) -> Verification {
        signature::verify_payment(&self.key_secret, order_id, payment_id, signature)
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundHandle, GatewayError> {
        let response = self
            .client
            .post(format!(
                "{}/payments/{}/refund",
                self.base_url, request.gateway_payment_id
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .header("X-Idempotency-Key", &request.refund_key)
            .json(&json!({
                "amount": request.amount_paise,
                "receipt": request.refund_key,
            }))
            .send()
            .await?;

        let refund: RefundBody = Self::read_json(response).await?;
        Ok(RefundHandle {
            refund_id: refund.id,
        })
    }
}
