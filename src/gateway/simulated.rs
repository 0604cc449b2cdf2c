//! In-process payment gateway.
//!
//! Used when `GATEWAY_MODE=simulated` and by the test suite. Orders and
//! refunds are kept in memory, callbacks are signed with the same secret the
//! engine verifies with, and refunds can be made to fail for chosen payments.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::gateway::{
    GatewayError, OrderHandle, OrderMetadata, PaymentGateway, RefundHandle, RefundRequest,
    Verification, signature,
};

#[derive(Default)]
struct SimState {
    orders: HashMap<String, i64>,
    refunds: HashMap<String, RefundHandle>,
    failing_refunds: HashSet<String>,
    fail_orders: bool,
}

pub struct SimulatedGateway {
    key_id: String,
    secret: String,
    currency: String,
    sequence: AtomicU64,
    state: Mutex<SimState>,
}

impl SimulatedGateway {
    pub fn new(key_id: &str, secret: &str, currency: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            secret: secret.to_string(),
            currency: currency.to_string(),
            sequence: AtomicU64::new(1),
            state: Mutex::new(SimState::default()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let salt: u32 = rand::random();
        format!("{prefix}_{n:06}{salt:08x}")
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, SimState>, GatewayError> {
        self.state
            .lock()
            .map_err(|_| GatewayError::Unavailable("simulated gateway lock poisoned".to_string()))
    }

    /// Complete checkout for `order_id` the way a customer would, returning the
    /// payment id and the signature the client relays back to the engine.
    pub fn complete_checkout(&self, order_id: &str) -> (String, String) {
        let payment_id = self.next_id("pay");
        let sig = signature::sign_payment(&self.secret, order_id, &payment_id);
        (payment_id, sig)
    }

    /// Make every refund of `gateway_payment_id` fail until cleared.
    pub fn fail_refunds_for(&self, gateway_payment_id: &str) {
        if let Ok(mut state) = self.state() {
            state.failing_refunds.insert(gateway_payment_id.to_string());
        }
    }

    pub fn clear_refund_failures(&self) {
        if let Ok(mut state) = self.state() {
            state.failing_refunds.clear();
        }
    }

    /// Make order creation fail (gateway outage).
    pub fn set_orders_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state() {
            state.fail_orders = failing;
        }
    }

    /// Number of distinct refunds paid out.
    pub fn refund_count(&self) -> usize {
        self.state().map(|s| s.refunds.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
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
        let order_id = self.next_id("order");
        let mut state = self.state()?;
        if state.fail_orders {
            return Err(GatewayError::Unavailable(
                "simulated order outage".to_string(),
            ));
        }
        state.orders.insert(order_id.clone(), amount_paise);
        tracing::debug!(%order_id, receipt = %metadata.receipt(), amount_paise, "simulated order created");

        Ok(OrderHandle {
            order_id,
            amount_paise,
            currency: self.currency.clone(),
        })
    }

    fn verify_callback(&self, order_id: &str, payment_id: &str, signature: &str) -> Verification {
        signature::verify_payment(&self.secret, order_id, payment_id, signature)
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundHandle, GatewayError> {
        let refund_id = self.next_id("rfnd");
        let mut state = self.state()?;
        if state.failing_refunds.contains(&request.gateway_payment_id) {
            return Err(GatewayError::Rejected {
                status: 400,
                body: format!("refund declined for {}", request.gateway_payment_id),
            });
        }

        let handle = state
            .refunds
            .entry(request.refund_key)
            .or_insert(RefundHandle { refund_id })
            .clone();
        Ok(handle)
    }
}
