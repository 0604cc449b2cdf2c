//! Notification port and its adapters.
//!
//! Booking events are handed to the port only after the ledger change they
//! describe has committed. Delivery failures are logged and never propagate:
//! a booking's success is independent of whether anyone hears about it.
//!
//! # Adapters
//!
//! - [`WebhookNotifier`]: posts HMAC-signed JSON to a configured URL
//! - [`LogNotifier`]: logs events, used when no webhook is configured
//! - [`RecordingNotifier`]: keeps events in memory for tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::signature;
use crate::models::event::DomainEvent;

#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Posts events to a single downstream webhook.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Webhook-Signature: sha256=<hex>`
/// - `X-Webhook-Event-Id: <uuid>`
///
/// # Timeout
///
/// 5 seconds per delivery. Deliveries run on their own task so a slow
/// receiver never delays the request that produced the event.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, secret: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[async_trait]
impl NotificationPort for WebhookNotifier {
    async fn publish(&self, event: DomainEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "failed to serialize event");
                return;
            }
        };
        let signature = signature::sign_webhook(&self.secret, &payload);

        let request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", signature)
            .header("X-Webhook-Event-Id", event.event_id.to_string())
            .body(payload);
        let event_id = event.event_id;
        let event_type = event.event_type;

        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(%event_id, %event_type, "event delivered");
                }
                Ok(resp) => {
                    tracing::warn!(
                        %event_id,
                        %event_type,
                        status = resp.status().as_u16(),
                        "event webhook rejected delivery"
                    );
                }
                Err(e) => {
                    tracing::error!(%event_id, %event_type, error = %e, "event webhook unreachable");
                }
            }
        });
    }
}

pub struct LogNotifier;

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn publish(&self, event: DomainEvent) {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            recipient = %event.data.recipient_id,
            ride_id = %event.data.ride_id,
            "booking event"
        );
    }
}

/// Keeps every published event, in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn publish(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
