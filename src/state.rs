//! Shared application state handed to every handler and service.

use std::sync::Arc;

use crate::gateway::PaymentGateway;
use crate::services::notification_service::NotificationPort;
use crate::store::LedgerStore;

/// Tunables of the booking engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// How long an ONLINE booking holds its seats waiting for payment
    pub hold_ttl: chrono::Duration,

    /// Period of the expired-hold and stalled-refund sweep
    pub sweep_interval: std::time::Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            hold_ttl: chrono::Duration::minutes(15),
            sweep_interval: std::time::Duration::from_secs(30),
        }
    }
}

/// Cloned into every request; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn NotificationPort>,
    pub settings: EngineSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationPort>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            settings,
        }
    }
}
