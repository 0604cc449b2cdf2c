//! Ride Booking Engine - Application Entry Point
//!
//! REST API server for booking ride seats and reconciling their payments.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Ledger**: PostgreSQL with sqlx, or in memory when no database is set
//! - **Payments**: REST payment gateway, or an in-process simulation
//! - **Authentication**: API key with SHA-256 hashing
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the ledger (connect and migrate PostgreSQL, or start in memory)
//! 3. Build the gateway and notification adapters
//! 4. Start the expired-hold sweeper
//! 5. Build the HTTP router and start serving

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ride_booking_engine::config::{Config, GatewayMode};
use ride_booking_engine::gateway::{HttpGateway, PaymentGateway, SimulatedGateway};
use ride_booking_engine::models::actor::Actor;
use ride_booking_engine::services::notification_service::{
    LogNotifier, NotificationPort, WebhookNotifier,
};
use ride_booking_engine::services::seat_service;
use ride_booking_engine::state::{AppState, EngineSettings};
use ride_booking_engine::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use ride_booking_engine::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(gateway_mode = ?config.gateway_mode, "Configuration loaded");

    let store = open_store(&config).await?;
    let gateway = build_gateway(&config)?;
    let notifier = build_notifier(&config)?;

    let state = AppState::new(
        store,
        gateway,
        notifier,
        EngineSettings {
            hold_ttl: config.hold_ttl(),
            sweep_interval: config.sweep_interval(),
        },
    );

    let _sweeper = seat_service::spawn_hold_sweeper(state.clone());
    tracing::info!(
        interval_secs = config.sweep_interval_secs,
        "Hold sweeper started"
    );

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(database_url) => {
            let pool = db::create_pool(database_url, config.db_max_connections).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");

            Arc::new(PgLedgerStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping the ledger in memory");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    // Re-registering on every start keeps the key bound to its first operator
    if let Some(raw_key) = &config.bootstrap_api_key {
        let operator = store
            .register_api_key(raw_key, Actor::operator(Uuid::new_v4()))
            .await?;
        tracing::info!(user_id = %operator.user_id, "Bootstrap operator key registered");
    }
    Ok(store)
}

fn build_gateway(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match config.gateway_mode {
        GatewayMode::Http => {
            let base_url = config
                .gateway_base_url
                .as_deref()
                .context("GATEWAY_BASE_URL is required in http mode")?;
            let gateway = HttpGateway::new(
                base_url,
                &config.gateway_key_id,
                &config.gateway_key_secret,
                &config.gateway_currency,
            )?;
            Ok(Arc::new(gateway))
        }
        GatewayMode::Simulated => {
            tracing::warn!("Using the simulated payment gateway");
            Ok(Arc::new(SimulatedGateway::new(
                &config.gateway_key_id,
                &config.gateway_key_secret,
                &config.gateway_currency,
            )))
        }
    }
}

fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn NotificationPort>> {
    match (
        &config.notification_webhook_url,
        &config.notification_webhook_secret,
    ) {
        (Some(url), Some(secret)) => {
            tracing::info!(%url, "Booking events go to the notification webhook");
            Ok(Arc::new(WebhookNotifier::new(url, secret)?))
        }
        _ => Ok(Arc::new(LogNotifier)),
    }
}
