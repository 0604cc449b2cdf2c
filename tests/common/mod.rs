#![allow(dead_code)]

pub mod interleaved;

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use ride_booking_engine::gateway::{OrderHandle, SimulatedGateway};
use ride_booking_engine::models::actor::Actor;
use ride_booking_engine::models::booking::{Booking, CreateBookingRequest, PaymentMethod};
use ride_booking_engine::models::event::EventType;
use ride_booking_engine::models::payment::{CreateOrderRequest, VerifyPaymentRequest};
use ride_booking_engine::models::ride::{CreateRideRequest, Ride};
use ride_booking_engine::models::wallet::{TopUpCallbackRequest, TopUpRequest};
use ride_booking_engine::services::notification_service::RecordingNotifier;
use ride_booking_engine::services::{
    booking_service, ride_service, verification_service, wallet_service,
};
use ride_booking_engine::db;
use ride_booking_engine::state::{AppState, EngineSettings};
use ride_booking_engine::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};

pub const GATEWAY_SECRET: &str = "test_gateway_secret";
pub const GATEWAY_KEY_ID: &str = "rzp_test_local";

pub struct Harness {
    pub state: AppState,

    /// The ledger as the engine sees it
    pub store: Arc<dyn LedgerStore>,
    pub gateway: Arc<SimulatedGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    /// Online holds expire the moment they are taken.
    pub fn with_instant_expiry() -> Self {
        Self::with_settings(EngineSettings {
            hold_ttl: Duration::zero(),
            ..EngineSettings::default()
        })
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self::with_store(Arc::new(MemoryLedgerStore::new()), settings)
    }

    pub fn with_store(store: Arc<dyn LedgerStore>, settings: EngineSettings) -> Self {
        let gateway = Arc::new(SimulatedGateway::new(GATEWAY_KEY_ID, GATEWAY_SECRET, "INR"));
        let notifier = Arc::new(RecordingNotifier::new());
        let state = AppState::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            settings,
        );
        Self {
            state,
            store,
            gateway,
            notifier,
        }
    }

    /// Harness on the PostgreSQL ledger at `DATABASE_URL`, migrated.
    ///
    /// Returns `None` when `DATABASE_URL` is not set so the caller can skip.
    /// Every test works on fresh random ids, so tests share one database.
    pub async fn postgres() -> Option<Self> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL ledger test");
            return None;
        };
        let pool = db::create_pool(&database_url, 10)
            .await
            .expect("Failed to connect to DATABASE_URL");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Some(Self::with_store(
            Arc::new(PgLedgerStore::new(pool)),
            EngineSettings::default(),
        ))
    }

    /// Total earnings and pending payout of `driver`.
    pub async fn earnings(&self, driver: &Actor) -> (i64, i64) {
        let earnings = self.store.driver_earnings(driver.user_id).await.unwrap();
        (earnings.total_earnings_paise, earnings.pending_payout_paise)
    }

    pub async fn ride(&self, driver: &Actor, seats: i32, price_per_seat_paise: i64) -> Ride {
        ride_service::create_ride(
            &self.state,
            driver,
            CreateRideRequest {
                total_seats: seats,
                price_per_seat_paise,
            },
        )
        .await
        .unwrap()
    }

    pub async fn available_seats(&self, ride_id: Uuid) -> i32 {
        self.store
            .find_ride(ride_id)
            .await
            .unwrap()
            .unwrap()
            .available_seats
    }

    pub async fn balance(&self, owner: &Actor) -> i64 {
        wallet_service::balance(&self.state, owner)
            .await
            .unwrap()
            .balance_paise
    }

    /// Sum of the owner's wallet transactions.
    pub async fn ledger_sum(&self, owner: &Actor) -> i64 {
        wallet_service::transactions(&self.state, owner)
            .await
            .unwrap()
            .iter()
            .map(|t| t.amount_paise)
            .sum()
    }

    /// Credit `amount_paise` through a completed top-up.
    pub async fn fund(&self, owner: &Actor, amount_paise: i64) {
        let key = format!("seed-{}", Uuid::new_v4());
        wallet_service::create_topup(
            &self.state,
            owner,
            TopUpRequest {
                amount_paise,
                idempotency_key: key.clone(),
                provider: None,
            },
        )
        .await
        .unwrap();
        wallet_service::complete_topup(
            &self.state,
            owner,
            TopUpCallbackRequest {
                idempotency_key: key,
                provider_payment_id: format!("sim_{}", Uuid::new_v4()),
                success: true,
            },
        )
        .await
        .unwrap();
    }

    pub async fn book(
        &self,
        passenger: &Actor,
        ride_id: Uuid,
        seats: i32,
        method: PaymentMethod,
    ) -> Booking {
        booking_service::create_booking(
            &self.state,
            passenger,
            booking_request(ride_id, seats, method),
        )
        .await
        .unwrap()
        .booking
    }

    pub async fn order(
        &self,
        passenger: &Actor,
        ride: &Ride,
        seats: i32,
    ) -> (Booking, OrderHandle) {
        booking_service::create_order(
            &self.state,
            passenger,
            CreateOrderRequest {
                ride_id: ride.id,
                amount_paise: ride.price_per_seat_paise * i64::from(seats),
                seats: Some(seats),
                idempotency_key: None,
            },
        )
        .await
        .unwrap()
    }

    /// Pay `order` at the gateway and build the callback the client relays.
    pub fn checkout(&self, booking: &Booking, order: &OrderHandle) -> VerifyPaymentRequest {
        let (payment_id, signature) = self.gateway.complete_checkout(&order.order_id);
        VerifyPaymentRequest {
            ride_id: booking.ride_id,
            amount_paise: order.amount_paise,
            gateway_order_id: order.order_id.clone(),
            gateway_payment_id: payment_id,
            gateway_signature: signature,
        }
    }

    /// ONLINE booking taken through order, checkout and verification.
    pub async fn paid_online_booking(&self, passenger: &Actor, ride: &Ride, seats: i32) -> Booking {
        let (booking, order) = self.order(passenger, ride, seats).await;
        let callback = self.checkout(&booking, &order);
        verification_service::verify_payment(&self.state, passenger, callback)
            .await
            .unwrap();
        self.store.find_booking(booking.id).await.unwrap().unwrap()
    }

    pub fn events_of(&self, event_type: EventType) -> usize {
        self.notifier
            .events()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

pub fn booking_request(ride_id: Uuid, seats: i32, method: PaymentMethod) -> CreateBookingRequest {
    CreateBookingRequest {
        ride_id,
        seats,
        payment_method: method,
        payment_id: None,
        idempotency_key: None,
    }
}

pub fn member() -> Actor {
    Actor::member(Uuid::new_v4())
}

pub fn operator() -> Actor {
    Actor::operator(Uuid::new_v4())
}
