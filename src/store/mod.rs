//! Ledger store port.
//!
//! The ledger is the only shared mutable resource of the engine. Every method
//! of [`LedgerStore`] that changes more than one record is one atomic unit:
//! seat counters, booking state, payment state and wallet balances either
//! move together or not at all.
//!
//! # Implementations
//!
//! - [`PgLedgerStore`]: PostgreSQL, row locks taken in the fixed order
//!   payment → booking → ride → wallet
//! - [`MemoryLedgerStore`]: one mutex around the whole ledger, for local runs
//!   and tests
//!
//! No method performs network I/O besides talking to its own backend, so the
//! gateway is never called while a unit is open.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::booking::{Booking, NewBooking};
use crate::models::earnings::{DriverEarnings, EarningEntry};
use crate::models::payment::{NewPayment, Payment, RefundOutcome};
use crate::models::reconciliation::{NewOrphanedPayment, OrphanedPayment};
use crate::models::ride::{NewRide, Ride};
use crate::models::wallet::{
    NewTopUp, WalletAccount, WalletDebit, WalletTopUp, WalletTransaction,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// A gateway callback whose signature has already been checked.
#[derive(Debug, Clone)]
pub struct VerifiedCallback {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

/// Result of committing a verified gateway payment.
#[derive(Debug, Clone)]
pub enum VerifyCommit {
    /// Payment VERIFIED, its booking moved PENDING → BOOKED/PAID and the
    /// ride owner credited with `earning`.
    Committed {
        payment: Payment,
        booking: Booking,
        earning: EarningEntry,
    },

    /// The payment was already VERIFIED by an earlier callback; nothing changed.
    Replayed {
        payment: Payment,
        booking: Option<Booking>,
    },

    /// Money moved but the booking could not be committed: it is no longer
    /// PENDING, or its ride was cancelled meanwhile.
    ///
    /// The payment is recorded as VERIFIED regardless.
    Orphaned {
        payment: Payment,
        booking: Option<Booking>,
        reason: String,
    },
}

/// What must happen to the money of a booking that was just cancelled.
#[derive(Debug, Clone)]
pub enum RefundPlan {
    /// Nothing was paid (cash).
    None,

    /// Wallet refund already credited inside the cancellation unit.
    WalletCredited {
        amount_paise: i64,
        transaction: WalletTransaction,
    },

    /// Gateway refund of `payment` requested; the call happens after commit.
    Gateway { payment: Payment },
}

#[derive(Debug, Clone)]
pub struct CancelCommit {
    pub booking: Booking,
    pub refund: RefundPlan,

    /// Reversal of the driver's earning, for bookings that were paid
    pub reversed_earning: Option<EarningEntry>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name reported by the health check.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), AppError>;

    /// Resolve an active API key (by SHA-256 hex hash) to its actor.
    async fn find_actor_by_key_hash(&self, key_hash: &str) -> Result<Option<Actor>, AppError>;

    /// Store the hash of `raw_key` for `actor`.
    ///
    /// Registering a key that already exists keeps the original record and
    /// returns the actor it belongs to, so a key provisioned at every startup
    /// stays bound to one user.
    async fn register_api_key(&self, raw_key: &str, actor: Actor) -> Result<Actor, AppError>;

    // Rides

    async fn insert_ride(&self, ride: NewRide) -> Result<Ride, AppError>;

    async fn find_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, AppError>;

    /// Mark a ride CANCELLED so it accepts no new bookings. Idempotent.
    async fn mark_ride_cancelled(&self, ride_id: Uuid) -> Result<Ride, AppError>;

    // Bookings and seats

    /// Reserve seats and insert the booking in one unit.
    ///
    /// The seat decrement is conditional: it succeeds only while the ride is
    /// OPEN and has at least `booking.seats` seats available. With a `debit`
    /// the wallet balance is checked and debited in the same unit, so an
    /// insufficient balance leaves seats untouched, and the ride owner is
    /// credited with the fare less commission.
    ///
    /// A booking with the same `(passenger_id, idempotency_key)` is returned
    /// as-is instead of booking again.
    ///
    /// # Errors
    ///
    /// - `RideNotFound`, `RideNotOpen`
    /// - `InsufficientSeats`: fewer seats available than requested
    /// - `InsufficientFunds`: wallet balance below the debit
    async fn reserve_and_insert_booking(
        &self,
        booking: NewBooking,
        debit: Option<WalletDebit>,
    ) -> Result<Booking, AppError>;

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError>;

    async fn find_booking_by_key(
        &self,
        passenger_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, AppError>;

    /// Bookings of a ride, oldest first.
    async fn list_ride_bookings(&self, ride_id: Uuid) -> Result<Vec<Booking>, AppError>;

    /// Bookings of a passenger, newest first.
    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, AppError>;

    /// Release the seat hold of a PENDING booking.
    ///
    /// The booking becomes CANCELLED with payment status FAILED, its seats go
    /// back to the ride (capped at `total_seats`) and a CREATED payment is
    /// marked FAILED. Returns `None` when the booking is no longer PENDING, so
    /// a hold is released at most once.
    async fn release_pending_booking(&self, booking_id: Uuid)
    -> Result<Option<Booking>, AppError>;

    /// Ids of PENDING bookings whose hold expired at or before `now`.
    async fn list_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;

    /// Cancel a BOOKED booking and release its seats in one unit.
    ///
    /// Wallet-paid bookings are credited back inside the same unit. Gateway
    /// paid bookings are marked REFUND_PENDING and returned as
    /// [`RefundPlan::Gateway`] for the caller to refund after commit. Either
    /// way the driver's earning for the booking is reversed in the unit.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`
    /// - `InvalidBookingState`: the booking is not BOOKED
    async fn cancel_booking(&self, booking_id: Uuid) -> Result<CancelCommit, AppError>;

    // Gateway payments

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, AppError>;

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn find_payment_by_order(&self, gateway_order_id: &str)
    -> Result<Option<Payment>, AppError>;

    async fn find_payment_for_booking(&self, booking_id: Uuid)
    -> Result<Option<Payment>, AppError>;

    /// Record a verified payment and commit its booking.
    ///
    /// Locks payment, booking and ride in that order. The booking is committed
    /// only while it is PENDING and its ride is OPEN; the driver's earning is
    /// credited in the same unit.
    ///
    /// # Errors
    ///
    /// - `UnknownOrder`: no payment exists for the order id
    async fn commit_verified_payment(
        &self,
        callback: VerifiedCallback,
    ) -> Result<VerifyCommit, AppError>;

    /// Record the gateway's answer to a refund request.
    ///
    /// Settled refunds move the booking to REFUNDED, failed ones to
    /// REFUND_FAILED. An already settled refund is left unchanged.
    async fn record_refund_outcome(
        &self,
        payment_id: Uuid,
        outcome: RefundOutcome,
    ) -> Result<Booking, AppError>;

    /// Payments whose refund is REQUESTED and untouched since `older_than`.
    async fn list_stalled_refunds(&self, older_than: DateTime<Utc>)
    -> Result<Vec<Payment>, AppError>;

    // Wallet

    /// Wallet of `owner_id`; a zero balance if none exists yet.
    async fn wallet_account(&self, owner_id: Uuid) -> Result<WalletAccount, AppError>;

    /// Wallet history of `owner_id`, newest first.
    async fn wallet_transactions(&self, owner_id: Uuid)
    -> Result<Vec<WalletTransaction>, AppError>;

    /// Insert a top-up, or return the existing one with the same key.
    async fn insert_topup(&self, topup: NewTopUp) -> Result<WalletTopUp, AppError>;

    async fn find_topup_by_key(&self, idempotency_key: &str)
    -> Result<Option<WalletTopUp>, AppError>;

    /// Complete a CREATED top-up; on success the wallet is credited with a
    /// TOPUP transaction in the same unit. Completed top-ups are returned
    /// unchanged.
    async fn complete_topup(
        &self,
        idempotency_key: &str,
        provider_payment_id: &str,
        success: bool,
    ) -> Result<WalletTopUp, AppError>;

    // Driver earnings

    /// Earnings totals of `driver_id`; all zero if nothing was earned yet.
    async fn driver_earnings(&self, driver_id: Uuid) -> Result<DriverEarnings, AppError>;

    /// Earning entries of `driver_id`, newest first.
    async fn earning_entries(&self, driver_id: Uuid) -> Result<Vec<EarningEntry>, AppError>;

    // Reconciliation

    /// Record an orphaned payment, or return the one already recorded for
    /// the same gateway order.
    async fn record_orphan(&self, orphan: NewOrphanedPayment)
    -> Result<OrphanedPayment, AppError>;

    async fn list_orphans(&self, include_resolved: bool)
    -> Result<Vec<OrphanedPayment>, AppError>;

    async fn resolve_orphan(&self, orphan_id: Uuid) -> Result<OrphanedPayment, AppError>;
}
