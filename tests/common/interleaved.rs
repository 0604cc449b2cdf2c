//! Ledger wrapper that lets a gateway callback land in the middle of a ride
//! cancellation.
//!
//! Every method delegates to a [`MemoryLedgerStore`]. A callback armed with
//! [`InterleavedStore::commit_after_listing`] is committed right after the
//! ride's bookings are listed; one armed with
//! [`InterleavedStore::commit_before_cancel`] is committed just before the ride
//! is marked cancelled, and the listing that follows is the one taken before
//! that commit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ride_booking_engine::error::AppError;
use ride_booking_engine::models::actor::Actor;
use ride_booking_engine::models::booking::{Booking, NewBooking};
use ride_booking_engine::models::earnings::{DriverEarnings, EarningEntry};
use ride_booking_engine::models::payment::{NewPayment, Payment, RefundOutcome};
use ride_booking_engine::models::reconciliation::{NewOrphanedPayment, OrphanedPayment};
use ride_booking_engine::models::ride::{NewRide, Ride};
use ride_booking_engine::models::wallet::{
    NewTopUp, WalletAccount, WalletDebit, WalletTopUp, WalletTransaction,
};
use ride_booking_engine::store::{
    CancelCommit, LedgerStore, MemoryLedgerStore, VerifiedCallback, VerifyCommit,
};

#[derive(Default)]
pub struct InterleavedStore {
    inner: MemoryLedgerStore,
    after_listing: Mutex<Option<VerifiedCallback>>,
    before_cancel: Mutex<Option<VerifiedCallback>>,
    stale_listing: Mutex<Option<Vec<Booking>>>,
    commits: Mutex<Vec<VerifyCommit>>,
}

impl InterleavedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commit_after_listing(&self, callback: VerifiedCallback) {
        *self.after_listing.lock().unwrap() = Some(callback);
    }

    pub fn commit_before_cancel(&self, callback: VerifiedCallback) {
        *self.before_cancel.lock().unwrap() = Some(callback);
    }

    /// Outcomes of the commits run in between.
    pub fn commits(&self) -> Vec<VerifyCommit> {
        self.commits.lock().unwrap().clone()
    }

    async fn commit(&self, callback: VerifiedCallback) -> Result<(), AppError> {
        let outcome = self.inner.commit_verified_payment(callback).await?;
        self.commits.lock().unwrap().push(outcome);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InterleavedStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.inner.ping().await
    }

    async fn find_actor_by_key_hash(&self, key_hash: &str) -> Result<Option<Actor>, AppError> {
        self.inner.find_actor_by_key_hash(key_hash).await
    }

    async fn register_api_key(&self, raw_key: &str, actor: Actor) -> Result<Actor, AppError> {
        self.inner.register_api_key(raw_key, actor).await
    }

    async fn insert_ride(&self, ride: NewRide) -> Result<Ride, AppError> {
        self.inner.insert_ride(ride).await
    }

    async fn find_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, AppError> {
        self.inner.find_ride(ride_id).await
    }

    async fn mark_ride_cancelled(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        let armed = self.before_cancel.lock().unwrap().take();
        if let Some(callback) = armed {
            let listing = self.inner.list_ride_bookings(ride_id).await?;
            self.commit(callback).await?;
            *self.stale_listing.lock().unwrap() = Some(listing);
        }
        self.inner.mark_ride_cancelled(ride_id).await
    }

    async fn reserve_and_insert_booking(
        &self,
        booking: NewBooking,
        debit: Option<WalletDebit>,
    ) -> Result<Booking, AppError> {
        self.inner.reserve_and_insert_booking(booking, debit).await
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        self.inner.find_booking(booking_id).await
    }

    async fn find_booking_by_key(
        &self,
        passenger_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, AppError> {
        self.inner
            .find_booking_by_key(passenger_id, idempotency_key)
            .await
    }

    async fn list_ride_bookings(&self, ride_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let stale = self.stale_listing.lock().unwrap().take();
        if let Some(listing) = stale {
            return Ok(listing);
        }

        let listing = self.inner.list_ride_bookings(ride_id).await?;
        let armed = self.after_listing.lock().unwrap().take();
        if let Some(callback) = armed {
            self.commit(callback).await?;
        }
        Ok(listing)
    }

    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, AppError> {
        self.inner.list_passenger_bookings(passenger_id).await
    }

    async fn release_pending_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Booking>, AppError> {
        self.inner.release_pending_booking(booking_id).await
    }

    async fn list_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        self.inner.list_expired_holds(now).await
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> Result<CancelCommit, AppError> {
        self.inner.cancel_booking(booking_id).await
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, AppError> {
        self.inner.insert_payment(payment).await
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        self.inner.find_payment(payment_id).await
    }

    async fn find_payment_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        self.inner.find_payment_by_order(gateway_order_id).await
    }

    async fn find_payment_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        self.inner.find_payment_for_booking(booking_id).await
    }

    async fn commit_verified_payment(
        &self,
        callback: VerifiedCallback,
    ) -> Result<VerifyCommit, AppError> {
        self.inner.commit_verified_payment(callback).await
    }

    async fn record_refund_outcome(
        &self,
        payment_id: Uuid,
        outcome: RefundOutcome,
    ) -> Result<Booking, AppError> {
        self.inner.record_refund_outcome(payment_id, outcome).await
    }

    async fn list_stalled_refunds(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError> {
        self.inner.list_stalled_refunds(older_than).await
    }

    async fn wallet_account(&self, owner_id: Uuid) -> Result<WalletAccount, AppError> {
        self.inner.wallet_account(owner_id).await
    }

    async fn wallet_transactions(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        self.inner.wallet_transactions(owner_id).await
    }

    async fn insert_topup(&self, topup: NewTopUp) -> Result<WalletTopUp, AppError> {
        self.inner.insert_topup(topup).await
    }

    async fn find_topup_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WalletTopUp>, AppError> {
        self.inner.find_topup_by_key(idempotency_key).await
    }

    async fn complete_topup(
        &self,
        idempotency_key: &str,
        provider_payment_id: &str,
        success: bool,
    ) -> Result<WalletTopUp, AppError> {
        self.inner
            .complete_topup(idempotency_key, provider_payment_id, success)
            .await
    }

    async fn driver_earnings(&self, driver_id: Uuid) -> Result<DriverEarnings, AppError> {
        self.inner.driver_earnings(driver_id).await
    }

    async fn earning_entries(&self, driver_id: Uuid) -> Result<Vec<EarningEntry>, AppError> {
        self.inner.earning_entries(driver_id).await
    }

    async fn record_orphan(
        &self,
        orphan: NewOrphanedPayment,
    ) -> Result<OrphanedPayment, AppError> {
        self.inner.record_orphan(orphan).await
    }

    async fn list_orphans(
        &self,
        include_resolved: bool,
    ) -> Result<Vec<OrphanedPayment>, AppError> {
        self.inner.list_orphans(include_resolved).await
    }

    async fn resolve_orphan(&self, orphan_id: Uuid) -> Result<OrphanedPayment, AppError> {
        self.inner.resolve_orphan(orphan_id).await
    }
}
