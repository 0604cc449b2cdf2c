//! In-memory ledger store.
//!
//! Every operation takes the single ledger mutex, validates, and only then
//! mutates, so each method is one atomic unit exactly like a database
//! transaction in [`super::PgLedgerStore`]. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::{Actor, ApiKey};
use crate::models::booking::{
    Booking, BookingPaymentStatus, BookingStatus, NewBooking, PaymentMethod,
};
use crate::models::earnings::{
    self, DriverEarnings, EarningEntry, EarningKind, EarningSplit,
};
use crate::models::payment::{NewPayment, Payment, PaymentStatus, RefundOutcome, RefundStatus};
use crate::models::reconciliation::{NewOrphanedPayment, OrphanedPayment};
use crate::models::ride::{NewRide, Ride, RideStatus};
use crate::models::wallet::{
    self, NewTopUp, TopUpStatus, WalletAccount, WalletDebit, WalletReason, WalletTopUp,
    WalletTransaction,
};
use crate::store::{CancelCommit, LedgerStore, RefundPlan, VerifiedCallback, VerifyCommit};

#[derive(Default)]
struct LedgerState {
    api_keys: HashMap<String, ApiKey>,
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<Uuid, Payment>,
    wallets: HashMap<Uuid, WalletAccount>,
    wallet_transactions: Vec<WalletTransaction>,
    topups: HashMap<Uuid, WalletTopUp>,
    earnings: HashMap<Uuid, DriverEarnings>,
    earning_entries: Vec<EarningEntry>,
    orphans: Vec<OrphanedPayment>,
}

impl LedgerState {
    /// Give seats back to a ride, never above its total.
    fn release_seats(&mut self, ride_id: Uuid, seats: i32, now: DateTime<Utc>) {
        if let Some(ride) = self.rides.get_mut(&ride_id) {
            let restored = ride.available_seats.saturating_add(seats);
            if restored > ride.total_seats {
                tracing::warn!(%ride_id, restored, total = ride.total_seats, "seat release capped at total");
            }
            ride.available_seats = restored.min(ride.total_seats);
            ride.updated_at = now;
        }
    }

    /// Append a signed wallet entry and move the balance with it.
    ///
    /// An entry whose key already exists is returned without moving money.
    fn post_wallet_entry(
        &mut self,
        owner_id: Uuid,
        amount_paise: i64,
        reason: WalletReason,
        booking_id: Option<Uuid>,
        idempotency_key: String,
        now: DateTime<Utc>,
    ) -> Result<WalletTransaction, AppError> {
        if let Some(existing) = self
            .wallet_transactions
            .iter()
            .find(|t| t.idempotency_key == idempotency_key)
        {
            return Ok(existing.clone());
        }

        let account = self.wallets.entry(owner_id).or_insert_with(|| WalletAccount {
            owner_id,
            balance_paise: 0,
            updated_at: now,
        });
        let balance = account
            .balance_paise
            .checked_add(amount_paise)
            .ok_or_else(|| AppError::Internal("wallet balance overflow".to_string()))?;
        if balance < 0 {
            return Err(AppError::InsufficientFunds {
                required: -amount_paise,
                balance: account.balance_paise,
            });
        }
        account.balance_paise = balance;
        account.updated_at = now;

        let entry = WalletTransaction {
            id: Uuid::new_v4(),
            owner_id,
            amount_paise,
            reason,
            booking_id,
            idempotency_key,
            created_at: now,
        };
        self.wallet_transactions.push(entry.clone());
        Ok(entry)
    }

    /// Append an earning entry and move the driver's totals with it.
    ///
    /// An entry whose key already exists is returned without moving money.
    fn post_earning(
        &mut self,
        driver_id: Uuid,
        booking_id: Uuid,
        kind: EarningKind,
        split: EarningSplit,
        idempotency_key: String,
        now: DateTime<Utc>,
    ) -> EarningEntry {
        if let Some(existing) = self
            .earning_entries
            .iter()
            .find(|e| e.idempotency_key == idempotency_key)
        {
            return existing.clone();
        }

        self.earnings
            .entry(driver_id)
            .or_insert_with(|| DriverEarnings::empty(driver_id, now))
            .apply(split, now);

        let entry = EarningEntry {
            id: Uuid::new_v4(),
            driver_id,
            booking_id,
            kind,
            gross_paise: split.gross_paise,
            commission_paise: split.commission_paise,
            net_paise: split.net_paise,
            idempotency_key,
            created_at: now,
        };
        self.earning_entries.push(entry.clone());
        entry
    }

    fn credit_earning(
        &mut self,
        driver_id: Uuid,
        booking_id: Uuid,
        gross_paise: i64,
        now: DateTime<Utc>,
    ) -> EarningEntry {
        self.post_earning(
            driver_id,
            booking_id,
            EarningKind::Credit,
            EarningSplit::of(gross_paise),
            earnings::earning_key(booking_id),
            now,
        )
    }

    /// Take back the earning of `booking_id`, if one was credited.
    fn reverse_earning(&mut self, booking_id: Uuid, now: DateTime<Utc>) -> Option<EarningEntry> {
        let credit_key = earnings::earning_key(booking_id);
        let credit = self
            .earning_entries
            .iter()
            .find(|e| e.idempotency_key == credit_key)
            .cloned()?;
        Some(self.post_earning(
            credit.driver_id,
            booking_id,
            EarningKind::Reversal,
            credit.split().negated(),
            earnings::reversal_key(booking_id),
            now,
        ))
    }

    fn payment_id_for_booking(&self, booking_id: Uuid) -> Option<Uuid> {
        self.payments
            .values()
            .find(|p| p.booking_id == Some(booking_id))
            .map(|p| p.id)
    }
}

/// Ledger held in process memory.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.lock().map(|_| ())
    }

    async fn find_actor_by_key_hash(&self, key_hash: &str) -> Result<Option<Actor>, AppError> {
        let state = self.lock()?;
        Ok(state
            .api_keys
            .get(key_hash)
            .filter(|k| k.is_active)
            .map(ApiKey::actor))
    }

    async fn register_api_key(&self, raw_key: &str, actor: Actor) -> Result<Actor, AppError> {
        let key_hash = ApiKey::hash(raw_key);
        let mut state = self.lock()?;
        let record = state
            .api_keys
            .entry(key_hash.clone())
            .or_insert_with(|| ApiKey {
                id: Uuid::new_v4(),
                key_hash,
                user_id: actor.user_id,
                role: actor.role,
                is_active: true,
                created_at: Utc::now(),
            });
        Ok(record.actor())
    }

    async fn insert_ride(&self, ride: NewRide) -> Result<Ride, AppError> {
        let now = Utc::now();
        let record = Ride {
            id: Uuid::new_v4(),
            owner_id: ride.owner_id,
            total_seats: ride.total_seats,
            available_seats: ride.total_seats,
            price_per_seat_paise: ride.price_per_seat_paise,
            status: RideStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.rides.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, AppError> {
        Ok(self.lock()?.rides.get(&ride_id).cloned())
    }

    async fn mark_ride_cancelled(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        let mut state = self.lock()?;
        let ride = state.rides.get_mut(&ride_id).ok_or(AppError::RideNotFound)?;
        if ride.status != RideStatus::Cancelled {
            ride.status = RideStatus::Cancelled;
            ride.updated_at = Utc::now();
        }
        Ok(ride.clone())
    }

    async fn reserve_and_insert_booking(
        &self,
        booking: NewBooking,
        debit: Option<WalletDebit>,
    ) -> Result<Booking, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        if let Some(key) = booking.idempotency_key.as_deref() {
            if let Some(existing) = state.bookings.values().find(|b| {
                b.passenger_id == booking.passenger_id && b.idempotency_key.as_deref() == Some(key)
            }) {
                return Ok(existing.clone());
            }
        }

        let ride = state
            .rides
            .get_mut(&booking.ride_id)
            .ok_or(AppError::RideNotFound)?;
        if !ride.is_open() {
            return Err(AppError::RideNotOpen);
        }
        let driver_id = ride.owner_id;
        if ride.available_seats < booking.seats {
            return Err(AppError::InsufficientSeats {
                requested: booking.seats,
                available: ride.available_seats,
            });
        }
        if let Some(debit) = &debit {
            let balance = state
                .wallets
                .get(&debit.owner_id)
                .map_or(0, |w| w.balance_paise);
            if balance < debit.amount_paise {
                return Err(AppError::InsufficientFunds {
                    required: debit.amount_paise,
                    balance,
                });
            }
        }

        let now = Utc::now();
        ride.available_seats -= booking.seats;
        ride.updated_at = now;

        let record = Booking {
            id: booking.id,
            ride_id: booking.ride_id,
            passenger_id: booking.passenger_id,
            seats: booking.seats,
            payment_method: booking.payment_method,
            status: booking.status,
            payment_status: booking.payment_status,
            amount_paise: booking.amount_paise,
            hold_expires_at: booking.hold_expires_at,
            idempotency_key: booking.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        state.bookings.insert(record.id, record.clone());

        if let Some(debit) = debit {
            state.post_wallet_entry(
                debit.owner_id,
                -debit.amount_paise,
                WalletReason::DebitBooking,
                Some(record.id),
                debit.idempotency_key,
                now,
            )?;
            state.credit_earning(driver_id, record.id, debit.amount_paise, now);
        }

        Ok(record)
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.lock()?.bookings.get(&booking_id).cloned())
    }

    async fn find_booking_by_key(
        &self,
        passenger_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, AppError> {
        let state = self.lock()?;
        Ok(state
            .bookings
            .values()
            .find(|b| {
                b.passenger_id == passenger_id
                    && b.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .cloned())
    }

    async fn list_ride_bookings(&self, ride_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let state = self.lock()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.ride_id == ride_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let state = self.lock()?;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.passenger_id == passenger_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn release_pending_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Booking>, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let now = Utc::now();

        let booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(AppError::BookingNotFound)?;
        if booking.status != BookingStatus::Pending {
            return Ok(None);
        }
        booking.status = BookingStatus::Cancelled;
        booking.payment_status = BookingPaymentStatus::Failed;
        booking.updated_at = now;
        let released = booking.clone();

        state.release_seats(released.ride_id, released.seats, now);
        for payment in state.payments.values_mut() {
            if payment.booking_id == Some(booking_id) && payment.status == PaymentStatus::Created {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = now;
            }
        }

        Ok(Some(released))
    }

    async fn list_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let state = self.lock()?;
        Ok(state
            .bookings
            .values()
            .filter(|b| b.hold_expired(now))
            .map(|b| b.id)
            .collect())
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> Result<CancelCommit, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let booking = state
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(AppError::BookingNotFound)?;
        if booking.status != BookingStatus::Booked {
            return Err(AppError::InvalidBookingState {
                booking_id,
                status: booking.status,
            });
        }

        let gateway_payment = match (booking.payment_method, booking.payment_status) {
            (PaymentMethod::Online, BookingPaymentStatus::Paid) => Some(
                state
                    .payment_id_for_booking(booking_id)
                    .ok_or_else(|| {
                        AppError::Internal(format!("paid booking {booking_id} has no payment"))
                    })?,
            ),
            _ => None,
        };

        let now = Utc::now();
        let (payment_status, refund) = match (booking.payment_method, booking.payment_status) {
            (PaymentMethod::Wallet, BookingPaymentStatus::Paid) => {
                let transaction = state.post_wallet_entry(
                    booking.passenger_id,
                    booking.amount_paise,
                    WalletReason::CreditRefund,
                    Some(booking_id),
                    wallet::refund_key(booking_id),
                    now,
                )?;
                (
                    BookingPaymentStatus::Refunded,
                    RefundPlan::WalletCredited {
                        amount_paise: booking.amount_paise,
                        transaction,
                    },
                )
            }
            (PaymentMethod::Online, BookingPaymentStatus::Paid) => {
                let payment_id = gateway_payment
                    .ok_or_else(|| AppError::Internal("payment vanished".to_string()))?;
                let payment = state
                    .payments
                    .get_mut(&payment_id)
                    .ok_or(AppError::PaymentNotFound)?;
                payment.refund_status = Some(RefundStatus::Requested);
                payment.updated_at = now;
                (
                    BookingPaymentStatus::RefundPending,
                    RefundPlan::Gateway {
                        payment: payment.clone(),
                    },
                )
            }
            (PaymentMethod::Cash, _) => (BookingPaymentStatus::NoPayment, RefundPlan::None),
            (_, unchanged) => (unchanged, RefundPlan::None),
        };

        let record = state
            .bookings
            .get_mut(&booking_id)
            .ok_or(AppError::BookingNotFound)?;
        record.status = BookingStatus::Cancelled;
        record.payment_status = payment_status;
        record.updated_at = now;
        let cancelled = record.clone();

        state.release_seats(cancelled.ride_id, cancelled.seats, now);
        let reversed_earning = state.reverse_earning(booking_id, now);

        Ok(CancelCommit {
            booking: cancelled,
            refund,
            reversed_earning,
        })
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, AppError> {
        let mut state = self.lock()?;
        if state
            .payments
            .values()
            .any(|p| p.gateway_order_id == payment.gateway_order_id)
        {
            return Err(AppError::Internal(format!(
                "duplicate gateway order {}",
                payment.gateway_order_id
            )));
        }

        let now = Utc::now();
        let record = Payment {
            id: Uuid::new_v4(),
            booking_id: Some(payment.booking_id),
            ride_id: payment.ride_id,
            payer_id: payment.payer_id,
            amount_paise: payment.amount_paise,
            currency: payment.currency,
            gateway_order_id: payment.gateway_order_id,
            gateway_payment_id: None,
            gateway_signature: None,
            status: PaymentStatus::Created,
            refund_status: None,
            gateway_refund_id: None,
            refund_error: None,
            created_at: now,
            verified_at: None,
            updated_at: now,
        };
        state.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.lock()?.payments.get(&payment_id).cloned())
    }

    async fn find_payment_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.lock()?;
        Ok(state
            .payments
            .values()
            .find(|p| p.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn find_payment_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.lock()?;
        Ok(state
            .payment_id_for_booking(booking_id)
            .and_then(|id| state.payments.get(&id))
            .cloned())
    }

    async fn commit_verified_payment(
        &self,
        callback: VerifiedCallback,
    ) -> Result<VerifyCommit, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let now = Utc::now();

        let payment = state
            .payments
            .values_mut()
            .find(|p| p.gateway_order_id == callback.gateway_order_id)
            .ok_or_else(|| AppError::UnknownOrder(callback.gateway_order_id.clone()))?;

        if payment.status == PaymentStatus::Verified {
            let payment = payment.clone();
            let booking = payment
                .booking_id
                .and_then(|id| state.bookings.get(&id))
                .cloned();
            if payment.gateway_payment_id.as_deref() == Some(callback.gateway_payment_id.as_str())
            {
                return Ok(VerifyCommit::Replayed { payment, booking });
            }
            let reason = format!(
                "order already settled by payment {}",
                payment.gateway_payment_id.as_deref().unwrap_or("unknown")
            );
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking,
                reason,
            });
        }

        payment.status = PaymentStatus::Verified;
        payment.gateway_payment_id = Some(callback.gateway_payment_id);
        payment.gateway_signature = Some(callback.gateway_signature);
        payment.verified_at = Some(now);
        payment.updated_at = now;
        let payment = payment.clone();

        let linked = match payment.booking_id {
            Some(id) => state.bookings.get_mut(&id),
            None => None,
        };
        let Some(booking) = linked else {
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: None,
                reason: "payment has no booking".to_string(),
            });
        };

        if booking.status != BookingStatus::Pending {
            let reason = format!("booking {} is {}", booking.id, booking.status);
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: Some(booking.clone()),
                reason,
            });
        }

        let ride = state
            .rides
            .get(&booking.ride_id)
            .ok_or(AppError::RideNotFound)?;
        if !ride.is_open() {
            let reason = format!("ride {} is {}", ride.id, ride.status);
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: Some(booking.clone()),
                reason,
            });
        }
        let driver_id = ride.owner_id;

        booking.status = BookingStatus::Booked;
        booking.payment_status = BookingPaymentStatus::Paid;
        booking.hold_expires_at = None;
        booking.updated_at = now;
        let booking = booking.clone();

        let earning = state.credit_earning(driver_id, booking.id, payment.amount_paise, now);

        Ok(VerifyCommit::Committed {
            payment,
            booking,
            earning,
        })
    }

    async fn record_refund_outcome(
        &self,
        payment_id: Uuid,
        outcome: RefundOutcome,
    ) -> Result<Booking, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let now = Utc::now();

        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or(AppError::PaymentNotFound)?;
        let linked = match payment.booking_id {
            Some(id) => state.bookings.get_mut(&id),
            None => None,
        };
        let booking = linked
            .ok_or_else(|| AppError::Internal(format!("payment {payment_id} has no booking")))?;

        if payment.refund_status == Some(RefundStatus::Settled) {
            return Ok(booking.clone());
        }

        match outcome {
            RefundOutcome::Settled { gateway_refund_id } => {
                payment.refund_status = Some(RefundStatus::Settled);
                payment.gateway_refund_id = Some(gateway_refund_id);
                payment.refund_error = None;
                booking.payment_status = BookingPaymentStatus::Refunded;
            }
            RefundOutcome::Failed { reason } => {
                payment.refund_status = Some(RefundStatus::Failed);
                payment.refund_error = Some(reason);
                booking.payment_status = BookingPaymentStatus::RefundFailed;
            }
        }
        payment.updated_at = now;
        booking.updated_at = now;

        Ok(booking.clone())
    }

    async fn list_stalled_refunds(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError> {
        let state = self.lock()?;
        Ok(state
            .payments
            .values()
            .filter(|p| p.refund_status == Some(RefundStatus::Requested))
            .filter(|p| p.updated_at <= older_than)
            .cloned()
            .collect())
    }

    async fn wallet_account(&self, owner_id: Uuid) -> Result<WalletAccount, AppError> {
        let state = self.lock()?;
        Ok(state
            .wallets
            .get(&owner_id)
            .cloned()
            .unwrap_or_else(|| WalletAccount {
                owner_id,
                balance_paise: 0,
                updated_at: Utc::now(),
            }))
    }

    async fn wallet_transactions(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let state = self.lock()?;
        let mut entries: Vec<WalletTransaction> = state
            .wallet_transactions
            .iter()
            .rev()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn insert_topup(&self, topup: NewTopUp) -> Result<WalletTopUp, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .topups
            .values()
            .find(|t| t.idempotency_key == topup.idempotency_key)
        {
            return Ok(existing.clone());
        }

        let record = WalletTopUp {
            id: Uuid::new_v4(),
            owner_id: topup.owner_id,
            amount_paise: topup.amount_paise,
            currency: topup.currency,
            provider: topup.provider,
            provider_payment_id: None,
            status: TopUpStatus::Created,
            idempotency_key: topup.idempotency_key,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.topups.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_topup_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WalletTopUp>, AppError> {
        let state = self.lock()?;
        Ok(state
            .topups
            .values()
            .find(|t| t.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn complete_topup(
        &self,
        idempotency_key: &str,
        provider_payment_id: &str,
        success: bool,
    ) -> Result<WalletTopUp, AppError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let now = Utc::now();

        let topup = state
            .topups
            .values()
            .find(|t| t.idempotency_key == idempotency_key)
            .cloned()
            .ok_or(AppError::TopUpNotFound)?;
        if topup.status != TopUpStatus::Created {
            return Ok(topup);
        }

        if success {
            state.post_wallet_entry(
                topup.owner_id,
                topup.amount_paise,
                WalletReason::Topup,
                None,
                wallet::topup_key(topup.id),
                now,
            )?;
        }

        let record = state
            .topups
            .get_mut(&topup.id)
            .ok_or(AppError::TopUpNotFound)?;
        record.status = if success {
            TopUpStatus::Succeeded
        } else {
            TopUpStatus::Failed
        };
        record.provider_payment_id = Some(provider_payment_id.to_string());
        record.completed_at = Some(now);
        Ok(record.clone())
    }

    async fn driver_earnings(&self, driver_id: Uuid) -> Result<DriverEarnings, AppError> {
        let state = self.lock()?;
        Ok(state
            .earnings
            .get(&driver_id)
            .cloned()
            .unwrap_or_else(|| DriverEarnings::empty(driver_id, Utc::now())))
    }

    async fn earning_entries(&self, driver_id: Uuid) -> Result<Vec<EarningEntry>, AppError> {
        let state = self.lock()?;
        let mut entries: Vec<EarningEntry> = state
            .earning_entries
            .iter()
            .rev()
            .filter(|e| e.driver_id == driver_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn record_orphan(
        &self,
        orphan: NewOrphanedPayment,
    ) -> Result<OrphanedPayment, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .orphans
            .iter()
            .find(|o| o.gateway_order_id == orphan.gateway_order_id)
        {
            return Ok(existing.clone());
        }

        let record = OrphanedPayment {
            id: Uuid::new_v4(),
            payment_id: orphan.payment_id,
            booking_id: orphan.booking_id,
            gateway_order_id: orphan.gateway_order_id,
            gateway_payment_id: orphan.gateway_payment_id,
            amount_paise: orphan.amount_paise,
            reason: orphan.reason,
            resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        };
        state.orphans.push(record.clone());
        Ok(record)
    }

    async fn list_orphans(&self, include_resolved: bool) -> Result<Vec<OrphanedPayment>, AppError> {
        let state = self.lock()?;
        let mut orphans: Vec<OrphanedPayment> = state
            .orphans
            .iter()
            .rev()
            .filter(|o| include_resolved || !o.resolved)
            .cloned()
            .collect();
        orphans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orphans)
    }

    async fn resolve_orphan(&self, orphan_id: Uuid) -> Result<OrphanedPayment, AppError> {
        let mut state = self.lock()?;
        let orphan = state
            .orphans
            .iter_mut()
            .find(|o| o.id == orphan_id)
            .ok_or(AppError::OrphanNotFound)?;
        if !orphan.resolved {
            orphan.resolved = true;
            orphan.resolved_at = Some(Utc::now());
        }
        Ok(orphan.clone())
    }
}
