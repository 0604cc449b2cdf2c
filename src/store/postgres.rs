//! PostgreSQL ledger store.
//!
//! # Atomicity Guarantees
//!
//! Every multi-record operation runs inside one PostgreSQL transaction.
//! Seat reservation is a conditional `UPDATE ... WHERE available_seats >= $n`,
//! so racing bookings can never take the counter below zero; the table's
//! CHECK constraint backs this up.
//!
//! # Lock Ordering
//!
//! Row locks are always taken payment → booking → ride → wallet → driver
//! earnings. Verification, cancellation and ride cancellation of the same
//! booking therefore queue behind each other instead of deadlocking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::db::DbPool;
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

type PgTx<'a> = Transaction<'a, Postgres>;

// Row types mirror the tables; status columns arrive as text and are parsed
// into the closed enums on the way out.

#[derive(FromRow)]
struct ApiKeyRow {
    id: Uuid,
    key_hash: String,
    user_id: Uuid,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = AppError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            key_hash: row.key_hash,
            user_id: row.user_id,
            role: row.role.parse()?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RideRow {
    id: Uuid,
    owner_id: Uuid,
    total_seats: i32,
    available_seats: i32,
    price_per_seat_paise: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RideRow> for Ride {
    type Error = AppError;

    fn try_from(row: RideRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            price_per_seat_paise: row.price_per_seat_paise,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    seats: i32,
    payment_method: String,
    status: String,
    payment_status: String,
    amount_paise: i64,
    hold_expires_at: Option<DateTime<Utc>>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = AppError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            ride_id: row.ride_id,
            passenger_id: row.passenger_id,
            seats: row.seats,
            payment_method: row.payment_method.parse()?,
            status: row.status.parse()?,
            payment_status: row.payment_status.parse()?,
            amount_paise: row.amount_paise,
            hold_expires_at: row.hold_expires_at,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Option<Uuid>,
    ride_id: Uuid,
    payer_id: Uuid,
    amount_paise: i64,
    currency: String,
    gateway_order_id: String,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    status: String,
    refund_status: Option<String>,
    gateway_refund_id: Option<String>,
    refund_error: Option<String>,
    created_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            booking_id: row.booking_id,
            ride_id: row.ride_id,
            payer_id: row.payer_id,
            amount_paise: row.amount_paise,
            currency: row.currency,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            gateway_signature: row.gateway_signature,
            status: row.status.parse()?,
            refund_status: row
                .refund_status
                .map(|s| s.parse::<RefundStatus>())
                .transpose()?,
            gateway_refund_id: row.gateway_refund_id,
            refund_error: row.refund_error,
            created_at: row.created_at,
            verified_at: row.verified_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct WalletTransactionRow {
    id: Uuid,
    owner_id: Uuid,
    amount_paise: i64,
    reason: String,
    booking_id: Option<Uuid>,
    idempotency_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<WalletTransactionRow> for WalletTransaction {
    type Error = AppError;

    fn try_from(row: WalletTransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            amount_paise: row.amount_paise,
            reason: row.reason.parse()?,
            booking_id: row.booking_id,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TopUpRow {
    id: Uuid,
    owner_id: Uuid,
    amount_paise: i64,
    currency: String,
    provider: String,
    provider_payment_id: Option<String>,
    status: String,
    idempotency_key: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TopUpRow> for WalletTopUp {
    type Error = AppError;

    fn try_from(row: TopUpRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            amount_paise: row.amount_paise,
            currency: row.currency,
            provider: row.provider,
            provider_payment_id: row.provider_payment_id,
            status: row.status.parse()?,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(FromRow)]
struct EarningEntryRow {
    id: Uuid,
    driver_id: Uuid,
    booking_id: Uuid,
    kind: String,
    gross_paise: i64,
    commission_paise: i64,
    net_paise: i64,
    idempotency_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EarningEntryRow> for EarningEntry {
    type Error = AppError;

    fn try_from(row: EarningEntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            driver_id: row.driver_id,
            booking_id: row.booking_id,
            kind: row.kind.parse()?,
            gross_paise: row.gross_paise,
            commission_paise: row.commission_paise,
            net_paise: row.net_paise,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

/// Ledger backed by a PostgreSQL pool.
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Lock a booking row for the rest of the transaction.
async fn lock_booking(tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
    sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(Booking::try_from)
        .transpose()
}

/// Give seats back to a ride, never above its total.
async fn release_seats(tx: &mut PgTx<'_>, ride_id: Uuid, seats: i32) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE rides
        SET available_seats = LEAST(available_seats + $1, total_seats),
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(seats)
    .bind(ride_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Add `amount_paise` to a wallet, creating it on first credit.
async fn credit_wallet(tx: &mut PgTx<'_>, owner_id: Uuid, amount_paise: i64) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO wallet_accounts (owner_id, balance_paise)
        VALUES ($1, $2)
        ON CONFLICT (owner_id) DO UPDATE
        SET balance_paise = wallet_accounts.balance_paise + EXCLUDED.balance_paise,
            updated_at = NOW()
        "#,
    )
    .bind(owner_id)
    .bind(amount_paise)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Record the wallet transaction explaining a balance change.
async fn insert_wallet_entry(
    tx: &mut PgTx<'_>,
    owner_id: Uuid,
    amount_paise: i64,
    reason: WalletReason,
    booking_id: Option<Uuid>,
    idempotency_key: &str,
) -> Result<WalletTransaction, AppError> {
    sqlx::query_as::<_, WalletTransactionRow>(
        r#"
        INSERT INTO wallet_transactions (owner_id, amount_paise, reason, booking_id, idempotency_key)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(amount_paise)
    .bind(reason.as_str())
    .bind(booking_id)
    .bind(idempotency_key)
    .fetch_one(&mut **tx)
    .await?
    .try_into()
}

/// Record an earning entry and move the driver's totals with it.
///
/// An entry whose key already exists is returned without moving money.
async fn post_earning(
    tx: &mut PgTx<'_>,
    driver_id: Uuid,
    booking_id: Uuid,
    kind: EarningKind,
    split: EarningSplit,
    idempotency_key: &str,
) -> Result<EarningEntry, AppError> {
    let inserted = sqlx::query_as::<_, EarningEntryRow>(
        r#"
        INSERT INTO driver_earning_entries (
            driver_id,
            booking_id,
            kind,
            gross_paise,
            commission_paise,
            net_paise,
            idempotency_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (idempotency_key) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(driver_id)
    .bind(booking_id)
    .bind(kind.as_str())
    .bind(split.gross_paise)
    .bind(split.commission_paise)
    .bind(split.net_paise)
    .bind(idempotency_key)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = inserted else {
        return sqlx::query_as::<_, EarningEntryRow>(
            "SELECT * FROM driver_earning_entries WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_one(&mut **tx)
        .await?
        .try_into();
    };

    sqlx::query(
        r#"
        INSERT INTO driver_earnings (
            driver_id,
            total_earnings_paise,
            pending_payout_paise,
            platform_commission_paise
        )
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (driver_id) DO UPDATE
        SET total_earnings_paise = driver_earnings.total_earnings_paise + EXCLUDED.total_earnings_paise,
            pending_payout_paise = driver_earnings.pending_payout_paise + EXCLUDED.pending_payout_paise,
            platform_commission_paise =
                driver_earnings.platform_commission_paise + EXCLUDED.platform_commission_paise,
            updated_at = NOW()
        "#,
    )
    .bind(driver_id)
    .bind(split.gross_paise)
    .bind(split.net_paise)
    .bind(split.commission_paise)
    .execute(&mut **tx)
    .await?;

    row.try_into()
}

async fn credit_earning(
    tx: &mut PgTx<'_>,
    driver_id: Uuid,
    booking_id: Uuid,
    gross_paise: i64,
) -> Result<EarningEntry, AppError> {
    post_earning(
        tx,
        driver_id,
        booking_id,
        EarningKind::Credit,
        EarningSplit::of(gross_paise),
        &earnings::earning_key(booking_id),
    )
    .await
}

/// Take back the earning of `booking_id`, if one was credited.
async fn reverse_earning(
    tx: &mut PgTx<'_>,
    booking_id: Uuid,
) -> Result<Option<EarningEntry>, AppError> {
    let credit = sqlx::query_as::<_, EarningEntryRow>(
        "SELECT * FROM driver_earning_entries WHERE idempotency_key = $1",
    )
    .bind(earnings::earning_key(booking_id))
    .fetch_optional(&mut **tx)
    .await?
    .map(EarningEntry::try_from)
    .transpose()?;

    let Some(credit) = credit else {
        return Ok(None);
    };
    let reversal = post_earning(
        tx,
        credit.driver_id,
        booking_id,
        EarningKind::Reversal,
        credit.split().negated(),
        &earnings::reversal_key(booking_id),
    )
    .await?;
    Ok(Some(reversal))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_actor_by_key_hash(&self, key_hash: &str) -> Result<Option<Actor>, AppError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT * FROM api_keys WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ApiKey::try_from(row)?.actor())),
            None => Ok(None),
        }
    }

    async fn register_api_key(&self, raw_key: &str, actor: Actor) -> Result<Actor, AppError> {
        let key_hash = ApiKey::hash(raw_key);
        sqlx::query(
            r#"
            INSERT INTO api_keys (key_hash, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (key_hash) DO NOTHING
            "#,
        )
        .bind(&key_hash)
        .bind(actor.user_id)
        .bind(actor.role.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, ApiKeyRow>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(&key_hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(ApiKey::try_from(row)?.actor())
    }

    async fn insert_ride(&self, ride: NewRide) -> Result<Ride, AppError> {
        sqlx::query_as::<_, RideRow>(
            r#"
            INSERT INTO rides (owner_id, total_seats, available_seats, price_per_seat_paise)
            VALUES ($1, $2, $2, $3)
            RETURNING *
            "#,
        )
        .bind(ride.owner_id)
        .bind(ride.total_seats)
        .bind(ride.price_per_seat_paise)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_ride(&self, ride_id: Uuid) -> Result<Option<Ride>, AppError> {
        sqlx::query_as::<_, RideRow>("SELECT * FROM rides WHERE id = $1")
            .bind(ride_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Ride::try_from)
            .transpose()
    }

    async fn mark_ride_cancelled(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        sqlx::query_as::<_, RideRow>(
            "UPDATE rides SET status = 'CANCELLED', updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(ride_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::RideNotFound)?
        .try_into()
    }

    async fn reserve_and_insert_booking(
        &self,
        booking: NewBooking,
        debit: Option<WalletDebit>,
    ) -> Result<Booking, AppError> {
        if let Some(key) = booking.idempotency_key.as_deref() {
            if let Some(existing) = self.find_booking_by_key(booking.passenger_id, key).await? {
                return Ok(existing);
            }
        }

        let mut tx = self.pool.begin().await?;

        // Conditional decrement: no row comes back unless the seats are there
        let reserved = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE rides
            SET available_seats = available_seats - $1,
                updated_at = NOW()
            WHERE id = $2 AND status = 'OPEN' AND available_seats >= $1
            RETURNING owner_id
            "#,
        )
        .bind(booking.seats)
        .bind(booking.ride_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(driver_id) = reserved else {
            let ride = sqlx::query_as::<_, RideRow>("SELECT * FROM rides WHERE id = $1")
                .bind(booking.ride_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(Ride::try_from)
                .transpose()?;
            tx.rollback().await?;

            return Err(match ride {
                None => AppError::RideNotFound,
                Some(ride) if ride.status != RideStatus::Open => AppError::RideNotOpen,
                Some(ride) => AppError::InsufficientSeats {
                    requested: booking.seats,
                    available: ride.available_seats,
                },
            });
        };

        if let Some(debit) = &debit {
            let balance: i64 = sqlx::query_scalar(
                "SELECT balance_paise FROM wallet_accounts WHERE owner_id = $1 FOR UPDATE",
            )
            .bind(debit.owner_id)
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or(0);

            // Rolling back also returns the seats taken above
            if balance < debit.amount_paise {
                tx.rollback().await?;
                return Err(AppError::InsufficientFunds {
                    required: debit.amount_paise,
                    balance,
                });
            }
        }

        let inserted = sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO bookings (
                id,
                ride_id,
                passenger_id,
                seats,
                payment_method,
                status,
                payment_status,
                amount_paise,
                hold_expires_at,
                idempotency_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(booking.ride_id)
        .bind(booking.passenger_id)
        .bind(booking.seats)
        .bind(booking.payment_method.as_str())
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.amount_paise)
        .bind(booking.hold_expires_at)
        .bind(booking.idempotency_key.as_deref())
        .fetch_one(&mut *tx)
        .await;

        let record: Booking = match inserted {
            Ok(row) => row.try_into()?,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent submit with the same key won the race
                tx.rollback().await?;
                let key = booking.idempotency_key.as_deref().unwrap_or_default();
                return self
                    .find_booking_by_key(booking.passenger_id, key)
                    .await?
                    .ok_or_else(|| AppError::Internal("duplicate booking vanished".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(debit) = debit {
            sqlx::query(
                r#"
                UPDATE wallet_accounts
                SET balance_paise = balance_paise - $1,
                    updated_at = NOW()
                WHERE owner_id = $2
                "#,
            )
            .bind(debit.amount_paise)
            .bind(debit.owner_id)
            .execute(&mut *tx)
            .await?;

            insert_wallet_entry(
                &mut tx,
                debit.owner_id,
                -debit.amount_paise,
                WalletReason::DebitBooking,
                Some(record.id),
                &debit.idempotency_key,
            )
            .await?;

            credit_earning(&mut tx, driver_id, record.id, debit.amount_paise).await?;
        }

        tx.commit().await?;

        Ok(record)
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn find_booking_by_key(
        &self,
        passenger_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE passenger_id = $1 AND idempotency_key = $2",
        )
        .bind(passenger_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?
        .map(Booking::try_from)
        .transpose()
    }

    async fn list_ride_bookings(&self, ride_id: Uuid) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE ride_id = $1 ORDER BY created_at ASC",
        )
        .bind(ride_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
    }

    async fn list_passenger_bookings(&self, passenger_id: Uuid) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings WHERE passenger_id = $1 ORDER BY created_at DESC",
        )
        .bind(passenger_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
    }

    async fn release_pending_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Booking>, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM payments WHERE booking_id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_all(&mut *tx)
            .await?;

        let Some(booking) = lock_booking(&mut tx, booking_id).await? else {
            tx.rollback().await?;
            return Err(AppError::BookingNotFound);
        };
        if booking.status != BookingStatus::Pending {
            tx.rollback().await?;
            return Ok(None);
        }

        let released: Booking = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = 'CANCELLED',
                payment_status = 'FAILED',
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        release_seats(&mut tx, released.ride_id, released.seats).await?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = 'FAILED',
                updated_at = NOW()
            WHERE booking_id = $1 AND status = 'CREATED'
            "#,
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(released))
    }

    async fn list_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM bookings WHERE status = 'PENDING' AND hold_expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn cancel_booking(&self, booking_id: Uuid) -> Result<CancelCommit, AppError> {
        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE booking_id = $1 AND status = 'VERIFIED' FOR UPDATE",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Payment::try_from)
        .transpose()?;

        let Some(booking) = lock_booking(&mut tx, booking_id).await? else {
            tx.rollback().await?;
            return Err(AppError::BookingNotFound);
        };
        if booking.status != BookingStatus::Booked {
            tx.rollback().await?;
            return Err(AppError::InvalidBookingState {
                booking_id,
                status: booking.status,
            });
        }

        let paid_online = booking.payment_method == PaymentMethod::Online
            && booking.payment_status == BookingPaymentStatus::Paid;
        if paid_online && payment.is_none() {
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "paid booking {booking_id} has no verified payment"
            )));
        }

        let payment_status = match (booking.payment_method, booking.payment_status) {
            (PaymentMethod::Wallet, BookingPaymentStatus::Paid) => BookingPaymentStatus::Refunded,
            (PaymentMethod::Online, BookingPaymentStatus::Paid) => {
                BookingPaymentStatus::RefundPending
            }
            (PaymentMethod::Cash, _) => BookingPaymentStatus::NoPayment,
            (_, unchanged) => unchanged,
        };

        let cancelled: Booking = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = 'CANCELLED',
                payment_status = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(payment_status.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        release_seats(&mut tx, cancelled.ride_id, cancelled.seats).await?;

        let refund = match (booking.payment_method, booking.payment_status, payment) {
            (PaymentMethod::Wallet, BookingPaymentStatus::Paid, _) => {
                credit_wallet(&mut tx, booking.passenger_id, booking.amount_paise).await?;
                let transaction = insert_wallet_entry(
                    &mut tx,
                    booking.passenger_id,
                    booking.amount_paise,
                    WalletReason::CreditRefund,
                    Some(booking_id),
                    &wallet::refund_key(booking_id),
                )
                .await?;
                RefundPlan::WalletCredited {
                    amount_paise: booking.amount_paise,
                    transaction,
                }
            }
            (PaymentMethod::Online, BookingPaymentStatus::Paid, Some(payment)) => {
                let payment: Payment = sqlx::query_as::<_, PaymentRow>(
                    r#"
                    UPDATE payments
                    SET refund_status = 'REQUESTED',
                        updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(payment.id)
                .fetch_one(&mut *tx)
                .await?
                .try_into()?;
                RefundPlan::Gateway { payment }
            }
            _ => RefundPlan::None,
        };

        let reversed_earning = reverse_earning(&mut tx, booking_id).await?;

        tx.commit().await?;

        Ok(CancelCommit {
            booking: cancelled,
            refund,
            reversed_earning,
        })
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, AppError> {
        sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (booking_id, ride_id, payer_id, amount_paise, currency, gateway_order_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(payment.booking_id)
        .bind(payment.ride_id)
        .bind(payment.payer_id)
        .bind(payment.amount_paise)
        .bind(&payment.currency)
        .bind(&payment.gateway_order_id)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_payment_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE gateway_order_id = $1")
            .bind(gateway_order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_payment_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Payment::try_from)
        .transpose()
    }

    async fn commit_verified_payment(
        &self,
        callback: VerifiedCallback,
    ) -> Result<VerifyCommit, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE gateway_order_id = $1 FOR UPDATE",
        )
        .bind(&callback.gateway_order_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Err(AppError::UnknownOrder(callback.gateway_order_id));
        };
        let payment = Payment::try_from(row)?;

        // Idempotency guard: a verified payment is never committed twice
        if payment.status == PaymentStatus::Verified {
            let booking = match payment.booking_id {
                Some(id) => lock_booking(&mut tx, id).await?,
                None => None,
            };
            tx.rollback().await?;

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

        // Money moved: the payment is VERIFIED whatever happens to the booking
        let payment: Payment = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments
            SET status = 'VERIFIED',
                gateway_payment_id = $2,
                gateway_signature = $3,
                verified_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment.id)
        .bind(&callback.gateway_payment_id)
        .bind(&callback.gateway_signature)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let booking = match payment.booking_id {
            Some(id) => lock_booking(&mut tx, id).await?,
            None => None,
        };
        let Some(booking) = booking else {
            tx.commit().await?;
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: None,
                reason: "payment has no booking".to_string(),
            });
        };

        if booking.status != BookingStatus::Pending {
            tx.commit().await?;
            let reason = format!("booking {} is {}", booking.id, booking.status);
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: Some(booking),
                reason,
            });
        }

        // A ride cancelled while the callback was in flight takes no new bookings
        let ride: Ride = sqlx::query_as::<_, RideRow>("SELECT * FROM rides WHERE id = $1 FOR UPDATE")
            .bind(booking.ride_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::RideNotFound)?
            .try_into()?;
        if !ride.is_open() {
            tx.commit().await?;
            let reason = format!("ride {} is {}", ride.id, ride.status);
            return Ok(VerifyCommit::Orphaned {
                payment,
                booking: Some(booking),
                reason,
            });
        }

        let booking: Booking = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET status = 'BOOKED',
                payment_status = 'PAID',
                hold_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        let earning = credit_earning(&mut tx, ride.owner_id, booking.id, payment.amount_paise).await?;

        tx.commit().await?;

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
        let mut tx = self.pool.begin().await?;

        let Some(row) =
            sqlx::query_as::<_, PaymentRow>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
                .bind(payment_id)
                .fetch_optional(&mut *tx)
                .await?
        else {
            tx.rollback().await?;
            return Err(AppError::PaymentNotFound);
        };
        let payment = Payment::try_from(row)?;

        let booking = match payment.booking_id {
            Some(id) => lock_booking(&mut tx, id).await?,
            None => None,
        };
        let Some(booking) = booking else {
            tx.rollback().await?;
            return Err(AppError::Internal(format!(
                "payment {payment_id} has no booking"
            )));
        };

        if payment.refund_status == Some(RefundStatus::Settled) {
            tx.rollback().await?;
            return Ok(booking);
        }

        let (refund_status, refund_id, refund_error, payment_status) = match outcome {
            RefundOutcome::Settled { gateway_refund_id } => (
                RefundStatus::Settled,
                Some(gateway_refund_id),
                None,
                BookingPaymentStatus::Refunded,
            ),
            RefundOutcome::Failed { reason } => (
                RefundStatus::Failed,
                payment.gateway_refund_id,
                Some(reason),
                BookingPaymentStatus::RefundFailed,
            ),
        };

        sqlx::query(
            r#"
            UPDATE payments
            SET refund_status = $2,
                gateway_refund_id = $3,
                refund_error = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(refund_status.as_str())
        .bind(refund_id)
        .bind(refund_error)
        .execute(&mut *tx)
        .await?;

        let booking: Booking = sqlx::query_as::<_, BookingRow>(
            "UPDATE bookings SET payment_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(booking.id)
        .bind(payment_status.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        tx.commit().await?;

        Ok(booking)
    }

    async fn list_stalled_refunds(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM payments WHERE refund_status = 'REQUESTED' AND updated_at <= $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    async fn wallet_account(&self, owner_id: Uuid) -> Result<WalletAccount, AppError> {
        let account = sqlx::query_as::<_, WalletAccount>(
            "SELECT owner_id, balance_paise, updated_at FROM wallet_accounts WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account.unwrap_or_else(|| WalletAccount {
            owner_id,
            balance_paise: 0,
            updated_at: Utc::now(),
        }))
    }

    async fn wallet_transactions(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        sqlx::query_as::<_, WalletTransactionRow>(
            "SELECT * FROM wallet_transactions WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(WalletTransaction::try_from)
        .collect()
    }

    async fn insert_topup(&self, topup: NewTopUp) -> Result<WalletTopUp, AppError> {
        let inserted = sqlx::query_as::<_, TopUpRow>(
            r#"
            INSERT INTO wallet_topups (owner_id, amount_paise, currency, provider, idempotency_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(topup.owner_id)
        .bind(topup.amount_paise)
        .bind(&topup.currency)
        .bind(&topup.provider)
        .bind(&topup.idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => row.try_into(),
            None => self
                .find_topup_by_key(&topup.idempotency_key)
                .await?
                .ok_or_else(|| AppError::Internal("conflicting top-up vanished".to_string())),
        }
    }

    async fn find_topup_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WalletTopUp>, AppError> {
        sqlx::query_as::<_, TopUpRow>("SELECT * FROM wallet_topups WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?
            .map(WalletTopUp::try_from)
            .transpose()
    }

    async fn complete_topup(
        &self,
        idempotency_key: &str,
        provider_payment_id: &str,
        success: bool,
    ) -> Result<WalletTopUp, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, TopUpRow>(
            "SELECT * FROM wallet_topups WHERE idempotency_key = $1 FOR UPDATE",
        )
        .bind(idempotency_key)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Err(AppError::TopUpNotFound);
        };
        let topup = WalletTopUp::try_from(row)?;

        // Callbacks are replayed by providers; only the first one counts
        if topup.status != TopUpStatus::Created {
            tx.rollback().await?;
            return Ok(topup);
        }

        let status = if success {
            TopUpStatus::Succeeded
        } else {
            TopUpStatus::Failed
        };
        let completed: WalletTopUp = sqlx::query_as::<_, TopUpRow>(
            r#"
            UPDATE wallet_topups
            SET status = $2,
                provider_payment_id = $3,
                completed_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(topup.id)
        .bind(status.as_str())
        .bind(provider_payment_id)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        if success {
            credit_wallet(&mut tx, topup.owner_id, topup.amount_paise).await?;
            insert_wallet_entry(
                &mut tx,
                topup.owner_id,
                topup.amount_paise,
                WalletReason::Topup,
                None,
                &wallet::topup_key(topup.id),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(completed)
    }

    async fn driver_earnings(&self, driver_id: Uuid) -> Result<DriverEarnings, AppError> {
        let earnings = sqlx::query_as::<_, DriverEarnings>(
            r#"
            SELECT driver_id, total_earnings_paise, pending_payout_paise, platform_commission_paise, updated_at
            FROM driver_earnings
            WHERE driver_id = $1
            "#,
        )
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(earnings.unwrap_or_else(|| DriverEarnings::empty(driver_id, Utc::now())))
    }

    async fn earning_entries(&self, driver_id: Uuid) -> Result<Vec<EarningEntry>, AppError> {
        sqlx::query_as::<_, EarningEntryRow>(
            "SELECT * FROM driver_earning_entries WHERE driver_id = $1 ORDER BY created_at DESC",
        )
        .bind(driver_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(EarningEntry::try_from)
        .collect()
    }

    async fn record_orphan(
        &self,
        orphan: NewOrphanedPayment,
    ) -> Result<OrphanedPayment, AppError> {
        let inserted = sqlx::query_as::<_, OrphanedPayment>(
            r#"
            INSERT INTO orphaned_payments (
                payment_id,
                booking_id,
                gateway_order_id,
                gateway_payment_id,
                amount_paise,
                reason
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (gateway_order_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(orphan.payment_id)
        .bind(orphan.booking_id)
        .bind(&orphan.gateway_order_id)
        .bind(&orphan.gateway_payment_id)
        .bind(orphan.amount_paise)
        .bind(&orphan.reason)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok(record);
        }

        let existing = sqlx::query_as::<_, OrphanedPayment>(
            "SELECT * FROM orphaned_payments WHERE gateway_order_id = $1",
        )
        .bind(&orphan.gateway_order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(existing)
    }

    async fn list_orphans(&self, include_resolved: bool) -> Result<Vec<OrphanedPayment>, AppError> {
        let orphans = sqlx::query_as::<_, OrphanedPayment>(
            "SELECT * FROM orphaned_payments WHERE $1 OR NOT resolved ORDER BY created_at DESC",
        )
        .bind(include_resolved)
        .fetch_all(&self.pool)
        .await?;
        Ok(orphans)
    }

    async fn resolve_orphan(&self, orphan_id: Uuid) -> Result<OrphanedPayment, AppError> {
        sqlx::query_as::<_, OrphanedPayment>(
            r#"
            UPDATE orphaned_payments
            SET resolved = TRUE,
                resolved_at = COALESCE(resolved_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(orphan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::OrphanNotFound)
    }
}
