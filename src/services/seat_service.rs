//! Seat reservation service.
//!
//! Seats are taken by one conditional decrement inside the ledger, so racing
//! callers can never jointly take more seats than a ride has. Every reserved
//! seat is tied to a booking; seats come back only through that booking's
//! transition to CANCELLED, which happens at most once.
//!
//! Online bookings hold their seats until payment or expiry. Expired holds
//! are released by the background sweeper and lazily whenever an expired
//! booking is read or its ride runs out of seats.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::{Booking, NewBooking};
use crate::models::wallet::WalletDebit;
use crate::services::cancellation_service;
use crate::state::AppState;

/// Proof that seats are held for a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldToken {
    pub ride_id: Uuid,
    pub booking_id: Uuid,
    pub seats: i32,

    /// Set for PENDING online bookings; BOOKED seats never expire
    pub expires_at: Option<DateTime<Utc>>,
}

impl HoldToken {
    pub fn for_booking(booking: &Booking) -> Self {
        Self {
            ride_id: booking.ride_id,
            booking_id: booking.id,
            seats: booking.seats,
            expires_at: booking.hold_expires_at,
        }
    }
}

/// Reserve seats for `booking` and insert it, debiting `debit` if given.
///
/// When the ride is short of seats, its expired holds are released and the
/// reservation is tried once more.
///
/// # Errors
///
/// - `InsufficientSeats`: still short after releasing expired holds
/// - `InsufficientFunds`: the wallet debit failed; no seats are held
/// - `RideNotFound`, `RideNotOpen`
pub async fn try_reserve(
    state: &AppState,
    booking: NewBooking,
    debit: Option<WalletDebit>,
) -> Result<(Booking, HoldToken), AppError> {
    let reserved = match state
        .store
        .reserve_and_insert_booking(booking.clone(), debit.clone())
        .await
    {
        Err(AppError::InsufficientSeats {
            requested,
            available,
        }) => {
            let released = release_expired_for_ride(state, booking.ride_id, Utc::now()).await?;
            if released == 0 {
                return Err(AppError::InsufficientSeats {
                    requested,
                    available,
                });
            }
            state.store.reserve_and_insert_booking(booking, debit).await?
        }
        other => other?,
    };

    let token = HoldToken::for_booking(&reserved);
    tracing::debug!(
        ride_id = %token.ride_id,
        booking_id = %token.booking_id,
        seats = token.seats,
        "seats reserved"
    );
    Ok((reserved, token))
}

/// Release the hold of a PENDING booking.
///
/// Returns `None` when the booking had already left PENDING.
pub async fn release_hold(state: &AppState, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
    let released = state.store.release_pending_booking(booking_id).await?;
    if let Some(booking) = &released {
        tracing::info!(
            %booking_id,
            ride_id = %booking.ride_id,
            seats = booking.seats,
            "seat hold released"
        );
    }
    Ok(released)
}

/// Release every hold that expired at or before `now`.
///
/// Each booking is released independently; one failure does not stop the
/// rest. Returns how many holds were released.
pub async fn release_expired_holds(state: &AppState, now: DateTime<Utc>) -> Result<usize, AppError> {
    let expired = state.store.list_expired_holds(now).await?;
    let mut released = 0;

    for booking_id in expired {
        match release_hold(state, booking_id).await {
            Ok(Some(_)) => {
                tracing::warn!(%booking_id, "payment hold expired");
                released += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::error!(%booking_id, error = %e, "failed to release expired hold"),
        }
    }

    Ok(released)
}

async fn release_expired_for_ride(
    state: &AppState,
    ride_id: Uuid,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let mut released = 0;
    for booking in state.store.list_ride_bookings(ride_id).await? {
        if booking.hold_expired(now) && release_hold(state, booking.id).await?.is_some() {
            released += 1;
        }
    }
    Ok(released)
}

/// Run the hold sweeper on a fixed interval.
///
/// Each tick releases expired holds and retries gateway refunds that were
/// requested but never recorded (for example after a crash).
pub fn spawn_hold_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.settings.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Utc::now();

            match release_expired_holds(&state, now).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(released = n, "expired holds released"),
                Err(e) => tracing::error!(error = %e, "hold sweep failed"),
            }
            if let Err(e) = cancellation_service::retry_stalled_refunds(&state, now).await {
                tracing::error!(error = %e, "stalled refund sweep failed");
            }
        }
    })
}
