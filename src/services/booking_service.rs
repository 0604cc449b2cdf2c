//! Booking service - the payment coordinator.
//!
//! Every booking request is dispatched on its [`PaymentMethod`] and driven to
//! a definite state:
//!
//! - CASH: seats reserved and booking BOOKED in one unit; money is collected
//!   in person, so the payment stays PENDING
//! - WALLET: seats reserved, balance checked and debited, booking BOOKED/PAID
//!   and the driver's earning credited, all in one unit; a short balance
//!   leaves nothing behind
//! - ONLINE: seats held with an expiry and booking PENDING in one unit, then a
//!   gateway order is created outside the unit; the booking becomes BOOKED
//!   only when the signed callback is verified
//!
//! # Idempotency
//!
//! Clients may send an `idempotencyKey`. A repeated key from the same
//! passenger returns the booking (and gateway order) created the first time.

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{OrderHandle, OrderMetadata};
use crate::models::actor::Actor;
use crate::models::booking::{
    Booking, BookingPaymentStatus, BookingStatus, CreateBookingRequest, NewBooking, PaymentMethod,
};
use crate::models::earnings::EarningSplit;
use crate::models::event::{DomainEvent, EventType};
use crate::models::payment::{CreateOrderRequest, NewPayment, PaymentStatus};
use crate::models::ride::Ride;
use crate::models::wallet::WalletDebit;
use crate::services::seat_service;
use crate::state::AppState;

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// A booking together with the gateway order the client must pay, if any.
#[derive(Debug, Clone)]
pub struct BookingPlaced {
    pub booking: Booking,
    pub order: Option<OrderHandle>,
}

/// What the coordinator needs to place one booking.
#[derive(Debug, Clone)]
struct BookingDraft {
    ride_id: Uuid,
    seats: i32,
    method: PaymentMethod,
    idempotency_key: Option<String>,
}

/// Create a booking for `actor`.
///
/// # Process
///
/// 1. Replay an earlier booking with the same idempotency key
/// 2. Validate seats, ride state and fare
/// 3. Reserve seats (and debit the wallet) atomically
/// 4. For ONLINE, create the gateway order after the reservation committed
///
/// An ONLINE request carrying `paymentId` looks up the booking of an already
/// verified payment instead of booking again.
///
/// # Seat Count Errors
///
/// A request no ride state could ever satisfy (fewer than 1 seat, or more than
/// the ride's total) is `InvalidSeatCount`. A request that only exceeds the
/// seats *currently* available is `InsufficientSeats` and carries the number
/// left, since it may succeed once other bookings are cancelled.
///
/// # Errors
///
/// - `InvalidSeatCount`: seats below 1 or above the ride's total
/// - `RideNotFound`, `RideNotOpen`
/// - `InsufficientSeats`: more seats requested than are available right now
/// - `InsufficientFunds`: wallet balance below the fare; no seats are held
/// - `Gateway`: order creation failed; the hold has been released
pub async fn create_booking(
    state: &AppState,
    actor: &Actor,
    request: CreateBookingRequest,
) -> Result<BookingPlaced, AppError> {
    if let Some(payment_id) = request.payment_id {
        if request.payment_method != PaymentMethod::Online {
            return Err(AppError::InvalidRequest(
                "paymentId is only valid for ONLINE bookings".to_string(),
            ));
        }
        return booking_for_payment(state, actor, request.ride_id, payment_id).await;
    }

    place_booking(
        state,
        actor,
        BookingDraft {
            ride_id: request.ride_id,
            seats: request.seats,
            method: request.payment_method,
            idempotency_key: request.idempotency_key,
        },
    )
    .await
}

/// Create a gateway order for an ONLINE booking of `request.seats` seats.
///
/// The amount the client shows must equal the fare; the engine never charges
/// a client-supplied amount.
///
/// # Errors
///
/// - `InvalidRequest`: `amountPaise` does not match the fare
/// - `InvalidBookingState`: an idempotent replay hit a booking that is no
///   longer waiting for payment
/// - everything [`create_booking`] can return
pub async fn create_order(
    state: &AppState,
    actor: &Actor,
    request: CreateOrderRequest,
) -> Result<(Booking, OrderHandle), AppError> {
    let seats = request.seats.unwrap_or(1);
    if seats < 1 {
        return Err(AppError::InvalidSeatCount(seats));
    }

    let ride = find_ride(state, request.ride_id).await?;
    let fare = fare_for(&ride, seats)?;
    if request.amount_paise != fare {
        return Err(AppError::InvalidRequest(format!(
            "amount {} does not match fare {fare} for {seats} seat(s)",
            request.amount_paise
        )));
    }

    let placed = place_booking(
        state,
        actor,
        BookingDraft {
            ride_id: request.ride_id,
            seats,
            method: PaymentMethod::Online,
            idempotency_key: request.idempotency_key,
        },
    )
    .await?;

    match placed.order {
        Some(order) => Ok((placed.booking, order)),
        None => Err(AppError::InvalidBookingState {
            booking_id: placed.booking.id,
            status: placed.booking.status,
        }),
    }
}

/// Fetch a booking visible to `actor`.
///
/// An expired hold is released before the booking is returned.
pub async fn get_booking(
    state: &AppState,
    actor: &Actor,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    let booking = state
        .store
        .find_booking(booking_id)
        .await?
        .ok_or(AppError::BookingNotFound)?;
    authorize_view(state, actor, &booking).await?;
    expire_if_due(state, booking).await
}

/// Bookings of the calling passenger, newest first.
pub async fn list_my_bookings(state: &AppState, actor: &Actor) -> Result<Vec<Booking>, AppError> {
    let bookings = state.store.list_passenger_bookings(actor.user_id).await?;
    let mut visible = Vec::with_capacity(bookings.len());
    for booking in bookings {
        visible.push(expire_if_due(state, booking).await?);
    }
    Ok(visible)
}

/// Passenger, ride owner or operator may see a booking. Anyone else gets
/// `BookingNotFound` so booking ids cannot be guessed.
pub(crate) async fn authorize_view(
    state: &AppState,
    actor: &Actor,
    booking: &Booking,
) -> Result<(), AppError> {
    if booking.passenger_id == actor.user_id || actor.is_operator() {
        return Ok(());
    }
    match state.store.find_ride(booking.ride_id).await? {
        Some(ride) if ride.owner_id == actor.user_id => Ok(()),
        _ => Err(AppError::BookingNotFound),
    }
}

async fn expire_if_due(state: &AppState, booking: Booking) -> Result<Booking, AppError> {
    if !booking.hold_expired(Utc::now()) {
        return Ok(booking);
    }
    match seat_service::release_hold(state, booking.id).await? {
        Some(released) => Ok(released),
        // Verified or released concurrently; read the current state
        None => state
            .store
            .find_booking(booking.id)
            .await?
            .ok_or(AppError::BookingNotFound),
    }
}

async fn place_booking(
    state: &AppState,
    actor: &Actor,
    draft: BookingDraft,
) -> Result<BookingPlaced, AppError> {
    if draft.seats < 1 {
        return Err(AppError::InvalidSeatCount(draft.seats));
    }

    if let Some(key) = draft.idempotency_key.as_deref() {
        if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(AppError::InvalidRequest(
                "idempotencyKey must be 1-255 characters".to_string(),
            ));
        }
        if let Some(existing) = state.store.find_booking_by_key(actor.user_id, key).await? {
            tracing::info!(booking_id = %existing.id, "replaying booking for idempotency key");
            return replay(state, existing).await;
        }
    }

    let ride = find_ride(state, draft.ride_id).await?;
    if !ride.is_open() {
        return Err(AppError::RideNotOpen);
    }
    if ride.owner_id == actor.user_id {
        return Err(AppError::InvalidRequest(
            "Drivers cannot book their own ride".to_string(),
        ));
    }
    if draft.seats > ride.total_seats {
        return Err(AppError::InvalidSeatCount(draft.seats));
    }
    let amount_paise = fare_for(&ride, draft.seats)?;

    let booking_id = Uuid::new_v4();
    let (status, payment_status, hold_expires_at, debit) = match draft.method {
        PaymentMethod::Cash => (
            BookingStatus::Booked,
            BookingPaymentStatus::Pending,
            None,
            None,
        ),
        PaymentMethod::Wallet => (
            BookingStatus::Booked,
            BookingPaymentStatus::Paid,
            None,
            Some(WalletDebit::for_booking(
                actor.user_id,
                booking_id,
                amount_paise,
            )),
        ),
        PaymentMethod::Online => (
            BookingStatus::Pending,
            BookingPaymentStatus::Pending,
            Some(Utc::now() + state.settings.hold_ttl),
            None,
        ),
    };

    let new_booking = NewBooking {
        id: booking_id,
        ride_id: ride.id,
        passenger_id: actor.user_id,
        seats: draft.seats,
        payment_method: draft.method,
        status,
        payment_status,
        amount_paise,
        hold_expires_at,
        idempotency_key: draft.idempotency_key,
    };

    let (booking, hold) = seat_service::try_reserve(state, new_booking, debit).await?;
    if booking.id != booking_id {
        // A concurrent request with the same key got there first
        return replay(state, booking).await;
    }

    if draft.method == PaymentMethod::Online {
        tracing::info!(
            booking_id = %booking.id,
            ride_id = %booking.ride_id,
            seats = booking.seats,
            expires_at = ?hold.expires_at,
            "seats held for online payment"
        );
        return open_order(state, booking).await;
    }

    tracing::info!(
        booking_id = %booking.id,
        ride_id = %booking.ride_id,
        seats = booking.seats,
        method = %booking.payment_method,
        "booking confirmed"
    );
    state
        .notifier
        .publish(
            DomainEvent::for_booking(EventType::BookingConfirmed, &booking)
                .with_amount(booking.amount_paise),
        )
        .await;
    if booking.payment_status == BookingPaymentStatus::Paid {
        let split = EarningSplit::of(booking.amount_paise);
        state
            .notifier
            .publish(
                DomainEvent::for_driver(EventType::EarningsAdded, ride.owner_id, &booking)
                    .with_amount(split.net_paise),
            )
            .await;
    }

    Ok(BookingPlaced {
        booking,
        order: None,
    })
}

/// Create the gateway order for a freshly held ONLINE booking.
///
/// Runs after the reservation committed, so no ledger lock is held during
/// the gateway call. Any failure releases the hold immediately.
async fn open_order(state: &AppState, booking: Booking) -> Result<BookingPlaced, AppError> {
    let metadata = OrderMetadata {
        booking_id: booking.id,
        ride_id: booking.ride_id,
        payer_id: booking.passenger_id,
    };

    let order = match state.gateway.create_order(booking.amount_paise, metadata).await {
        Ok(order) => order,
        Err(e) => {
            tracing::warn!(booking_id = %booking.id, error = %e, "gateway order failed, releasing hold");
            release_after_failure(state, booking.id).await;
            return Err(e.into());
        }
    };

    let payment = NewPayment {
        booking_id: booking.id,
        ride_id: booking.ride_id,
        payer_id: booking.passenger_id,
        amount_paise: order.amount_paise,
        currency: order.currency.clone(),
        gateway_order_id: order.order_id.clone(),
    };
    if let Err(e) = state.store.insert_payment(payment).await {
        tracing::error!(booking_id = %booking.id, order_id = %order.order_id, error = %e, "failed to record gateway order");
        release_after_failure(state, booking.id).await;
        return Err(e);
    }

    Ok(BookingPlaced {
        booking,
        order: Some(order),
    })
}

async fn release_after_failure(state: &AppState, booking_id: Uuid) {
    if let Err(e) = seat_service::release_hold(state, booking_id).await {
        // The sweeper releases it once the hold expires
        tracing::error!(%booking_id, error = %e, "failed to release hold");
    }
}

/// Return an existing booking, with its open gateway order if it is still
/// waiting for payment.
async fn replay(state: &AppState, booking: Booking) -> Result<BookingPlaced, AppError> {
    let booking = expire_if_due(state, booking).await?;
    let order = if booking.status == BookingStatus::Pending {
        state
            .store
            .find_payment_for_booking(booking.id)
            .await?
            .filter(|p| p.status == PaymentStatus::Created)
            .map(|p| OrderHandle {
                order_id: p.gateway_order_id,
                amount_paise: p.amount_paise,
                currency: p.currency,
            })
    } else {
        None
    };
    Ok(BookingPlaced { booking, order })
}

async fn booking_for_payment(
    state: &AppState,
    actor: &Actor,
    ride_id: Uuid,
    payment_id: Uuid,
) -> Result<BookingPlaced, AppError> {
    let payment = state
        .store
        .find_payment(payment_id)
        .await?
        .filter(|p| p.payer_id == actor.user_id)
        .ok_or(AppError::PaymentNotFound)?;
    if payment.ride_id != ride_id {
        return Err(AppError::InvalidRequest(
            "payment belongs to a different ride".to_string(),
        ));
    }
    if payment.status != PaymentStatus::Verified {
        return Err(AppError::InvalidRequest(format!(
            "payment is {}, not VERIFIED",
            payment.status
        )));
    }

    let booking_id = payment
        .booking_id
        .ok_or_else(|| AppError::Internal(format!("payment {payment_id} has no booking")))?;
    let booking = state
        .store
        .find_booking(booking_id)
        .await?
        .ok_or(AppError::BookingNotFound)?;

    Ok(BookingPlaced {
        booking,
        order: None,
    })
}

async fn find_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    state
        .store
        .find_ride(ride_id)
        .await?
        .ok_or(AppError::RideNotFound)
}

fn fare_for(ride: &Ride, seats: i32) -> Result<i64, AppError> {
    ride.fare_for(seats)
        .ok_or_else(|| AppError::InvalidRequest("fare exceeds the supported range".to_string()))
}
