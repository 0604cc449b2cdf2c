//! Gateway verification service.
//!
//! Verifying a payment and committing its booking are one server-side step.
//! The signature is checked first (pure HMAC, no state touched); the ledger
//! then records the payment as VERIFIED, moves the booking to BOOKED and
//! credits the driver in a single unit.
//!
//! # Orphaned Payments
//!
//! When the gateway says money moved but the booking can no longer be
//! committed (its hold was already released, its ride was cancelled, or the
//! ledger failed), the
//! payment is recorded in the reconciliation ledger, logged on the
//! `reconciliation` target and reported as `OrphanedPayment`. It is never
//! dropped silently.

use crate::error::AppError;
use crate::gateway::Verification;
use crate::models::actor::Actor;
use crate::models::booking::{Booking, BookingPaymentStatus, BookingStatus};
use crate::models::event::{DomainEvent, EventType};
use crate::models::payment::{Payment, VerifyPaymentRequest};
use crate::models::reconciliation::NewOrphanedPayment;
use crate::services::seat_service;
use crate::state::AppState;
use crate::store::{VerifiedCallback, VerifyCommit};

/// Verify a signed gateway callback and commit its booking.
///
/// Replaying an already verified callback returns the original result with
/// no further side effects.
///
/// # Errors
///
/// - `InvalidSignature`: signature mismatch; nothing changes
/// - `UnknownOrder`: the order was never created by this engine
/// - `PaymentNotFound`: the order belongs to another user
/// - `OrphanedPayment`: money moved but the booking could not be committed
pub async fn verify_payment(
    state: &AppState,
    actor: &Actor,
    request: VerifyPaymentRequest,
) -> Result<Payment, AppError> {
    let verification = state.gateway.verify_callback(
        &request.gateway_order_id,
        &request.gateway_payment_id,
        &request.gateway_signature,
    );
    if verification == Verification::Invalid {
        tracing::warn!(
            order_id = %request.gateway_order_id,
            payment_id = %request.gateway_payment_id,
            user_id = %actor.user_id,
            "rejected payment callback with invalid signature"
        );
        return Err(AppError::InvalidSignature);
    }

    if let Some(payment) = state
        .store
        .find_payment_by_order(&request.gateway_order_id)
        .await?
    {
        if payment.payer_id != actor.user_id && !actor.is_operator() {
            return Err(AppError::PaymentNotFound);
        }
        if payment.ride_id != request.ride_id || payment.amount_paise != request.amount_paise {
            tracing::warn!(
                order_id = %request.gateway_order_id,
                claimed_ride = %request.ride_id,
                claimed_amount = request.amount_paise,
                ride_id = %payment.ride_id,
                amount_paise = payment.amount_paise,
                "callback details differ from the recorded order; using recorded values"
            );
        }
    }

    let callback = VerifiedCallback {
        gateway_order_id: request.gateway_order_id.clone(),
        gateway_payment_id: request.gateway_payment_id.clone(),
        gateway_signature: request.gateway_signature.clone(),
    };

    let commit = match state.store.commit_verified_payment(callback).await {
        Ok(commit) => commit,
        Err(AppError::UnknownOrder(order_id)) => {
            tracing::error!(
                target: "reconciliation",
                %order_id,
                payment_id = %request.gateway_payment_id,
                "verified payment for an unknown order"
            );
            record_orphan(
                state,
                &request,
                None,
                None,
                "order unknown to the ledger".to_string(),
            )
            .await;
            return Err(AppError::UnknownOrder(order_id));
        }
        Err(e) => {
            let reason = format!("booking commit failed: {e}");
            let booking = booking_for_order(state, &request.gateway_order_id).await;
            return Err(flag_orphan(state, &request, None, booking.as_ref(), reason).await);
        }
    };

    match commit {
        VerifyCommit::Committed {
            payment,
            booking,
            earning,
        } => {
            tracing::info!(
                payment_id = %payment.id,
                booking_id = %booking.id,
                order_id = %payment.gateway_order_id,
                amount_paise = payment.amount_paise,
                driver_id = %earning.driver_id,
                driver_net_paise = earning.net_paise,
                "payment verified, booking confirmed"
            );
            state
                .notifier
                .publish(
                    DomainEvent::for_booking(EventType::BookingConfirmed, &booking)
                        .with_amount(payment.amount_paise),
                )
                .await;
            state
                .notifier
                .publish(
                    DomainEvent::for_driver(EventType::EarningsAdded, earning.driver_id, &booking)
                        .with_amount(earning.net_paise),
                )
                .await;
            Ok(payment)
        }
        VerifyCommit::Replayed { payment, booking } => {
            if booking.as_ref().is_some_and(was_committed) {
                tracing::info!(payment_id = %payment.id, "replayed payment callback");
                return Ok(payment);
            }
            let reason = match &booking {
                Some(b) => format!("booking {} is {}", b.id, b.status),
                None => "payment has no booking".to_string(),
            };
            Err(flag_orphan(state, &request, Some(&payment), booking.as_ref(), reason).await)
        }
        VerifyCommit::Orphaned {
            payment,
            booking,
            reason,
        } => Err(flag_orphan(state, &request, Some(&payment), booking.as_ref(), reason).await),
    }
}

/// Whether a booking's payment was ever committed as paid.
fn was_committed(booking: &Booking) -> bool {
    matches!(
        booking.payment_status,
        BookingPaymentStatus::Paid
            | BookingPaymentStatus::RefundPending
            | BookingPaymentStatus::Refunded
            | BookingPaymentStatus::RefundFailed
    )
}

/// Record and log an orphaned payment, release any seats still held for it,
/// and build the error returned to the caller.
async fn flag_orphan(
    state: &AppState,
    request: &VerifyPaymentRequest,
    payment: Option<&Payment>,
    booking: Option<&Booking>,
    reason: String,
) -> AppError {
    tracing::error!(
        target: "reconciliation",
        order_id = %request.gateway_order_id,
        payment_id = %request.gateway_payment_id,
        booking_id = ?booking.map(|b| b.id),
        amount_paise = payment.map_or(request.amount_paise, |p| p.amount_paise),
        %reason,
        "orphaned payment: money received but booking not committed"
    );

    record_orphan(state, request, payment, booking, reason.clone()).await;

    if let Some(booking) = booking.filter(|b| b.status == BookingStatus::Pending) {
        if let Err(e) = seat_service::release_hold(state, booking.id).await {
            tracing::error!(booking_id = %booking.id, error = %e, "failed to release orphaned hold");
        }
    }

    AppError::OrphanedPayment {
        order_id: request.gateway_order_id.clone(),
        reason,
    }
}

async fn record_orphan(
    state: &AppState,
    request: &VerifyPaymentRequest,
    payment: Option<&Payment>,
    booking: Option<&Booking>,
    reason: String,
) {
    let orphan = NewOrphanedPayment {
        payment_id: payment.map(|p| p.id),
        booking_id: booking.map(|b| b.id).or(payment.and_then(|p| p.booking_id)),
        gateway_order_id: request.gateway_order_id.clone(),
        gateway_payment_id: request.gateway_payment_id.clone(),
        amount_paise: payment.map_or(request.amount_paise, |p| p.amount_paise),
        reason,
    };
    if let Err(e) = state.store.record_orphan(orphan).await {
        tracing::error!(
            target: "reconciliation",
            order_id = %request.gateway_order_id,
            error = %e,
            "failed to record orphaned payment"
        );
    }
}

/// Booking of an order whose commit failed, so its hold can be released.
async fn booking_for_order(state: &AppState, gateway_order_id: &str) -> Option<Booking> {
    let payment = state
        .store
        .find_payment_by_order(gateway_order_id)
        .await
        .ok()
        .flatten()?;
    let booking_id = payment.booking_id?;
    state.store.find_booking(booking_id).await.ok().flatten()
}
