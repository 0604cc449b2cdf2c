//! Cancellation and refund orchestration.
//!
//! A cancellation commits first: the booking becomes CANCELLED and its seats
//! go back to the ride in one ledger unit, together with the wallet credit
//! for WALLET bookings. Gateway refunds are requested only after that commit,
//! so a slow or failing gateway never keeps seats locked.
//!
//! # Refund Outcomes
//!
//! Every gateway refund outcome is recorded on the payment. A rejected refund
//! leaves the booking REFUND_FAILED (never REFUNDED) and can be retried with
//! the same refund key; the gateway deduplicates on it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::RefundRequest;
use crate::models::actor::Actor;
use crate::models::booking::{Booking, BookingPaymentStatus, BookingStatus};
use crate::models::event::{DomainEvent, EventType};
use crate::models::payment::{Payment, RefundOutcome};
use crate::models::ride::Ride;
use crate::services::{booking_service, ride_service, seat_service};
use crate::state::AppState;
use crate::store::{CancelCommit, RefundPlan};

/// What happened to the money of a cancelled booking.
///
/// ```json
/// { "kind": "GATEWAY_FAILED", "amountPaise": 25000, "reason": "refund window closed" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "kind",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RefundSummary {
    /// Nothing was paid
    None,
    WalletCredited {
        amount_paise: i64,
    },
    GatewaySettled {
        amount_paise: i64,
        gateway_refund_id: String,
    },
    GatewayFailed {
        amount_paise: i64,
        reason: String,
    },
    /// Requested but the outcome could not be recorded yet; the sweeper retries
    GatewayPending {
        amount_paise: i64,
    },
}

impl RefundSummary {
    /// Amount actually returned to the passenger, if any.
    pub fn returned_paise(&self) -> Option<i64> {
        match self {
            Self::WalletCredited { amount_paise } | Self::GatewaySettled { amount_paise, .. } => {
                Some(*amount_paise)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingCancellation {
    pub booking: Booking,
    pub refund: RefundSummary,
}

/// A refund that failed while cancelling a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundFailureReport {
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub amount_paise: i64,
    pub reason: String,
}

/// A booking that could not be cancelled at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationFailure {
    pub booking_id: Uuid,
    pub error: String,
}

/// Result of cancelling a ride.
///
/// Bookings are cancelled independently, so one failure never prevents the
/// rest from being cancelled.
#[derive(Debug, Clone)]
pub struct RideCancellation {
    pub ride: Ride,

    /// Bookings cancelled (BOOKED) or released (PENDING) by this call
    pub affected: Vec<Booking>,
    pub refund_failures: Vec<RefundFailureReport>,
    pub failures: Vec<CancellationFailure>,
}

/// Cancel a BOOKED booking.
///
/// The passenger, the ride owner and operators may cancel. Seats are released
/// and wallet money credited before any gateway call is made.
///
/// # Errors
///
/// - `BookingNotFound`: unknown booking, or not visible to `actor`
/// - `InvalidBookingState`: the booking is not BOOKED
pub async fn cancel_booking(
    state: &AppState,
    actor: &Actor,
    booking_id: Uuid,
) -> Result<BookingCancellation, AppError> {
    let booking = state
        .store
        .find_booking(booking_id)
        .await?
        .ok_or(AppError::BookingNotFound)?;
    booking_service::authorize_view(state, actor, &booking).await?;

    let cancellation = cancel_committed(state, booking_id, EventType::BookingCancelled).await?;
    tracing::info!(
        %booking_id,
        cancelled_by = %actor.user_id,
        payment_status = %cancellation.booking.payment_status,
        "booking cancelled"
    );
    Ok(cancellation)
}

/// Cancel a ride and every booking on it.
///
/// BOOKED bookings are cancelled and refunded; PENDING holds are released.
/// Each affected passenger receives a RIDE_CANCELLED event.
///
/// A PENDING booking whose payment is committed while the ride is being
/// cancelled is found BOOKED when its hold is released, and is then
/// cancelled and refunded like any other BOOKED booking.
///
/// # Errors
///
/// - `RideNotFound`
/// - `Forbidden`: `actor` neither owns the ride nor is an operator
pub async fn cancel_ride(
    state: &AppState,
    actor: &Actor,
    ride_id: Uuid,
) -> Result<RideCancellation, AppError> {
    let ride = ride_service::get_ride(state, ride_id).await?;
    if ride.owner_id != actor.user_id && !actor.is_operator() {
        return Err(AppError::Forbidden(
            "only the ride owner can cancel the ride".to_string(),
        ));
    }

    let ride = state.store.mark_ride_cancelled(ride_id).await?;
    let bookings = state.store.list_ride_bookings(ride_id).await?;

    let mut report = RideCancellation {
        ride,
        affected: Vec::new(),
        refund_failures: Vec::new(),
        failures: Vec::new(),
    };

    for booking in bookings {
        match booking.status {
            BookingStatus::Booked => cancel_for_ride(state, &booking, &mut report).await,
            BookingStatus::Pending => match seat_service::release_hold(state, booking.id).await {
                Ok(Some(released)) => {
                    state
                        .notifier
                        .publish(DomainEvent::for_booking(EventType::RideCancelled, &released))
                        .await;
                    report.affected.push(released);
                }
                // No longer PENDING: committed or released since the listing
                Ok(None) => match state.store.find_booking(booking.id).await {
                    Ok(Some(current)) if current.status == BookingStatus::Booked => {
                        tracing::warn!(
                            booking_id = %booking.id,
                            %ride_id,
                            "booking committed while its ride was being cancelled"
                        );
                        cancel_for_ride(state, &current, &mut report).await;
                    }
                    Ok(_) => {}
                    Err(e) => report.fail(booking.id, &e),
                },
                Err(e) => {
                    tracing::error!(booking_id = %booking.id, error = %e, "failed to release hold of cancelled ride");
                    report.fail(booking.id, &e);
                }
            },
            BookingStatus::Cancelled => {}
        }
    }

    if let Some(current) = state.store.find_ride(ride_id).await? {
        report.ride = current;
    }
    tracing::info!(
        %ride_id,
        cancelled_by = %actor.user_id,
        affected = report.affected.len(),
        refund_failures = report.refund_failures.len(),
        failures = report.failures.len(),
        "ride cancelled"
    );

    Ok(report)
}

impl RideCancellation {
    fn fail(&mut self, booking_id: Uuid, error: &AppError) {
        self.failures.push(CancellationFailure {
            booking_id,
            error: error.to_string(),
        });
    }
}

/// Cancel one BOOKED booking of a cancelled ride into `report`.
async fn cancel_for_ride(state: &AppState, booking: &Booking, report: &mut RideCancellation) {
    match cancel_committed(state, booking.id, EventType::RideCancelled).await {
        Ok(cancellation) => {
            if let RefundSummary::GatewayFailed {
                amount_paise,
                reason,
            } = &cancellation.refund
            {
                report.refund_failures.push(RefundFailureReport {
                    booking_id: booking.id,
                    passenger_id: booking.passenger_id,
                    amount_paise: *amount_paise,
                    reason: reason.clone(),
                });
            }
            report.affected.push(cancellation.booking);
        }
        Err(e) => {
            tracing::error!(booking_id = %booking.id, error = %e, "failed to cancel booking of cancelled ride");
            report.fail(booking.id, &e);
        }
    }
}

/// Request the gateway refund of a cancelled booking again.
///
/// # Errors
///
/// - `BookingNotFound`
/// - `InvalidRequest`: the booking has no refund outstanding
/// - `RefundFailed`: the gateway rejected the refund again
pub async fn retry_refund(
    state: &AppState,
    actor: &Actor,
    booking_id: Uuid,
) -> Result<Booking, AppError> {
    let booking = state
        .store
        .find_booking(booking_id)
        .await?
        .ok_or(AppError::BookingNotFound)?;
    booking_service::authorize_view(state, actor, &booking).await?;

    if !matches!(
        booking.payment_status,
        BookingPaymentStatus::RefundPending | BookingPaymentStatus::RefundFailed
    ) {
        return Err(AppError::InvalidRequest(format!(
            "booking payment is {}, no refund outstanding",
            booking.payment_status
        )));
    }

    let payment = state
        .store
        .find_payment_for_booking(booking_id)
        .await?
        .ok_or(AppError::PaymentNotFound)?;

    let (updated, refund) = refund_payment(state, &payment).await;
    let booking = updated.unwrap_or(booking);
    match refund {
        RefundSummary::GatewayFailed { reason, .. } => Err(AppError::RefundFailed(reason)),
        RefundSummary::GatewaySettled { amount_paise, .. } => {
            state
                .notifier
                .publish(
                    DomainEvent::for_booking(EventType::RefundIssued, &booking)
                        .with_amount(amount_paise),
                )
                .await;
            Ok(booking)
        }
        _ => Ok(booking),
    }
}

/// Retry refunds left REQUESTED for longer than one sweep interval.
///
/// These are refunds whose outcome was never recorded, for example because
/// the process stopped between the cancellation commit and the gateway call.
/// Returns how many were settled.
pub async fn retry_stalled_refunds(state: &AppState, now: DateTime<Utc>) -> Result<usize, AppError> {
    let grace = chrono::Duration::from_std(state.settings.sweep_interval)
        .map_err(|e| AppError::Internal(format!("sweep interval out of range: {e}")))?;
    let stalled = state.store.list_stalled_refunds(now - grace).await?;

    let mut settled = 0;
    for payment in stalled {
        tracing::warn!(
            target: "reconciliation",
            payment_id = %payment.id,
            "retrying stalled refund"
        );
        let (booking, refund) = refund_payment(state, &payment).await;
        if let (Some(booking), RefundSummary::GatewaySettled { amount_paise, .. }) =
            (booking, refund)
        {
            state
                .notifier
                .publish(
                    DomainEvent::for_booking(EventType::RefundIssued, &booking)
                        .with_amount(amount_paise),
                )
                .await;
            settled += 1;
        }
    }
    Ok(settled)
}

/// Run the ledger cancellation, settle its refund and publish events.
async fn cancel_committed(
    state: &AppState,
    booking_id: Uuid,
    event_type: EventType,
) -> Result<BookingCancellation, AppError> {
    let CancelCommit {
        booking,
        refund,
        reversed_earning,
    } = state.store.cancel_booking(booking_id).await?;
    if let Some(reversal) = reversed_earning {
        tracing::info!(
            %booking_id,
            driver_id = %reversal.driver_id,
            net_paise = reversal.net_paise,
            "driver earning reversed"
        );
    }

    let (booking, refund) = match refund {
        RefundPlan::None => (booking, RefundSummary::None),
        RefundPlan::WalletCredited { amount_paise, .. } => {
            (booking, RefundSummary::WalletCredited { amount_paise })
        }
        RefundPlan::Gateway { payment } => {
            let (updated, summary) = refund_payment(state, &payment).await;
            (updated.unwrap_or(booking), summary)
        }
    };

    state
        .notifier
        .publish(DomainEvent::for_booking(event_type, &booking))
        .await;
    if let Some(amount_paise) = refund.returned_paise() {
        state
            .notifier
            .publish(
                DomainEvent::for_booking(EventType::RefundIssued, &booking)
                    .with_amount(amount_paise),
            )
            .await;
    }

    Ok(BookingCancellation { booking, refund })
}

/// Ask the gateway to refund `payment` and record the outcome.
///
/// Returns the booking as updated by the recorded outcome, or `None` when the
/// outcome could not be recorded (the refund then stays REQUESTED and the
/// sweeper picks it up).
async fn refund_payment(state: &AppState, payment: &Payment) -> (Option<Booking>, RefundSummary) {
    let amount_paise = payment.amount_paise;

    let outcome = match payment.gateway_payment_id.as_deref() {
        Some(gateway_payment_id) => {
            let request = RefundRequest {
                gateway_payment_id: gateway_payment_id.to_string(),
                amount_paise,
                refund_key: payment.refund_key(),
            };
            match state.gateway.refund(request).await {
                Ok(handle) => RefundOutcome::Settled {
                    gateway_refund_id: handle.refund_id,
                },
                Err(e) => {
                    tracing::error!(
                        target: "reconciliation",
                        payment_id = %payment.id,
                        booking_id = ?payment.booking_id,
                        amount_paise,
                        error = %e,
                        "gateway refund failed"
                    );
                    RefundOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        }
        None => RefundOutcome::Failed {
            reason: "payment was never captured by the gateway".to_string(),
        },
    };

    let summary = match &outcome {
        RefundOutcome::Settled { gateway_refund_id } => RefundSummary::GatewaySettled {
            amount_paise,
            gateway_refund_id: gateway_refund_id.clone(),
        },
        RefundOutcome::Failed { reason } => RefundSummary::GatewayFailed {
            amount_paise,
            reason: reason.clone(),
        },
    };

    match state.store.record_refund_outcome(payment.id, outcome).await {
        Ok(booking) => (Some(booking), summary),
        Err(e) => {
            tracing::error!(
                target: "reconciliation",
                payment_id = %payment.id,
                error = %e,
                "failed to record refund outcome"
            );
            (None, RefundSummary::GatewayPending { amount_paise })
        }
    }
}
