mod common;

use chrono::{Duration, Utc};

use common::interleaved::InterleavedStore;
use common::{Harness, booking_request, member, operator};
use ride_booking_engine::error::AppError;
use ride_booking_engine::models::booking::{BookingPaymentStatus, BookingStatus, PaymentMethod};
use ride_booking_engine::models::earnings::EarningKind;
use ride_booking_engine::models::event::EventType;
use ride_booking_engine::models::payment::{RefundStatus, VerifyPaymentRequest};
use ride_booking_engine::models::wallet::WalletReason;
use ride_booking_engine::services::cancellation_service::{self, RefundSummary};
use ride_booking_engine::services::{
    booking_service, earnings_service, reconciliation_service, verification_service,
    wallet_service,
};
use ride_booking_engine::state::EngineSettings;
use ride_booking_engine::store::{LedgerStore, VerifiedCallback, VerifyCommit};

#[tokio::test]
async fn wallet_cancellation_restores_seats_and_balance() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.fund(&passenger, 30_000).await;
    let booking = h.book(&passenger, ride.id, 2, PaymentMethod::Wallet).await;

    let cancelled = cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.booking.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(
        cancelled.refund,
        RefundSummary::WalletCredited {
            amount_paise: 20_000
        }
    );
    assert_eq!(h.available_seats(ride.id).await, 3);
    assert_eq!(h.balance(&passenger).await, 30_000);
    assert_eq!(h.ledger_sum(&passenger).await, 30_000);

    let reasons: Vec<WalletReason> = wallet_service::transactions(&h.state, &passenger)
        .await
        .unwrap()
        .iter()
        .map(|t| t.reason)
        .collect();
    assert!(reasons.contains(&WalletReason::DebitBooking));
    assert!(reasons.contains(&WalletReason::CreditRefund));

    assert_eq!(h.events_of(EventType::BookingCancelled), 1);
    assert_eq!(h.events_of(EventType::RefundIssued), 1);
}

#[tokio::test]
async fn cash_cancellation_moves_no_money() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    let booking = h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;

    let cancelled = cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    assert_eq!(cancelled.booking.payment_status, BookingPaymentStatus::NoPayment);
    assert_eq!(cancelled.refund, RefundSummary::None);
    assert_eq!(h.available_seats(ride.id).await, 3);
    assert_eq!(h.events_of(EventType::RefundIssued), 0);
}

#[tokio::test]
async fn online_cancellation_refunds_through_gateway() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let booking = h.paid_online_booking(&passenger, &ride, 1).await;

    let cancelled = cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    assert_eq!(cancelled.booking.payment_status, BookingPaymentStatus::Refunded);
    assert!(matches!(
        cancelled.refund,
        RefundSummary::GatewaySettled {
            amount_paise: 25_000,
            ..
        }
    ));
    assert_eq!(h.available_seats(ride.id).await, 3);
    assert_eq!(h.gateway.refund_count(), 1);

    let payment = h
        .store
        .find_payment_for_booking(booking.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.refund_status, Some(RefundStatus::Settled));
    assert!(payment.gateway_refund_id.is_some());
}

#[tokio::test]
async fn failed_refund_is_recorded_and_retryable() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let booking = h.paid_online_booking(&passenger, &ride, 2).await;
    let payment = h
        .store
        .find_payment_for_booking(booking.id)
        .await
        .unwrap()
        .unwrap();
    let gateway_payment_id = payment.gateway_payment_id.clone().unwrap();
    h.gateway.fail_refunds_for(&gateway_payment_id);

    let cancelled = cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    // Seats are back even though the money is not
    assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.booking.payment_status, BookingPaymentStatus::RefundFailed);
    assert!(matches!(cancelled.refund, RefundSummary::GatewayFailed { .. }));
    assert_eq!(h.available_seats(ride.id).await, 3);
    assert_eq!(h.events_of(EventType::RefundIssued), 0);

    let still_failing = cancellation_service::retry_refund(&h.state, &passenger, booking.id).await;
    assert!(matches!(still_failing, Err(AppError::RefundFailed(_))));

    h.gateway.clear_refund_failures();
    let refunded = cancellation_service::retry_refund(&h.state, &passenger, booking.id)
        .await
        .unwrap();
    assert_eq!(refunded.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(h.gateway.refund_count(), 1);
    assert_eq!(h.events_of(EventType::RefundIssued), 1);

    let nothing_left = cancellation_service::retry_refund(&h.state, &passenger, booking.id).await;
    assert!(matches!(nothing_left, Err(AppError::InvalidRequest(_))));
}

#[tokio::test]
async fn booking_is_cancelled_at_most_once() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 10_000).await;
    let booking = h.book(&passenger, ride.id, 2, PaymentMethod::Cash).await;

    cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();
    let again = cancellation_service::cancel_booking(&h.state, &passenger, booking.id).await;

    assert!(matches!(
        again,
        Err(AppError::InvalidBookingState {
            status: BookingStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(h.available_seats(ride.id).await, 2);
}

#[tokio::test]
async fn pending_booking_cannot_be_cancelled() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 10_000).await;
    let (held, _order) = h.order(&passenger, &ride, 1).await;

    let result = cancellation_service::cancel_booking(&h.state, &passenger, held.id).await;
    assert!(matches!(
        result,
        Err(AppError::InvalidBookingState {
            status: BookingStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn strangers_cannot_cancel_but_drivers_and_operators_can() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    let first = h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;
    let second = h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;

    let denied = cancellation_service::cancel_booking(&h.state, &member(), first.id).await;
    assert!(matches!(denied, Err(AppError::BookingNotFound)));

    assert!(
        cancellation_service::cancel_booking(&h.state, &driver, first.id)
            .await
            .is_ok()
    );
    assert!(
        cancellation_service::cancel_booking(&h.state, &operator(), second.id)
            .await
            .is_ok()
    );
    assert_eq!(h.available_seats(ride.id).await, 3);
}

#[tokio::test]
async fn ride_cancellation_reports_refund_failures_separately() {
    let h = Harness::new();
    let driver = member();
    let passengers = [member(), member(), member()];
    let ride = h.ride(&driver, 3, 25_000).await;

    let mut bookings = Vec::new();
    for passenger in &passengers {
        bookings.push(h.paid_online_booking(passenger, &ride, 1).await);
    }
    assert_eq!(h.available_seats(ride.id).await, 0);

    let failing = h
        .store
        .find_payment_for_booking(bookings[1].id)
        .await
        .unwrap()
        .unwrap();
    h.gateway
        .fail_refunds_for(failing.gateway_payment_id.as_deref().unwrap());

    let result = cancellation_service::cancel_ride(&h.state, &driver, ride.id)
        .await
        .unwrap();

    assert_eq!(result.affected.len(), 3);
    assert!(result.failures.is_empty());
    assert_eq!(result.refund_failures.len(), 1);
    assert_eq!(result.refund_failures[0].booking_id, bookings[1].id);
    assert_eq!(result.refund_failures[0].amount_paise, 25_000);
    assert_eq!(result.ride.available_seats, 3);

    for booking in &bookings {
        let current = h.store.find_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(current.status, BookingStatus::Cancelled);
        let expected = if booking.id == bookings[1].id {
            BookingPaymentStatus::RefundFailed
        } else {
            BookingPaymentStatus::Refunded
        };
        assert_eq!(current.payment_status, expected);
    }
    assert_eq!(h.events_of(EventType::RideCancelled), 3);
    assert_eq!(h.events_of(EventType::RefundIssued), 2);
}

#[tokio::test]
async fn ride_cancellation_releases_pending_holds_and_closes_ride() {
    let h = Harness::new();
    let driver = member();
    let holder = member();
    let late = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, _order) = h.order(&holder, &ride, 2).await;

    let result = cancellation_service::cancel_ride(&h.state, &driver, ride.id)
        .await
        .unwrap();
    assert_eq!(result.affected.len(), 1);
    assert_eq!(result.affected[0].id, held.id);
    assert_eq!(result.ride.available_seats, 3);

    let refused = booking_service::create_booking(
        &h.state,
        &late,
        booking_request(ride.id, 1, PaymentMethod::Cash),
    )
    .await;
    assert!(matches!(refused, Err(AppError::RideNotOpen)));
}

#[tokio::test]
async fn only_owner_or_operator_cancels_a_ride() {
    let h = Harness::new();
    let driver = member();
    let ride = h.ride(&driver, 3, 25_000).await;

    let denied = cancellation_service::cancel_ride(&h.state, &member(), ride.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    assert!(
        cancellation_service::cancel_ride(&h.state, &operator(), ride.id)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn stalled_refunds_are_retried_by_the_sweep() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 25_000).await;
    let booking = h.paid_online_booking(&passenger, &ride, 1).await;

    // Ledger cancellation committed but the gateway was never called
    h.store.cancel_booking(booking.id).await.unwrap();
    let pending = h.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(pending.payment_status, BookingPaymentStatus::RefundPending);

    let too_early = cancellation_service::retry_stalled_refunds(&h.state, Utc::now())
        .await
        .unwrap();
    assert_eq!(too_early, 0);

    let settled =
        cancellation_service::retry_stalled_refunds(&h.state, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
    assert_eq!(settled, 1);

    let refunded = h.store.find_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(refunded.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(h.gateway.refund_count(), 1);
}

#[tokio::test]
async fn cancelling_a_wallet_booking_reverses_the_driver_earning() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.fund(&passenger, 30_000).await;
    let booking = h.book(&passenger, ride.id, 2, PaymentMethod::Wallet).await;
    assert_eq!(h.earnings(&driver).await, (20_000, 18_000));

    cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    assert_eq!(h.earnings(&driver).await, (0, 0));
    let entries = earnings_service::entries(&h.state, &driver).await.unwrap();
    let kinds: Vec<EarningKind> = entries.iter().map(|e| e.kind).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&EarningKind::Credit));
    assert!(kinds.contains(&EarningKind::Reversal));
    assert_eq!(entries.iter().map(|e| e.net_paise).sum::<i64>(), 0);
}

#[tokio::test]
async fn cancelling_an_online_booking_reverses_the_driver_earning() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 25_000).await;
    let booking = h.paid_online_booking(&passenger, &ride, 1).await;
    assert_eq!(h.earnings(&driver).await, (25_000, 22_500));

    cancellation_service::cancel_booking(&h.state, &driver, booking.id)
        .await
        .unwrap();

    assert_eq!(h.earnings(&driver).await, (0, 0));
    assert_eq!(
        earnings_service::entries(&h.state, &driver)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn cancelling_a_cash_booking_leaves_earnings_alone() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    let booking = h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;

    cancellation_service::cancel_booking(&h.state, &passenger, booking.id)
        .await
        .unwrap();

    assert_eq!(h.earnings(&driver).await, (0, 0));
    assert!(
        earnings_service::entries(&h.state, &driver)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn ride_cancellation_reverses_every_paid_booking() {
    let h = Harness::new();
    let driver = member();
    let wallet_passenger = member();
    let online_passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.fund(&wallet_passenger, 10_000).await;
    h.book(&wallet_passenger, ride.id, 1, PaymentMethod::Wallet).await;
    h.paid_online_booking(&online_passenger, &ride, 1).await;
    assert_eq!(h.earnings(&driver).await, (20_000, 18_000));

    cancellation_service::cancel_ride(&h.state, &driver, ride.id)
        .await
        .unwrap();

    assert_eq!(h.earnings(&driver).await, (0, 0));
    assert_eq!(h.balance(&wallet_passenger).await, 10_000);
}

fn verified(callback: &VerifyPaymentRequest) -> VerifiedCallback {
    VerifiedCallback {
        gateway_order_id: callback.gateway_order_id.clone(),
        gateway_payment_id: callback.gateway_payment_id.clone(),
        gateway_signature: callback.gateway_signature.clone(),
    }
}

#[tokio::test]
async fn payment_landing_after_ride_listing_is_orphaned_not_booked() {
    let store = InterleavedStore::new();
    let h = Harness::with_store(store.clone(), EngineSettings::default());
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;
    let callback = h.checkout(&held, &order);

    // The gateway callback commits between the listing and the hold release
    store.commit_after_listing(verified(&callback));
    let result = cancellation_service::cancel_ride(&h.state, &driver, ride.id)
        .await
        .unwrap();

    let commits = store.commits();
    assert_eq!(commits.len(), 1);
    assert!(matches!(commits[0], VerifyCommit::Orphaned { .. }));

    assert!(result.failures.is_empty());
    assert_eq!(result.affected.len(), 1);
    assert_eq!(result.affected[0].id, held.id);
    assert_eq!(result.ride.available_seats, 3);

    let current = h.store.find_booking(held.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Cancelled);
    assert_eq!(h.earnings(&driver).await, (0, 0));

    // The client's relayed callback surfaces the orphan for operators
    let relayed = verification_service::verify_payment(&h.state, &passenger, callback).await;
    assert!(matches!(relayed, Err(AppError::OrphanedPayment { .. })));
    let orphans = reconciliation_service::list_orphans(&h.state, &operator(), false)
        .await
        .unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].booking_id, Some(held.id));
    assert_eq!(h.available_seats(ride.id).await, 3);
}

#[tokio::test]
async fn booking_committed_before_ride_cancel_is_refunded_despite_stale_listing() {
    let store = InterleavedStore::new();
    let h = Harness::with_store(store.clone(), EngineSettings::default());
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;
    let callback = h.checkout(&held, &order);

    // Committed while the ride is still open; the listing still says PENDING
    store.commit_before_cancel(verified(&callback));
    let result = cancellation_service::cancel_ride(&h.state, &driver, ride.id)
        .await
        .unwrap();

    let commits = store.commits();
    assert_eq!(commits.len(), 1);
    assert!(matches!(commits[0], VerifyCommit::Committed { .. }));

    assert!(result.failures.is_empty());
    assert!(result.refund_failures.is_empty());
    assert_eq!(result.affected.len(), 1);
    assert_eq!(result.affected[0].id, held.id);
    assert_eq!(result.ride.available_seats, 3);

    let current = h.store.find_booking(held.id).await.unwrap().unwrap();
    assert_eq!(current.status, BookingStatus::Cancelled);
    assert_eq!(current.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(h.gateway.refund_count(), 1);
    assert_eq!(h.earnings(&driver).await, (0, 0));
    assert_eq!(h.events_of(EventType::RideCancelled), 1);
    assert_eq!(h.events_of(EventType::RefundIssued), 1);
}
