mod common;

use chrono::Utc;

use common::{Harness, booking_request, member, operator};
use ride_booking_engine::error::AppError;
use ride_booking_engine::models::booking::{BookingPaymentStatus, BookingStatus, PaymentMethod};
use ride_booking_engine::models::earnings::EarningKind;
use ride_booking_engine::models::event::EventType;
use ride_booking_engine::models::payment::{CreateOrderRequest, PaymentStatus, VerifyPaymentRequest};
use ride_booking_engine::models::wallet::{TopUpCallbackRequest, TopUpRequest};
use ride_booking_engine::services::{
    booking_service, earnings_service, reconciliation_service, seat_service, verification_service,
    wallet_service,
};
use uuid::Uuid;
use ride_booking_engine::store::LedgerStore;

#[tokio::test]
async fn cash_booking_is_booked_with_payment_pending() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;

    let booking = h.book(&passenger, ride.id, 2, PaymentMethod::Cash).await;

    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Pending);
    assert_eq!(booking.amount_paise, 20_000);
    assert_eq!(h.available_seats(ride.id).await, 1);
    assert_eq!(h.events_of(EventType::BookingConfirmed), 1);
}

#[tokio::test]
async fn wallet_booking_debits_exact_fare() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 4, 10_000).await;
    h.fund(&passenger, 50_000).await;

    let booking = h.book(&passenger, ride.id, 2, PaymentMethod::Wallet).await;

    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(h.balance(&passenger).await, 30_000);
    assert_eq!(h.ledger_sum(&passenger).await, 30_000);
    assert_eq!(h.available_seats(ride.id).await, 2);
}

#[tokio::test]
async fn wallet_shortfall_leaves_seats_and_balance_untouched() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.fund(&passenger, 15_000).await;

    let result = booking_service::create_booking(
        &h.state,
        &passenger,
        booking_request(ride.id, 2, PaymentMethod::Wallet),
    )
    .await;

    assert!(matches!(
        result,
        Err(AppError::InsufficientFunds {
            required: 20_000,
            balance: 15_000
        })
    ));
    assert_eq!(h.available_seats(ride.id).await, 3);
    assert_eq!(h.balance(&passenger).await, 15_000);
    assert!(h.store.list_ride_bookings(ride.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_seat_counts_are_rejected() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;

    for seats in [0, -1, 4] {
        let result = booking_service::create_booking(
            &h.state,
            &passenger,
            booking_request(ride.id, seats, PaymentMethod::Cash),
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidSeatCount(n)) if n == seats));
    }
    assert_eq!(h.available_seats(ride.id).await, 3);
}

#[tokio::test]
async fn driver_cannot_book_own_ride() {
    let h = Harness::new();
    let driver = member();
    let ride = h.ride(&driver, 3, 10_000).await;

    let result = booking_service::create_booking(
        &h.state,
        &driver,
        booking_request(ride.id, 1, PaymentMethod::Cash),
    )
    .await;
    assert!(matches!(result, Err(AppError::InvalidRequest(_))));
}

#[tokio::test]
async fn repeated_idempotency_key_returns_the_same_booking() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.fund(&passenger, 50_000).await;

    let mut request = booking_request(ride.id, 1, PaymentMethod::Wallet);
    request.idempotency_key = Some("form-1".to_string());
    let first = booking_service::create_booking(&h.state, &passenger, request)
        .await
        .unwrap();

    let mut again = booking_request(ride.id, 1, PaymentMethod::Wallet);
    again.idempotency_key = Some("form-1".to_string());
    let second = booking_service::create_booking(&h.state, &passenger, again)
        .await
        .unwrap();

    assert_eq!(first.booking.id, second.booking.id);
    assert_eq!(h.available_seats(ride.id).await, 2);
    assert_eq!(h.balance(&passenger).await, 40_000);
}

#[tokio::test]
async fn online_booking_is_confirmed_by_verified_callback() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;

    let (held, order) = h.order(&passenger, &ride, 1).await;
    assert_eq!(held.status, BookingStatus::Pending);
    assert!(held.hold_expires_at.is_some());
    assert_eq!(order.amount_paise, 25_000);
    assert_eq!(h.available_seats(ride.id).await, 2);

    let callback = h.checkout(&held, &order);
    let payment = verification_service::verify_payment(&h.state, &passenger, callback)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Verified);
    assert_eq!(payment.booking_id, Some(held.id));

    let booking = booking_service::get_booking(&h.state, &passenger, held.id)
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(booking.hold_expires_at, None);
    assert_eq!(h.available_seats(ride.id).await, 2);
}

#[tokio::test]
async fn replayed_callback_has_no_further_effect() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;
    let callback = h.checkout(&held, &order);

    let replay = VerifyPaymentRequest {
        ride_id: callback.ride_id,
        amount_paise: callback.amount_paise,
        gateway_order_id: callback.gateway_order_id.clone(),
        gateway_payment_id: callback.gateway_payment_id.clone(),
        gateway_signature: callback.gateway_signature.clone(),
    };

    let first = verification_service::verify_payment(&h.state, &passenger, callback)
        .await
        .unwrap();
    let second = verification_service::verify_payment(&h.state, &passenger, replay)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.events_of(EventType::BookingConfirmed), 1);
    assert_eq!(h.available_seats(ride.id).await, 2);
}

#[tokio::test]
async fn invalid_signature_changes_nothing() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;

    let mut callback = h.checkout(&held, &order);
    callback.gateway_signature = "0".repeat(64);

    let result = verification_service::verify_payment(&h.state, &passenger, callback).await;
    assert!(matches!(result, Err(AppError::InvalidSignature)));

    let booking = h.store.find_booking(held.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    let payment = h
        .store
        .find_payment_for_booking(held.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Created);
}

#[tokio::test]
async fn order_amount_must_match_fare() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;

    let result = booking_service::create_order(
        &h.state,
        &passenger,
        CreateOrderRequest {
            ride_id: ride.id,
            amount_paise: 1,
            seats: Some(1),
            idempotency_key: None,
        },
    )
    .await;

    assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    assert_eq!(h.available_seats(ride.id).await, 3);
}

#[tokio::test]
async fn gateway_outage_releases_the_hold() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    h.gateway.set_orders_failing(true);

    let result = booking_service::create_booking(
        &h.state,
        &passenger,
        booking_request(ride.id, 2, PaymentMethod::Online),
    )
    .await;

    assert!(matches!(result, Err(AppError::Gateway(_))));
    assert_eq!(h.available_seats(ride.id).await, 3);
    let bookings = h.store.list_ride_bookings(ride.id).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].status, BookingStatus::Cancelled);
    assert_eq!(bookings[0].payment_status, BookingPaymentStatus::Failed);
}

#[tokio::test]
async fn sweeper_releases_expired_holds() {
    let h = Harness::with_instant_expiry();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;
    let (held, _order) = h.order(&passenger, &ride, 2).await;
    assert_eq!(h.available_seats(ride.id).await, 1);

    let released = seat_service::release_expired_holds(&h.state, Utc::now())
        .await
        .unwrap();
    assert_eq!(released, 1);
    assert_eq!(h.available_seats(ride.id).await, 3);

    let booking = h.store.find_booking(held.id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.payment_status, BookingPaymentStatus::Failed);

    // Already released; a second sweep must not add seats again
    let again = seat_service::release_expired_holds(&h.state, Utc::now())
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(h.available_seats(ride.id).await, 3);
}

#[tokio::test]
async fn expired_holds_make_room_for_new_bookings() {
    let h = Harness::with_instant_expiry();
    let driver = member();
    let first = member();
    let second = member();
    let ride = h.ride(&driver, 1, 25_000).await;
    h.order(&first, &ride, 1).await;
    assert_eq!(h.available_seats(ride.id).await, 0);

    let booking = h.book(&second, ride.id, 1, PaymentMethod::Cash).await;
    assert_eq!(booking.status, BookingStatus::Booked);
    assert_eq!(h.available_seats(ride.id).await, 0);
}

#[tokio::test]
async fn payment_after_expiry_is_flagged_as_orphan() {
    let h = Harness::with_instant_expiry();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;
    seat_service::release_expired_holds(&h.state, Utc::now())
        .await
        .unwrap();

    let callback = h.checkout(&held, &order);
    let result = verification_service::verify_payment(&h.state, &passenger, callback).await;
    assert!(matches!(result, Err(AppError::OrphanedPayment { .. })));

    // Money moved, so the payment is recorded as verified
    let payment = h
        .store
        .find_payment_for_booking(held.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Verified);
    assert_eq!(h.available_seats(ride.id).await, 2);

    let orphans = reconciliation_service::list_orphans(&h.state, &operator(), false)
        .await
        .unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].gateway_order_id, order.order_id);
    assert_eq!(orphans[0].booking_id, Some(held.id));
    assert_eq!(orphans[0].amount_paise, 25_000);
}

#[tokio::test]
async fn orphans_can_be_resolved_by_operators_only() {
    let h = Harness::with_instant_expiry();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 2, 25_000).await;
    let (held, order) = h.order(&passenger, &ride, 1).await;
    seat_service::release_expired_holds(&h.state, Utc::now())
        .await
        .unwrap();
    let callback = h.checkout(&held, &order);
    let _ = verification_service::verify_payment(&h.state, &passenger, callback).await;

    let admin = operator();
    let orphan = reconciliation_service::list_orphans(&h.state, &admin, false)
        .await
        .unwrap()
        .remove(0);

    let denied = reconciliation_service::resolve_orphan(&h.state, &passenger, orphan.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let resolved = reconciliation_service::resolve_orphan(&h.state, &admin, orphan.id)
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert!(
        reconciliation_service::list_orphans(&h.state, &admin, false)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        reconciliation_service::list_orphans(&h.state, &admin, true)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn callback_for_unknown_order_is_rejected_and_recorded() {
    let h = Harness::new();
    let passenger = member();
    let (payment_id, signature) = h.gateway.complete_checkout("order_never_created");

    let result = verification_service::verify_payment(
        &h.state,
        &passenger,
        VerifyPaymentRequest {
            ride_id: Uuid::new_v4(),
            amount_paise: 100,
            gateway_order_id: "order_never_created".to_string(),
            gateway_payment_id: payment_id,
            gateway_signature: signature,
        },
    )
    .await;

    assert!(matches!(result, Err(AppError::UnknownOrder(_))));
    let orphans = reconciliation_service::list_orphans(&h.state, &operator(), false)
        .await
        .unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].booking_id, None);
}

#[tokio::test]
async fn bookings_are_hidden_from_unrelated_users() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let stranger = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    let booking = h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;

    let hidden = booking_service::get_booking(&h.state, &stranger, booking.id).await;
    assert!(matches!(hidden, Err(AppError::BookingNotFound)));

    // The driver sees bookings on their ride
    assert!(
        booking_service::get_booking(&h.state, &driver, booking.id)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn top_up_callback_credits_once() {
    let h = Harness::new();
    let passenger = member();
    let request = || TopUpRequest {
        amount_paise: 5_000,
        idempotency_key: "topup-once".to_string(),
        provider: Some("SIM".to_string()),
    };
    let first = wallet_service::create_topup(&h.state, &passenger, request())
        .await
        .unwrap();
    let second = wallet_service::create_topup(&h.state, &passenger, request())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    for _ in 0..2 {
        wallet_service::complete_topup(
            &h.state,
            &passenger,
            TopUpCallbackRequest {
                idempotency_key: "topup-once".to_string(),
                provider_payment_id: "sim_pay_1".to_string(),
                success: true,
            },
        )
        .await
        .unwrap();
    }

    assert_eq!(h.balance(&passenger).await, 5_000);
    assert_eq!(h.ledger_sum(&passenger).await, 5_000);
}

#[tokio::test]
async fn seat_counts_beyond_availability_are_insufficient_not_invalid() {
    let h = Harness::new();
    let driver = member();
    let first = member();
    let second = member();
    let ride = h.ride(&driver, 3, 10_000).await;
    h.book(&first, ride.id, 2, PaymentMethod::Cash).await;

    // Within the ride's size but above what is left
    let short = booking_service::create_booking(
        &h.state,
        &second,
        booking_request(ride.id, 2, PaymentMethod::Cash),
    )
    .await;
    assert!(matches!(
        short,
        Err(AppError::InsufficientSeats {
            requested: 2,
            available: 1
        })
    ));

    // Above the ride's size is never satisfiable
    let oversized = booking_service::create_booking(
        &h.state,
        &second,
        booking_request(ride.id, 4, PaymentMethod::Cash),
    )
    .await;
    assert!(matches!(oversized, Err(AppError::InvalidSeatCount(4))));
    assert_eq!(h.available_seats(ride.id).await, 1);
}

#[tokio::test]
async fn wallet_booking_credits_the_driver_less_commission() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 4, 10_000).await;
    h.fund(&passenger, 50_000).await;

    h.book(&passenger, ride.id, 2, PaymentMethod::Wallet).await;

    assert_eq!(h.earnings(&driver).await, (20_000, 18_000));
    let totals = h.store.driver_earnings(driver.user_id).await.unwrap();
    assert_eq!(totals.platform_commission_paise, 2_000);

    let driver_events: Vec<_> = h
        .notifier
        .events()
        .into_iter()
        .filter(|e| e.event_type == EventType::EarningsAdded)
        .collect();
    assert_eq!(driver_events.len(), 1);
    assert_eq!(driver_events[0].data.recipient_id, driver.user_id);
    assert_eq!(driver_events[0].data.amount_paise, Some(18_000));
}

#[tokio::test]
async fn verified_online_payment_credits_the_driver() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 25_000).await;

    let (held, order) = h.order(&passenger, &ride, 1).await;
    assert_eq!(h.earnings(&driver).await, (0, 0));

    let callback = h.checkout(&held, &order);
    let replay = VerifyPaymentRequest {
        ride_id: callback.ride_id,
        amount_paise: callback.amount_paise,
        gateway_order_id: callback.gateway_order_id.clone(),
        gateway_payment_id: callback.gateway_payment_id.clone(),
        gateway_signature: callback.gateway_signature.clone(),
    };
    verification_service::verify_payment(&h.state, &passenger, callback)
        .await
        .unwrap();
    assert_eq!(h.earnings(&driver).await, (25_000, 22_500));

    // A replayed callback credits nothing more
    verification_service::verify_payment(&h.state, &passenger, replay)
        .await
        .unwrap();
    assert_eq!(h.earnings(&driver).await, (25_000, 22_500));
    assert_eq!(h.events_of(EventType::EarningsAdded), 1);

    let entries = earnings_service::entries(&h.state, &driver).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].booking_id, held.id);
    assert_eq!(entries[0].kind, EarningKind::Credit);
}

#[tokio::test]
async fn cash_booking_credits_no_earnings() {
    let h = Harness::new();
    let driver = member();
    let passenger = member();
    let ride = h.ride(&driver, 3, 10_000).await;

    h.book(&passenger, ride.id, 1, PaymentMethod::Cash).await;

    assert_eq!(h.earnings(&driver).await, (0, 0));
    assert_eq!(h.events_of(EventType::EarningsAdded), 0);
}
