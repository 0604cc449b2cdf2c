//! HTTP router.
//!
//! `/health` is public; every `/api` route runs behind the API key
//! middleware and receives the caller's [`Actor`](crate::models::actor::Actor).

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the application router around `state`.
pub fn router(state: AppState) -> Router {
    let authenticated_routes = Router::new()
        // Rides
        .route("/api/rides", post(handlers::rides::create_ride))
        .route(
            "/api/rides/{id}",
            get(handlers::rides::get_ride).delete(handlers::rides::cancel_ride),
        )
        .route(
            "/api/rides/{id}/bookings",
            get(handlers::rides::list_ride_bookings),
        )
        // Bookings
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/my", get(handlers::bookings::list_my_bookings))
        .route(
            "/api/bookings/{id}",
            get(handlers::bookings::get_booking).delete(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/{id}/refund",
            post(handlers::bookings::retry_refund),
        )
        // Gateway payments
        .route("/api/payments/order", post(handlers::payments::create_order))
        .route(
            "/api/payments/verify",
            post(handlers::payments::verify_payment),
        )
        // Wallet
        .route("/api/wallet", get(handlers::wallet::balance))
        .route(
            "/api/wallet/transactions",
            get(handlers::wallet::transactions),
        )
        .route("/api/wallet/topup", post(handlers::wallet::create_topup))
        .route(
            "/api/wallet/topup/callback",
            post(handlers::wallet::complete_topup),
        )
        // Driver earnings
        .route("/api/earnings", get(handlers::earnings::summary))
        .route("/api/earnings/entries", get(handlers::earnings::entries))
        // Reconciliation
        .route(
            "/api/admin/orphaned-payments",
            get(handlers::admin::list_orphans),
        )
        .route(
            "/api/admin/orphaned-payments/{id}/resolve",
            post(handlers::admin::resolve_orphan),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
