//! Business logic services.
//!
//! Services hold the booking engine's rules, separated from HTTP handlers.
//! Every operation takes the [`AppState`](crate::state::AppState) and the
//! calling [`Actor`](crate::models::actor::Actor) explicitly and talks to the
//! ledger, the gateway and the notifier only through their ports.

/// Payment coordinator: places CASH, WALLET and ONLINE bookings
pub mod booking_service;
/// Booking and ride cancellation, gateway refunds
pub mod cancellation_service;
/// Driver earnings totals and history
pub mod earnings_service;
/// Notification port and adapters
pub mod notification_service;
/// Orphaned payment listing and resolution
pub mod reconciliation_service;
/// Offering rides
pub mod ride_service;
/// Seat holds, expiry and the background sweeper
pub mod seat_service;
/// Gateway callback verification
pub mod verification_service;
/// Wallet balances and top-ups
pub mod wallet_service;
