//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, the caller's actor)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Orphaned payment administration
pub mod admin;
/// Booking endpoints
pub mod bookings;
/// Driver earnings endpoints
pub mod earnings;
/// Service health check
pub mod health;
/// Gateway order and verification endpoints
pub mod payments;
/// Ride endpoints
pub mod rides;
/// Wallet endpoints
pub mod wallet;
