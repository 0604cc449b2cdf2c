//! Ride booking and payment reconciliation engine.
//!
//! Drivers offer rides with a fixed number of seats; passengers book seats
//! paying in cash, from a prepaid wallet, or through a payment gateway. The
//! engine guarantees that seats are never oversold, that wallet money is
//! conserved, and that every gateway payment ends up either attached to a
//! booking or in the reconciliation ledger.
//!
//! # Layout
//!
//! - [`store`]: the ledger port with PostgreSQL and in-memory backends
//! - [`gateway`]: the payment gateway port with HTTP and simulated adapters
//! - [`services`]: booking, verification, cancellation and wallet rules
//! - [`handlers`] / [`routes`]: the JSON HTTP surface

#[macro_use]
pub mod models;

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
