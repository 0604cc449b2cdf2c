//! HTTP middleware components.
//!
//! Middleware run before route handlers. The engine uses one: API key
//! authentication, which resolves the caller to an
//! [`Actor`](crate::models::actor::Actor) or short-circuits with 401.

/// API key authentication middleware
pub mod auth;
