//! API key authentication middleware.
//!
//! This middleware intercepts every `/api` request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and resolve it to an active key in the ledger
//! 3. Inject the caller's [`Actor`] into the request
//! 4. Reject unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::actor::{Actor, ApiKey};
use crate::state::AppState;

/// API key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Look up an active key with that hash
/// 4. If found: inject the [`Actor`] into request extensions, call next handler
/// 5. If not found: return 401 Unauthorized error
///
/// # Headers
///
/// ```text
/// Authorization: Bearer rbk_live_7f3a...
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated (calls next handler)
/// - `Err(AppError::InvalidApiKey)` if authentication fails (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AppError::InvalidApiKey)?;

    let actor: Actor = state
        .store
        .find_actor_by_key_hash(&ApiKey::hash(api_key))
        .await?
        .ok_or(AppError::InvalidApiKey)?;

    // Handlers extract this with Extension<Actor>
    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}
