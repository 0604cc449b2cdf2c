//! Wallet service - prepaid balances and top-ups.
//!
//! Money enters a wallet only through a completed top-up and leaves it only
//! through a booking debit; cancellations credit it back. All three write a
//! [`WalletTransaction`] in the same ledger unit as the balance change.

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::wallet::{
    NewTopUp, TopUpCallbackRequest, TopUpRequest, TopUpStatus, WalletAccount, WalletTopUp,
    WalletTransaction,
};
use crate::state::AppState;

const DEFAULT_PROVIDER: &str = "SIM";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Start a wallet top-up for `actor`.
///
/// The top-up stays CREATED until the provider callback completes it. A
/// repeated idempotency key returns the top-up created the first time.
///
/// # Errors
///
/// - `InvalidRequest`: non-positive amount, malformed key, or a key already
///   used for a different top-up
pub async fn create_topup(
    state: &AppState,
    actor: &Actor,
    request: TopUpRequest,
) -> Result<WalletTopUp, AppError> {
    if request.amount_paise <= 0 {
        return Err(AppError::InvalidRequest(
            "Top-up amount must be positive".to_string(),
        ));
    }
    let key = request.idempotency_key.trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::InvalidRequest(
            "idempotencyKey must be 1-255 characters".to_string(),
        ));
    }

    let topup = state
        .store
        .insert_topup(NewTopUp {
            owner_id: actor.user_id,
            amount_paise: request.amount_paise,
            currency: state.gateway.currency().to_string(),
            provider: request
                .provider
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            idempotency_key: key.to_string(),
        })
        .await?;

    if topup.owner_id != actor.user_id || topup.amount_paise != request.amount_paise {
        return Err(AppError::InvalidRequest(
            "idempotencyKey already used for a different top-up".to_string(),
        ));
    }

    tracing::info!(
        topup_id = %topup.id,
        owner_id = %topup.owner_id,
        amount_paise = topup.amount_paise,
        provider = %topup.provider,
        "wallet top-up created"
    );
    Ok(topup)
}

/// Complete a top-up from the provider's callback.
///
/// Only CREATED top-ups change; completing one again returns it unchanged,
/// so the wallet is credited at most once.
///
/// # Errors
///
/// - `TopUpNotFound`: unknown key, or a top-up of another user
pub async fn complete_topup(
    state: &AppState,
    actor: &Actor,
    request: TopUpCallbackRequest,
) -> Result<WalletTopUp, AppError> {
    let topup = state
        .store
        .find_topup_by_key(&request.idempotency_key)
        .await?
        .ok_or(AppError::TopUpNotFound)?;
    if topup.owner_id != actor.user_id && !actor.is_operator() {
        return Err(AppError::TopUpNotFound);
    }

    let completed = state
        .store
        .complete_topup(
            &request.idempotency_key,
            &request.provider_payment_id,
            request.success,
        )
        .await?;

    match completed.status {
        TopUpStatus::Succeeded => tracing::info!(
            topup_id = %completed.id,
            owner_id = %completed.owner_id,
            amount_paise = completed.amount_paise,
            "wallet credited"
        ),
        TopUpStatus::Failed => tracing::warn!(topup_id = %completed.id, "wallet top-up failed"),
        TopUpStatus::Created => {}
    }
    Ok(completed)
}

pub async fn balance(state: &AppState, actor: &Actor) -> Result<WalletAccount, AppError> {
    state.store.wallet_account(actor.user_id).await
}

/// Wallet history of `actor`, newest first.
pub async fn transactions(
    state: &AppState,
    actor: &Actor,
) -> Result<Vec<WalletTransaction>, AppError> {
    state.store.wallet_transactions(actor.user_id).await
}
