//! Wallet HTTP handlers.
//!
//! - POST /api/wallet/topup - Start a top-up
//! - POST /api/wallet/topup/callback - Provider completes a top-up
//! - GET /api/wallet - Current balance
//! - GET /api/wallet/transactions - Wallet history

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::wallet::{
    BalanceResponse, TopUpCallbackRequest, TopUpRequest, TopUpResponse,
    WalletTransactionResponse,
};
use crate::services::wallet_service;
use crate::state::AppState;

/// Start a wallet top-up.
///
/// # Request Body
///
/// ```json
/// { "amountPaise": 50000, "idempotencyKey": "topup-1", "provider": "SIM" }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "id": "...", "amountPaise": 50000, "provider": "SIM", "status": "CREATED", "createdAt": "..." }
/// ```
pub async fn create_topup(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<TopUpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let topup = wallet_service::create_topup(&state, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(TopUpResponse::from(topup))))
}

/// Complete a top-up.
///
/// # Request Body
///
/// ```json
/// { "idempotencyKey": "topup-1", "providerPaymentId": "sim_pay_1", "success": true }
/// ```
pub async fn complete_topup(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<TopUpCallbackRequest>,
) -> Result<Json<TopUpResponse>, AppError> {
    let topup = wallet_service::complete_topup(&state, &actor, request).await?;
    Ok(Json(topup.into()))
}

pub async fn balance(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account = wallet_service::balance(&state, &actor).await?;
    Ok(Json(BalanceResponse {
        balance: account.balance_paise,
    }))
}

pub async fn transactions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<WalletTransactionResponse>>, AppError> {
    let entries = wallet_service::transactions(&state, &actor).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
