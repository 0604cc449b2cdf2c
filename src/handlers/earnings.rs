//! Driver earnings HTTP handlers.
//!
//! - GET /api/earnings - Totals of the calling driver
//! - GET /api/earnings/entries - Earning history

use axum::{Extension, Json, extract::State};

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::earnings::{EarningEntryResponse, EarningsResponse};
use crate::services::earnings_service;
use crate::state::AppState;

/// Earnings of the calling driver.
///
/// # Response (200)
///
/// ```json
/// {
///   "totalEarningsPaise": 40000,
///   "pendingPayoutPaise": 36000,
///   "platformCommissionPaise": 4000,
///   "commissionPercentage": 10
/// }
/// ```
pub async fn summary(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<EarningsResponse>, AppError> {
    let earnings = earnings_service::summary(&state, &actor).await?;
    Ok(Json(earnings.into()))
}

pub async fn entries(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<EarningEntryResponse>>, AppError> {
    let entries = earnings_service::entries(&state, &actor).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
