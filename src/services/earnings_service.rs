//! Driver earnings, credited and reversed by the ledger as bookings are paid
//! and cancelled.

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::earnings::{DriverEarnings, EarningEntry};
use crate::state::AppState;

/// Earnings totals of the calling driver.
pub async fn summary(state: &AppState, actor: &Actor) -> Result<DriverEarnings, AppError> {
    state.store.driver_earnings(actor.user_id).await
}

/// Earning entries of the calling driver, newest first.
pub async fn entries(state: &AppState, actor: &Actor) -> Result<Vec<EarningEntry>, AppError> {
    state.store.earning_entries(actor.user_id).await
}
