//! Operator endpoints for orphaned payments.
//!
//! - GET /api/admin/orphaned-payments?includeResolved=true
//! - POST /api/admin/orphaned-payments/{id}/resolve

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::reconciliation::OrphanedPaymentResponse;
use crate::services::reconciliation_service;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanQuery {
    #[serde(default)]
    pub include_resolved: bool,
}

/// List orphaned payments, newest first.
///
/// # Response (200)
///
/// ```json
/// [
///   {
///     "id": "...",
///     "bookingId": "...",
///     "gatewayOrderId": "order_...",
///     "gatewayPaymentId": "pay_...",
///     "amountPaise": 25000,
///     "reason": "booking ... is CANCELLED",
///     "resolved": false
///   }
/// ]
/// ```
pub async fn list_orphans(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<OrphanQuery>,
) -> Result<Json<Vec<OrphanedPaymentResponse>>, AppError> {
    let orphans =
        reconciliation_service::list_orphans(&state, &actor, query.include_resolved).await?;
    Ok(Json(orphans.into_iter().map(Into::into).collect()))
}

pub async fn resolve_orphan(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(orphan_id): Path<Uuid>,
) -> Result<Json<OrphanedPaymentResponse>, AppError> {
    let orphan = reconciliation_service::resolve_orphan(&state, &actor, orphan_id).await?;
    Ok(Json(orphan.into()))
}
