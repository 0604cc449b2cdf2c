//! Operator access to orphaned payments.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::reconciliation::OrphanedPayment;
use crate::state::AppState;

fn require_operator(actor: &Actor) -> Result<(), AppError> {
    if actor.is_operator() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "orphaned payments are visible to operators only".to_string(),
        ))
    }
}

/// Orphaned payments, unresolved only unless `include_resolved` is set.
pub async fn list_orphans(
    state: &AppState,
    actor: &Actor,
    include_resolved: bool,
) -> Result<Vec<OrphanedPayment>, AppError> {
    require_operator(actor)?;
    state.store.list_orphans(include_resolved).await
}

/// Mark an orphan resolved once an operator has refunded or re-booked it.
///
/// # Errors
///
/// - `Forbidden`: `actor` is not an operator
/// - `OrphanNotFound`
pub async fn resolve_orphan(
    state: &AppState,
    actor: &Actor,
    orphan_id: Uuid,
) -> Result<OrphanedPayment, AppError> {
    require_operator(actor)?;
    let orphan = state.store.resolve_orphan(orphan_id).await?;
    tracing::info!(
        target: "reconciliation",
        %orphan_id,
        order_id = %orphan.gateway_order_id,
        resolved_by = %actor.user_id,
        "orphaned payment resolved"
    );
    Ok(orphan)
}
