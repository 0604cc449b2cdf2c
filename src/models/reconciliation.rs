//! Orphaned payment records.
//!
//! An orphaned payment is one the gateway verified (money moved) whose
//! booking commit did not complete. These rows are the work queue for
//! reconciliation tooling and are never deleted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Maps directly to the `orphaned_payments` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrphanedPayment {
    pub id: Uuid,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,

    /// One orphan record per gateway order
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub amount_paise: i64,
    pub reason: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewOrphanedPayment {
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub amount_paise: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedPaymentResponse {
    pub id: Uuid,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub amount_paise: i64,
    pub reason: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<OrphanedPayment> for OrphanedPaymentResponse {
    fn from(o: OrphanedPayment) -> Self {
        Self {
            id: o.id,
            payment_id: o.payment_id,
            booking_id: o.booking_id,
            gateway_order_id: o.gateway_order_id,
            gateway_payment_id: o.gateway_payment_id,
            amount_paise: o.amount_paise,
            reason: o.reason,
            resolved: o.resolved,
            created_at: o.created_at,
            resolved_at: o.resolved_at,
        }
    }
}
