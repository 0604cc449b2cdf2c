//! Wallet data models and API request/response types.
//!
//! # Conservation
//!
//! A wallet's `balance_paise` always equals the sum of its transactions'
//! signed amounts. Every balance change is written together with the
//! transaction that explains it, in the same atomic unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum WalletReason {
        Topup => "TOPUP",
        DebitBooking => "DEBIT_BOOKING",
        CreditRefund => "CREDIT_REFUND",
    }
}

text_enum! {
    pub enum TopUpStatus {
        Created => "CREATED",
        Succeeded => "SUCCESS",
        Failed => "FAILED",
    }
}

/// Prepaid balance of one user, in paise.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WalletAccount {
    pub owner_id: Uuid,
    pub balance_paise: i64,
    pub updated_at: DateTime<Utc>,
}

/// One signed movement of wallet money.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub owner_id: Uuid,

    /// Signed amount in paise: negative for debits
    pub amount_paise: i64,
    pub reason: WalletReason,
    pub booking_id: Option<Uuid>,

    /// Caller-independent key, unique across the ledger
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Debit applied in the same atomic unit as a WALLET booking's reservation.
#[derive(Debug, Clone)]
pub struct WalletDebit {
    pub owner_id: Uuid,
    pub amount_paise: i64,
    pub idempotency_key: String,
}

impl WalletDebit {
    pub fn for_booking(owner_id: Uuid, booking_id: Uuid, amount_paise: i64) -> Self {
        Self {
            owner_id,
            amount_paise,
            idempotency_key: debit_key(booking_id),
        }
    }
}

pub fn debit_key(booking_id: Uuid) -> String {
    format!("booking:{booking_id}:debit")
}

pub fn refund_key(booking_id: Uuid) -> String {
    format!("booking:{booking_id}:refund")
}

pub fn topup_key(topup_id: Uuid) -> String {
    format!("topup:{topup_id}")
}

/// A request to add money to a wallet through a payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTopUp {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub amount_paise: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_id: Option<String>,
    pub status: TopUpStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTopUp {
    pub owner_id: Uuid,
    pub amount_paise: i64,
    pub currency: String,
    pub provider: String,
    pub idempotency_key: String,
}

/// Request body for a wallet top-up.
///
/// ```json
/// { "amountPaise": 50000, "idempotencyKey": "topup-2026-10-16-1", "provider": "SIM" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub amount_paise: i64,
    pub idempotency_key: String,
    pub provider: Option<String>,
}

/// Provider callback completing a top-up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpCallbackRequest {
    pub idempotency_key: String,
    pub provider_payment_id: String,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    pub id: Uuid,
    pub amount_paise: i64,
    pub provider: String,
    pub status: TopUpStatus,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTopUp> for TopUpResponse {
    fn from(topup: WalletTopUp) -> Self {
        Self {
            id: topup.id,
            amount_paise: topup.amount_paise,
            provider: topup.provider,
            status: topup.status,
            created_at: topup.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// One row of the wallet history as the client renders it.
///
/// ```json
/// { "id": "...", "amount": -20000, "type": "DEBIT_BOOKING", "date": "2026-10-16T10:00:00Z" }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub amount: i64,
    #[serde(rename = "type")]
    pub reason: WalletReason,
    pub date: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionResponse {
    fn from(tx: WalletTransaction) -> Self {
        Self {
            id: tx.id,
            amount: tx.amount_paise,
            reason: tx.reason,
            date: tx.created_at,
        }
    }
}
