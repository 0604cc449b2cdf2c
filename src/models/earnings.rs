//! Driver earnings ledger.
//!
//! Every paid booking credits its ride owner with the fare minus the platform
//! commission, in the same atomic unit that marks the booking PAID. Cancelling
//! a paid booking posts the exact opposite entry, so a driver's totals always
//! equal the sum of their entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Share of every paid fare kept by the platform.
pub const PLATFORM_COMMISSION_PERCENT: i64 = 10;

text_enum! {
    pub enum EarningKind {
        /// Fare of a paid booking credited to the driver
        Credit => "BOOKING_EARNING",
        /// Earning taken back when the booking is cancelled
        Reversal => "BOOKING_REVERSAL",
    }
}

/// How a gross fare divides between the driver and the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarningSplit {
    pub gross_paise: i64,
    pub commission_paise: i64,
    pub net_paise: i64,
}

impl EarningSplit {
    /// Split `gross_paise`; the commission is rounded down in the driver's favour.
    pub fn of(gross_paise: i64) -> Self {
        let commission_paise = gross_paise * PLATFORM_COMMISSION_PERCENT / 100;
        Self {
            gross_paise,
            commission_paise,
            net_paise: gross_paise - commission_paise,
        }
    }

    pub fn negated(self) -> Self {
        Self {
            gross_paise: -self.gross_paise,
            commission_paise: -self.commission_paise,
            net_paise: -self.net_paise,
        }
    }
}

/// Running totals of one driver, in paise.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DriverEarnings {
    pub driver_id: Uuid,

    /// Gross fares of paid bookings, commission included
    pub total_earnings_paise: i64,

    /// Driver's share not yet paid out
    pub pending_payout_paise: i64,
    pub platform_commission_paise: i64,
    pub updated_at: DateTime<Utc>,
}

impl DriverEarnings {
    pub fn empty(driver_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            driver_id,
            total_earnings_paise: 0,
            pending_payout_paise: 0,
            platform_commission_paise: 0,
            updated_at: now,
        }
    }

    /// Move the totals by one entry's signed amounts.
    pub fn apply(&mut self, split: EarningSplit, now: DateTime<Utc>) {
        self.total_earnings_paise += split.gross_paise;
        self.pending_payout_paise += split.net_paise;
        self.platform_commission_paise += split.commission_paise;
        self.updated_at = now;
    }
}

/// One signed movement of a driver's earnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningEntry {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub booking_id: Uuid,
    pub kind: EarningKind,

    /// Signed amounts: negative for reversals
    pub gross_paise: i64,
    pub commission_paise: i64,
    pub net_paise: i64,

    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl EarningEntry {
    pub fn split(&self) -> EarningSplit {
        EarningSplit {
            gross_paise: self.gross_paise,
            commission_paise: self.commission_paise,
            net_paise: self.net_paise,
        }
    }
}

pub fn earning_key(booking_id: Uuid) -> String {
    format!("booking:{booking_id}:earning")
}

pub fn reversal_key(booking_id: Uuid) -> String {
    format!("booking:{booking_id}:earning:reversal")
}

/// Driver earnings as the dashboard shows them.
///
/// ```json
/// {
///   "totalEarningsPaise": 40000,
///   "pendingPayoutPaise": 36000,
///   "platformCommissionPaise": 4000,
///   "commissionPercentage": 10
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub total_earnings_paise: i64,
    pub pending_payout_paise: i64,
    pub platform_commission_paise: i64,
    pub commission_percentage: i64,
}

impl From<DriverEarnings> for EarningsResponse {
    fn from(earnings: DriverEarnings) -> Self {
        Self {
            total_earnings_paise: earnings.total_earnings_paise,
            pending_payout_paise: earnings.pending_payout_paise,
            platform_commission_paise: earnings.platform_commission_paise,
            commission_percentage: PLATFORM_COMMISSION_PERCENT,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningEntryResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    #[serde(rename = "type")]
    pub kind: EarningKind,
    pub gross_paise: i64,
    pub commission_paise: i64,
    pub net_paise: i64,
    pub date: DateTime<Utc>,
}

impl From<EarningEntry> for EarningEntryResponse {
    fn from(entry: EarningEntry) -> Self {
        Self {
            id: entry.id,
            booking_id: entry.booking_id,
            kind: entry.kind,
            gross_paise: entry.gross_paise,
            commission_paise: entry.commission_paise,
            net_paise: entry.net_paise,
            date: entry.created_at,
        }
    }
}
