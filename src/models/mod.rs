//! Data models for the booking ledger.
//!
//! Domain entities, API request/response types and notification events.
//! Status fields are closed enums stored as upper-case text in the ledger.

/// Declares a closed enum persisted and serialized as upper-case text.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::AppError::Internal(format!(
                        "unknown {} value: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

/// Request-scoped identity and API key records
pub mod actor;
/// Seat bookings and the booking state machine
pub mod booking;
/// Driver earnings and platform commission
pub mod earnings;
/// Events handed to the notification port
pub mod event;
/// Gateway payments and refund tracking
pub mod payment;
/// Orphaned payment reconciliation records
pub mod reconciliation;
/// Rides and their seat inventory
pub mod ride;
/// Wallet accounts, transactions and top-ups
pub mod wallet;
