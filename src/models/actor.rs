//! Request-scoped identity.
//!
//! API keys are issued by the identity service outside this engine and stored
//! here as SHA-256 hashes. The auth middleware resolves a key to an [`Actor`],
//! which every core operation receives explicitly.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

text_enum! {
    /// What an authenticated caller may do beyond acting on their own records.
    pub enum ActorRole {
        /// Passenger or driver acting on their own rides and bookings
        Member => "MEMBER",
        /// Support staff: may cancel any ride or booking and resolve orphans
        Operator => "OPERATOR",
    }
}

/// Represents an API key record from the ledger.
///
/// # Database Table
///
/// Maps to the `api_keys` table:
/// - `key_hash`: SHA-256 hash of the actual API key (64 hex characters)
/// - `user_id`: user the key authenticates as
/// - `role`: [`ActorRole`] text
/// - `is_active`: inactive keys are rejected during authentication
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: Uuid,
    pub key_hash: String,
    pub user_id: Uuid,
    pub role: ActorRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// SHA-256 hex digest under which a raw key is stored.
    pub fn hash(raw_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// The authenticated caller of a request.
///
/// Inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn member(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Member,
        }
    }

    pub fn operator(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: ActorRole::Operator,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.role == ActorRole::Operator
    }
}
