//! HMAC-SHA256 signatures for gateway callbacks and outgoing webhooks.
//!
//! # Callback Format
//!
//! The gateway signs `"<order_id>|<payment_id>"` with the merchant secret and
//! sends the lowercase hex digest. Verification recomputes the MAC and uses
//! [`Mac::verify_slice`], which compares in constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::gateway::Verification;

type HmacSha256 = Hmac<Sha256>;

fn callback_message(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid")
}

/// Signature the gateway attaches to a completed payment.
pub fn sign_payment(secret: &str, order_id: &str, payment_id: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(callback_message(order_id, payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a payment callback signature.
///
/// Malformed hex is treated the same as a mismatch.
pub fn verify_payment(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Verification {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return Verification::Invalid;
    };

    let mut mac = mac_for(secret);
    mac.update(callback_message(order_id, payment_id).as_bytes());
    match mac.verify_slice(&provided) {
        Ok(()) => Verification::Verified,
        Err(_) => Verification::Invalid,
    }
}

/// Generate HMAC-SHA256 signature for a webhook body.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
pub fn sign_webhook(secret: &str, payload: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
