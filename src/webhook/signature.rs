//! HMAC-SHA256 webhook signing (spec §4.7).
//!
//! Follows the same `Hmac<Sha256>` + `hex::encode` + constant-time
//! comparison pattern as this codebase's API key request signing, with
//! `subtle::ConstantTimeEq` guarding the verification path against timing
//! attacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// `"v1=" + hex(HMAC-SHA256(secret, timestamp_seconds + "." + raw_body))`.
pub fn sign(secret: &str, timestamp_seconds: i64, raw_body: &str) -> String {
    let message = format!("{}.{}", timestamp_seconds, raw_body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message.as_bytes());
    format!("v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `v1=<hex>` signature in constant time. A subscriber performs
/// the mirror image of this; it is exposed here mainly so the delivery
/// module's tests can round-trip without duplicating the format.
pub fn verify(secret: &str, timestamp_seconds: i64, raw_body: &str, signature: &str) -> bool {
    let expected = sign(secret, timestamp_seconds, raw_body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// The recommended tolerance subscribers should apply to `timestamp_seconds`
/// (spec §4.7: "±300 s").
pub const RECOMMENDED_TOLERANCE_SECONDS: i64 = 300;
