//! Persistent identifier formats (spec §6).
//!
//! IDs are derived, not parsed: collisions over an 8-character random
//! suffix are possible but negligible across short windows, and upsert
//! semantics at the store neutralise the risk.

use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random lowercase-alphanumeric suffix of the given length.
fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

pub fn agent_id(hash8: &str) -> String {
    format!("smolt-{}", hash8)
}

pub fn checkpoint_id() -> String {
    format!("ic-{}", random_suffix(8))
}

pub fn trace_id() -> String {
    format!("tr-{}", random_suffix(8))
}

pub fn event_id() -> String {
    format!("evt-{}", random_suffix(8))
}

pub fn webhook_endpoint_id() -> String {
    format!("whe-{}", random_suffix(8))
}

pub fn webhook_delivery_id() -> String {
    format!("whd-{}", random_suffix(8))
}

pub fn nudge_id() -> String {
    format!("nudge-{}", random_suffix(8))
}

pub fn delivery_id() -> String {
    format!("del-{}", random_suffix(12))
}

pub fn usage_event_id() -> String {
    format!("ue-{}", random_suffix(8))
}

pub fn metering_event_id() -> String {
    format!("me-{}", random_suffix(8))
}
