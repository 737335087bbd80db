//! Input commitment (spec §4.4).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Canonicalise a JSON value: sort object keys lexicographically and
/// re-serialise with no insignificant whitespace. Arrays preserve order
/// (order is significant data, not formatting).
pub fn canonicalize(value: &Value) -> String {
    serde_json::to_string(&canonical_value(value)).unwrap_or_default()
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonical_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over `(card_json_canonical, conscience_values, window_context_reduced,
/// model_version, prompt_template_version)`, each field canonicalised and
/// joined with `|` — matching this codebase's own canonical-format
/// convention for hashed tuples (see `thought_chain.rs`'s
/// `compute_thought_hash`, which hashes a pipe-joined canonical string).
pub fn input_commitment(
    card_json: &Value,
    conscience_values: &[String],
    window_context_reduced: &Value,
    model_version: &str,
    prompt_template_version: &str,
) -> String {
    let canonical = format!(
        "{}|{}|{}|{}|{}",
        canonicalize(card_json),
        conscience_values.join(","),
        canonicalize(window_context_reduced),
        model_version,
        prompt_template_version,
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_sorts_object_keys() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn canonicalize_preserves_array_order() {
        let a = json!({"list": [1, 2, 3]});
        let b = json!({"list": [3, 2, 1]});
        assert_ne!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn input_commitment_is_deterministic() {
        let card = json!({"values": ["honesty"]});
        let window = json!({"size": 3});
        let a = input_commitment(&card, &["honesty".to_string()], &window, "v1", "t1");
        let b = input_commitment(&card, &["honesty".to_string()], &window, "v1", "t1");
        assert_eq!(a, b);
    }

    #[test]
    fn input_commitment_changes_with_any_field() {
        let card = json!({"values": ["honesty"]});
        let window = json!({"size": 3});
        let a = input_commitment(&card, &["honesty".to_string()], &window, "v1", "t1");
        let b = input_commitment(&card, &["honesty".to_string()], &window, "v2", "t1");
        assert_ne!(a, b);
    }
}
