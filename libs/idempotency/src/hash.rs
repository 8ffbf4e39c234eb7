//! Canonical JSON hashing for idempotency payload comparison.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical JSON encoding (object keys sorted recursively),
/// hex-encoded.
pub fn payload_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).unwrap_or_default(),
                        canonical_string(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let fields: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", fields.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"delta": 5, "sku": "A"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"sku": "A", "delta": 5}"#).unwrap();
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn different_values_hash_differently() {
        assert_ne!(
            payload_hash(&json!({"delta": 5})),
            payload_hash(&json!({"delta": 6}))
        );
    }

    #[test]
    fn nested_objects_are_canonicalized() {
        let a = json!({"outer": {"b": 1, "a": 2}, "list": [1, 2]});
        let b = json!({"list": [1, 2], "outer": {"a": 2, "b": 1}});
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn array_order_matters() {
        assert_ne!(
            payload_hash(&json!([1, 2])),
            payload_hash(&json!([2, 1]))
        );
    }
}
