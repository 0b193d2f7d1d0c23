//! Canonical Codec (C1).
//!
//! Produces a byte-for-byte reproducible JSON encoding of any JSON-compatible
//! value: mapping keys in lexicographic (Unicode code-point) order,
//! sequences in position order, and no insignificant whitespace. This is the
//! exact pre-image used both for signing (§4.2) and for content hashing
//! (`rfq_id`, `quote_id`, `terms_hash` — §6).
//!
//! Rust's `String`/`str` ordering is already a byte-wise comparison of the
//! UTF-8 encoding, which coincides with Unicode code-point order for valid
//! UTF-8, so a plain `BTreeMap` reconstruction of any `serde_json::Map`
//! gives us the required key order for free.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serializes `value` into its canonical byte representation.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 of the canonical encoding, as lowercase hex. Used for
/// `rfq_id` / `quote_id` / `terms_hash` content hashes.
pub fn content_hash_hex(value: &Value) -> String {
    let bytes = canonical_bytes(value);
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => {
            // serde_json's string serialization already produces the minimal
            // escaped JSON string form we want.
            out.extend_from_slice(serde_json::to_string(s).expect("string always encodes").as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push(b'{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(serde_json::to_string(k).expect("string always encodes").as_bytes());
                out.push(b':');
                write_canonical(v, out);
            }
            out.push(b'}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let a = json!({"b": 1, "a": 2, "c": 3});
        let b = json!({"c": 3, "a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        assert_eq!(canonical_bytes(&a), br#"{"a":2,"b":1,"c":3}"#.to_vec());
    }

    #[test]
    fn preserves_array_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_bytes(&v), b"[3,1,2]".to_vec());
    }

    #[test]
    fn no_insignificant_whitespace() {
        let v = json!({"nested": {"x": [1, 2], "y": "z"}});
        let bytes = canonical_bytes(&v);
        assert!(!bytes.iter().any(|b| b.is_ascii_whitespace()));
    }

    #[test]
    fn nested_key_order_is_recursive() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    #[test]
    fn content_hash_is_deterministic_under_permutation() {
        let a = json!({"v": 1, "kind": "swap.rfq", "body": {"b": 2, "a": 1}});
        let b = json!({"kind": "swap.rfq", "body": {"a": 1, "b": 2}, "v": 1});
        assert_eq!(content_hash_hex(&a), content_hash_hex(&b));
    }
}
