//! JSON merge-patch semantics for `upsert_trade` (§4.6): "missing keys in
//! `patch` leave existing values unchanged; explicit nulls erase."
//! Equivalent to RFC 7396 restricted to object-level patches (no special
//! handling needed for arrays — Trade has none).

use serde_json::{Map, Value};

pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target_map), Some(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    target_map.remove(key);
                } else {
                    let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                    if entry.is_object() && patch_value.is_object() {
                        merge_patch(entry, patch_value);
                    } else {
                        *entry = patch_value.clone();
                    }
                }
            }
        }
        _ => {
            if let Some(patch_map) = patch.as_object() {
                *target = Value::Object(patch_map.clone());
            } else {
                *target = patch.clone();
            }
        }
    }
}

/// Starting point for a brand-new trade row: an empty JSON object that
/// `merge_patch` will fill in field-by-field.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_are_left_unchanged() {
        let mut target = json!({"a": 1, "b": 2});
        merge_patch(&mut target, &json!({"a": 10}));
        assert_eq!(target, json!({"a": 10, "b": 2}));
    }

    #[test]
    fn explicit_null_erases_the_key() {
        let mut target = json!({"a": 1, "b": 2});
        merge_patch(&mut target, &json!({"b": null}));
        assert_eq!(target, json!({"a": 1}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let mut target = json!({"terms": {"btc_sats": 1, "usdt_amount": "1"}});
        merge_patch(&mut target, &json!({"terms": {"btc_sats": 2}}));
        assert_eq!(target, json!({"terms": {"btc_sats": 2, "usdt_amount": "1"}}));
    }
}
