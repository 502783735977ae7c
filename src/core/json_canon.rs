//! Canonical JSON encoder for archive-embedded metadata.
//!
//! Identical metadata must encode to identical bytes regardless of map
//! iteration order, so object keys are sorted recursively and no
//! insignificant whitespace is emitted. None of the persisted types carry
//! floats, so no non-finite guard is needed here.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Serialize a value to canonical JSON bytes.
pub fn to_canon_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| Error::InvalidContainer(format!("json encode failed: {}", e)))?;
    let canon = canon_value(value);
    serde_json::to_vec(&canon)
        .map_err(|e| Error::InvalidContainer(format!("json encode failed: {}", e)))
}

fn canon_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut canon = Map::new();
            for (key, value) in entries {
                canon.insert(key, canon_value(value));
            }
            Value::Object(canon)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canon_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn sorts_keys_recursively_without_whitespace() {
        let value = json!({
            "b": 1,
            "a": {"d": 4, "c": 3},
            "aa": [{"z": 1, "y": 2}]
        });
        let bytes = to_canon_json_bytes(&value).unwrap();
        assert_eq!(bytes, br#"{"a":{"c":3,"d":4},"aa":[{"y":2,"z":1}],"b":1}"#);
    }

    #[test]
    fn hashmap_order_does_not_leak_into_encoding() {
        let mut a = HashMap::new();
        a.insert("b".to_string(), 2u32);
        a.insert("a".to_string(), 1u32);
        let mut b = HashMap::new();
        b.insert("a".to_string(), 1u32);
        b.insert("b".to_string(), 2u32);
        assert_eq!(
            to_canon_json_bytes(&a).unwrap(),
            to_canon_json_bytes(&b).unwrap()
        );
    }
}
