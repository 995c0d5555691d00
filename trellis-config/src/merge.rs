//! Recursive replace merge used to combine application and module config.
//!
//! Objects and arrays are both treated as keyed maps (array index = key), so
//! a module can override the application's entry at position `1000` whether
//! either side was written as a table or a list.

use serde_json::{Map, Value};

/// View a value as a keyed map, if it is an object or an array.
pub fn as_keyed(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
        ),
        _ => None,
    }
}

fn is_keyed(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Merge `over` into `base`, returning a new value.
///
/// At equal keys the value from `over` wins; when both sides hold maps they
/// are merged recursively. Keys present only in `base` are preserved. When
/// either side is a scalar, `over` replaces `base` wholesale.
pub fn merge_replace_recursive(base: &Value, over: &Value) -> Value {
    let (Some(mut merged), Some(overrides)) = (as_keyed(base), as_keyed(over)) else {
        return over.clone();
    };

    for (key, value) in overrides {
        let next = match merged.get(&key) {
            Some(existing) if is_keyed(existing) && is_keyed(&value) => {
                merge_replace_recursive(existing, &value)
            }
            _ => value,
        };
        merged.insert(key, next);
    }

    Value::Object(merged)
}
