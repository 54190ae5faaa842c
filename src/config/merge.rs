//! Deep merge functionality for task configurations.
//!
//! Two flavours:
//! - `defaults_deep`: the first source that sets a key wins (config inheritance)
//! - `deep_merge`: the overlay wins (settings tiers)
//!
//! In both, arrays are replaced entirely, never spliced element by element.

use serde_json::{Map, Value};

/// Fill `target` with keys from `source` that `target` does not set yet.
///
/// - Objects present on both sides are filled recursively
/// - Any other value already in `target` is kept, including arrays and nulls
/// - A non-object `target` is returned unchanged
///
/// # Example
/// ```
/// use serde_json::json;
/// use task_chef::config::defaults_deep;
///
/// let child = json!({ "dest": { "path": "lib" }, "globs": ["a"] });
/// let parent = json!({ "dest": { "path": "dist", "mode": 420 }, "globs": ["b", "c"] });
/// let result = defaults_deep(child, &parent);
/// // Result: { "dest": { "path": "lib", "mode": 420 }, "globs": ["a"] }
/// ```
pub fn defaults_deep(target: Value, source: &Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            fill_map(&mut target_map, source_map);
            Value::Object(target_map)
        }
        (target, _) => target,
    }
}

/// Fold `defaults_deep` over sources in priority order (highest first).
pub fn defaults_deep_all<'a>(sources: impl IntoIterator<Item = &'a Value>) -> Value {
    sources
        .into_iter()
        .fold(Value::Object(Map::new()), defaults_deep)
}

fn fill_map(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, source_value) in source {
        match target.get_mut(key) {
            Some(Value::Object(target_child)) => {
                if let Value::Object(source_child) = source_value {
                    fill_map(target_child, source_child);
                }
            }
            Some(_) => {}
            None => {
                target.insert(key.clone(), source_value.clone());
            }
        }
    }
}

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans, nulls are replaced entirely
/// - If overlay is null, the base value is preserved (null means "not specified")
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        // Both are objects: merge recursively
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        // Overlay is null: preserve base (null means "not specified")
        (base, Value::Null) => base,
        // Any other case: overlay replaces base entirely
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
