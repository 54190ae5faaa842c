//! Deferred config realization.
//!
//! A task's static config is captured at build time, but parts of it can only
//! be known when a parent injects config at invocation. Realization is a
//! two-pass algorithm: merge first, then substitute `{{identifier}}` markers
//! using the fully merged map as the lookup table.

use super::merge::defaults_deep_all;
use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{([\s\S]+?)\}\}").ok());

/// A config leaf computed from the merged config at realization time.
pub type ComputeFn = Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

/// Lowest-priority config for realization: plain values plus computed leaves.
#[derive(Clone, Default)]
pub struct Defaults {
    pub values: Value,
    /// Dotted path -> function evaluated against the merged config.
    pub computed: Vec<(String, ComputeFn)>,
}

impl fmt::Debug for Defaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<&str> = self.computed.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("Defaults")
            .field("values", &self.values)
            .field("computed", &paths)
            .finish()
    }
}

impl Defaults {
    pub fn new(values: Value) -> Self {
        Self {
            values,
            computed: Vec::new(),
        }
    }

    /// Add a computed leaf at a dotted path (`"dest.path"`).
    pub fn compute<F>(mut self, path: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.computed.push((path.into(), Arc::new(func)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.computed.is_empty() && self.values.as_object().is_none_or(Map::is_empty)
    }
}

/// Realize a task config for one invocation.
///
/// Priority: `original` (the task's static config), then `injected` (from the
/// invoking parent), then `defaults`. Placeholders look up top-level keys of
/// the merged config only; missing or falsy values leave the bare identifier.
/// Computed leaves see the merged config before substitution and fill only
/// paths the merged config leaves absent.
pub fn realize(original: &Value, injected: &Value, defaults: &Defaults) -> Value {
    let merged = defaults_deep_all([original, injected, &defaults.values]);
    let values = match merged {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let computed: Vec<(&str, Value)> = defaults
        .computed
        .iter()
        .map(|(path, func)| (path.as_str(), func(&values)))
        .collect();

    let mut realized = substitute_map(&values, &values);
    for (path, value) in computed {
        insert_absent(&mut realized, path, value);
    }
    Value::Object(realized)
}

/// Replace every `{{identifier}}` in `text` from `values`.
pub fn interpolate(text: &str, values: &Map<String, Value>) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return text.to_string();
    };
    placeholder
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match values.get(name) {
                Some(value) if is_truthy(value) => display(value),
                _ => name.to_string(),
            }
        })
        .into_owned()
}

fn substitute(value: &Value, values: &Map<String, Value>) -> Value {
    match value {
        Value::String(text) => Value::String(interpolate(text, values)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, values)).collect()),
        Value::Object(map) => Value::Object(substitute_map(map, values)),
        other => other.clone(),
    }
}

fn substitute_map(map: &Map<String, Value>, values: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), substitute(v, values)))
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(","),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Insert `value` at a dotted path unless something is already there.
fn insert_absent(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = map;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.entry(segment).or_insert(value);
            return;
        }
        let next = current
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
        match next {
            Value::Object(child) => current = child,
            // A scalar already occupies a prefix of the path
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholder_pattern_compiles() {
        let placeholder = PLACEHOLDER.as_ref().expect("placeholder pattern");
        let captures = placeholder.captures("x{{ a.b }}y").expect("match");
        assert_eq!(&captures[1], " a.b ");
        assert!(!placeholder.is_match("{{}}"));
    }

    #[test]
    fn test_priority_order() {
        let realized = realize(
            &json!({"a": "static"}),
            &json!({"a": "injected", "b": "injected"}),
            &Defaults::new(json!({"a": "default", "b": "default", "c": "default"})),
        );
        assert_eq!(
            realized,
            json!({"a": "static", "b": "injected", "c": "default"})
        );
    }

    #[test]
    fn test_placeholders_use_merged_values() {
        let realized = realize(
            &json!({"file": "{{name}}.min.js", "banner": "v{{version}} {{unknown}}"}),
            &json!({"name": "bundle", "version": 2}),
            &Defaults::default(),
        );
        assert_eq!(realized["file"], json!("bundle.min.js"));
        assert_eq!(realized["banner"], json!("v2 unknown"));
    }

    #[test]
    fn test_falsy_values_leave_bare_identifier() {
        let values = json!({"empty": "", "zero": 0, "off": false, "none": null});
        let values = values.as_object().unwrap();
        assert_eq!(
            interpolate("{{empty}}/{{zero}}/{{off}}/{{none}}", values),
            "empty/zero/off/none"
        );
    }

    #[test]
    fn test_lookup_is_single_level() {
        let realized = realize(
            &json!({"out": "{{dest}}", "dest": {"path": "dist"}, "list": ["{{tag}}", 1]}),
            &json!({"tag": ["a", "b"]}),
            &Defaults::default(),
        );
        assert_eq!(realized["out"], json!(r#"{"path":"dist"}"#));
        assert_eq!(realized["list"], json!(["a,b", 1]));
    }

    #[test]
    fn test_computed_leaves() {
        let defaults = Defaults::new(json!({"suffix": ".js"})).compute("dest.file", |values| {
            let name = values.get("name").and_then(Value::as_str).unwrap_or("out");
            json!(format!("{{{{{}}}}}-{}", "name", name))
        });
        let realized = realize(&json!({"name": "app"}), &json!({}), &defaults);
        // Computed values are inserted after substitution, verbatim
        assert_eq!(realized["dest"]["file"], json!("{{name}}-app"));

        let realized = realize(
            &json!({"name": "app", "dest": {"file": "fixed"}}),
            &json!({}),
            &defaults,
        );
        assert_eq!(realized["dest"]["file"], json!("fixed"));
    }

    #[test]
    fn test_inputs_not_mutated() {
        let original = json!({"a": "{{b}}"});
        let injected = json!({"b": "x"});
        let snapshot = (original.clone(), injected.clone());
        let _ = realize(&original, &injected, &Defaults::default());
        assert_eq!((original, injected), snapshot);
    }
}
