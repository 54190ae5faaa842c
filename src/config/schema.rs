//! Schema-driven config normalization.
//!
//! A schema is a JSON document in a small JSON-schema dialect:
//! - `properties`: declared keys, each with its own sub-schema
//! - `alias`: alternative names for a property (`"alias": ["entry"]`)
//! - `type: "array"` / `items`: scalars are coerced to one-element arrays,
//!   items are normalized with the `items` schema
//! - `primary`: the property that receives a scalar or array short-hand
//! - `gathering`: the property that collects keys the schema does not declare
//! - `default`: filled in when the property is absent
//! - `required`: properties that must be present after normalization
//! - `extends: { "$ref": "#/definitions/name" }` (or a list of them): schema
//!   composition; the referring schema's own keywords take precedence
//!
//! At the top level, undeclared keys without a `gathering` property are put in
//! the [`OTHERS`] bucket. At nested levels they are kept in place.

use crate::error::{ChefError, ChefResult};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Bucket that receives undeclared top-level keys.
pub const OTHERS: &str = "others";

/// The contract the resolver relies on to normalize raw config.
pub trait Normalizer: Send + Sync {
    /// Normalize `input` against `schema`.
    ///
    /// Expands aliases, applies defaults, validates required properties, and
    /// buckets undeclared top-level keys under [`OTHERS`].
    fn normalize(&self, schema: &Value, input: &Value) -> ChefResult<Value>;
}

/// Default [`Normalizer`] implementing the dialect described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaNormalizer;

impl Normalizer for SchemaNormalizer {
    fn normalize(&self, schema: &Value, input: &Value) -> ChefResult<Value> {
        let pass = Pass { root: schema };
        pass.node(schema, input, "", true)
    }
}

/// One normalization run; holds the root schema for `$ref` lookups.
struct Pass<'a> {
    root: &'a Value,
}

impl Pass<'_> {
    fn node(&self, schema: &Value, input: &Value, path: &str, top: bool) -> ChefResult<Value> {
        let schema = self.expand(schema, path)?;

        if is_array_schema(&schema) {
            return self.array(&schema, input, path);
        }

        match input {
            Value::Object(map) if is_object_schema(&schema) || top => {
                self.object(&schema, map, path, top)
            }
            Value::Object(_) => Ok(input.clone()),
            Value::Null => Ok(Value::Null),
            other => match schema.get("primary").and_then(Value::as_str) {
                Some(primary) => {
                    let mut wrapped = Map::new();
                    wrapped.insert(primary.to_string(), other.clone());
                    self.object(&schema, &wrapped, path, top)
                }
                None => Ok(other.clone()),
            },
        }
    }

    fn array(&self, schema: &Value, input: &Value, path: &str) -> ChefResult<Value> {
        let items = match input {
            Value::Null => return Ok(Value::Null),
            Value::Array(items) => items.clone(),
            scalar => vec![scalar.clone()],
        };

        let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) else {
            return Ok(Value::Array(items));
        };

        let mut normalized = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, idx);
            normalized.push(self.node(item_schema, item, &item_path, false)?);
        }
        Ok(Value::Array(normalized))
    }

    fn object(
        &self,
        schema: &Value,
        input: &Map<String, Value>,
        path: &str,
        top: bool,
    ) -> ChefResult<Value> {
        let empty = Map::new();
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let mut aliases: HashMap<&str, &str> = HashMap::new();
        for (name, prop) in properties {
            if let Some(list) = prop.get("alias").and_then(Value::as_array) {
                for alias in list.iter().filter_map(Value::as_str) {
                    aliases.insert(alias, name.as_str());
                }
            }
        }

        let mut output = Map::new();
        let mut unknown = Map::new();
        for (key, value) in input {
            let canonical = if properties.contains_key(key) {
                Some(key.as_str())
            } else {
                aliases.get(key.as_str()).copied()
            };

            match canonical {
                // Canonical spelling beats an alias that appeared first
                Some(name) if name == key || !output.contains_key(name) => {
                    let child_path = join_field(path, name);
                    let normalized = self.node(&properties[name], value, &child_path, false)?;
                    output.insert(name.to_string(), normalized);
                }
                Some(_) => {}
                None => {
                    unknown.insert(key.clone(), value.clone());
                }
            }
        }

        for (name, prop) in properties {
            if !output.contains_key(name)
                && let Some(default) = prop.get("default")
            {
                output.insert(name.clone(), default.clone());
            }
        }

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if output.get(name).is_none_or(Value::is_null) {
                    return Err(ChefError::missing_field(&join_field(path, name)));
                }
            }
        }

        if !unknown.is_empty() {
            match schema.get("gathering").and_then(Value::as_str) {
                Some(gathering) => gather(&mut output, gathering, unknown),
                None if top => gather(&mut output, OTHERS, unknown),
                None => output.extend(unknown),
            }
        }

        Ok(Value::Object(output))
    }

    /// Resolve `$ref` and `extends` into a single flat schema.
    fn expand(&self, schema: &Value, path: &str) -> ChefResult<Value> {
        let Some(own) = schema.as_object() else {
            return Ok(schema.clone());
        };

        let mut bases = Vec::new();
        if let Some(reference) = own.get("$ref") {
            bases.push(reference);
        }
        match own.get("extends") {
            Some(Value::Array(list)) => bases.extend(list.iter()),
            Some(single) => bases.push(single),
            None => {}
        }
        if bases.is_empty() {
            return Ok(schema.clone());
        }

        let mut flat = own.clone();
        flat.remove("$ref");
        flat.remove("extends");
        for base in bases {
            let target = match base {
                Value::String(pointer) => self.lookup(pointer, path)?,
                Value::Object(obj) => match obj.get("$ref").and_then(Value::as_str) {
                    Some(pointer) => self.lookup(pointer, path)?,
                    None => base.clone(),
                },
                _ => return Err(ChefError::invalid_shape(format!("bad schema ref at {}", path))),
            };
            let target = self.expand(&target, path)?;
            inherit(&mut flat, &target);
        }
        Ok(Value::Object(flat))
    }

    fn lookup(&self, pointer: &str, path: &str) -> ChefResult<Value> {
        let local = pointer.strip_prefix('#').unwrap_or(pointer);
        self.root.pointer(local).cloned().ok_or_else(|| {
            ChefError::invalid_shape(format!("unresolved schema ref {} at {}", pointer, path))
        })
    }
}

/// Copy keywords from `base` that `flat` does not define; union
/// `properties` and `required`.
fn inherit(flat: &mut Map<String, Value>, base: &Value) {
    let Some(base) = base.as_object() else {
        return;
    };

    for (key, value) in base {
        match (key.as_str(), flat.get_mut(key)) {
            ("properties", Some(Value::Object(own))) => {
                if let Value::Object(inherited) = value {
                    for (name, prop) in inherited {
                        own.entry(name.clone()).or_insert_with(|| prop.clone());
                    }
                }
            }
            ("required", Some(Value::Array(own))) => {
                if let Value::Array(inherited) = value {
                    for name in inherited {
                        if !own.contains(name) {
                            own.push(name.clone());
                        }
                    }
                }
            }
            (_, Some(_)) => {}
            (_, None) => {
                flat.insert(key.clone(), value.clone());
            }
        }
    }
}

fn gather(output: &mut Map<String, Value>, bucket: &str, unknown: Map<String, Value>) {
    match output.get_mut(bucket) {
        Some(Value::Object(existing)) => {
            for (key, value) in unknown {
                existing.entry(key).or_insert(value);
            }
        }
        _ => {
            output.insert(bucket.to_string(), Value::Object(unknown));
        }
    }
}

fn is_array_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("array")
}

fn is_object_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object")
        || schema.get("properties").is_some()
        || schema.get("primary").is_some()
        || schema.get("gathering").is_some()
}

fn join_field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn normalize(schema: Value, input: Value) -> ChefResult<Value> {
        SchemaNormalizer.normalize(&schema, &input)
    }

    fn src_like() -> Value {
        json!({
            "properties": {
                "globs": { "type": "array", "items": { "type": "string" }, "alias": ["glob"] },
                "options": { "properties": { "base": {}, "buffer": {}, "read": {} } }
            },
            "required": ["globs"],
            "primary": "globs",
            "gathering": "options"
        })
    }

    #[test]
    fn test_primary_accepts_scalar_and_array() {
        assert_eq!(
            normalize(src_like(), json!("src")).unwrap(),
            json!({"globs": ["src"]})
        );
        assert_eq!(
            normalize(src_like(), json!(["a/**", "b/**"])).unwrap(),
            json!({"globs": ["a/**", "b/**"]})
        );
    }

    #[test]
    fn test_alias_and_gathering() {
        let actual = normalize(src_like(), json!({"glob": "x/*.js", "base": "x"})).unwrap();
        assert_eq!(actual, json!({"globs": ["x/*.js"], "options": {"base": "x"}}));
    }

    #[test]
    fn test_canonical_beats_alias() {
        let actual = normalize(src_like(), json!({"glob": "alias", "globs": "canonical"})).unwrap();
        assert_eq!(actual, json!({"globs": ["canonical"]}));
    }

    #[test]
    fn test_nested_unknown_keys_kept_in_place() {
        let actual = normalize(
            src_like(),
            json!({"globs": ["a"], "options": {"join": false}}),
        )
        .unwrap();
        assert_eq!(actual, json!({"globs": ["a"], "options": {"join": false}}));
    }

    #[test]
    fn test_required_field_missing() {
        let err = normalize(src_like(), json!({"base": "x"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
        assert_eq!(err.field.as_deref(), Some("globs"));
    }

    #[test]
    fn test_top_level_unknown_keys_go_to_others() {
        let schema = json!({"properties": {"bundles": {}}});
        let actual = normalize(schema, json!({"bundles": 1, "minify": {}, "lint": "x"})).unwrap();
        assert_eq!(
            actual,
            json!({"bundles": 1, "others": {"minify": {}, "lint": "x"}})
        );
    }

    #[test]
    fn test_defaults_applied() {
        let schema = json!({
            "properties": {
                "sourcemap": { "enum": ["inline", "external", false], "default": false },
                "target": { "default": "es2015" }
            }
        });
        let actual = normalize(schema, json!({"target": "es5"})).unwrap();
        assert_eq!(actual, json!({"target": "es5", "sourcemap": false}));
    }

    #[test]
    fn test_extends_ref_and_item_coercion() {
        let schema = json!({
            "definitions": {
                "options": {
                    "properties": {
                        "external": { "type": "array", "alias": ["externals"] }
                    }
                }
            },
            "properties": {
                "bundles": {
                    "alias": ["bundle"],
                    "type": "array",
                    "items": {
                        "type": "object",
                        "extends": { "$ref": "#/definitions/options" },
                        "properties": {
                            "file": { "type": "string" },
                            "entries": { "type": "array", "alias": ["entry"] }
                        },
                        "required": ["file", "entries"]
                    }
                }
            },
            "required": ["bundles"]
        });
        let input = json!({
            "bundle": {
                "file": "index.js",
                "entry": "index.js",
                "externals": "./services",
                "require": ["angular2/router"]
            }
        });
        let actual = normalize(schema, input).unwrap();
        assert_eq!(
            actual,
            json!({
                "bundles": [{
                    "file": "index.js",
                    "entries": ["index.js"],
                    "external": ["./services"],
                    "require": ["angular2/router"]
                }]
            })
        );
    }

    #[test]
    fn test_required_inside_items_reports_path() {
        let schema = json!({
            "properties": {
                "bundles": {
                    "type": "array",
                    "items": { "properties": { "file": {} }, "required": ["file"] }
                }
            }
        });
        let err = normalize(schema, json!({"bundles": [{"file": "a"}, {}]})).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("bundles[1].file"));
    }

    #[test]
    fn test_unresolved_ref_is_shape_error() {
        let schema = json!({"extends": {"$ref": "#/definitions/missing"}});
        let err = normalize(schema, json!({})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidShape);
    }

    #[test]
    fn test_empty_schema_buckets_everything() {
        assert_eq!(normalize(json!({}), json!({})).unwrap(), json!({}));
        assert_eq!(
            normalize(json!({}), json!({"a": 1})).unwrap(),
            json!({"others": {"a": 1}})
        );
    }
}
