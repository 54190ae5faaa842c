//! Configuration resolution for one node of the task tree.
//!
//! Turns `(task_info, raw, parent, schema)` into a [`ResolvedNode`]:
//! 1. normalize and join `src` under the parent's globs
//! 2. normalize and force-join `dest` under the parent's path
//! 3. `defaults_deep(src/dest, raw, parent)`
//! 4. normalize against the schema (or the legacy reserved-keys-only path)
//! 5. split undeclared keys out as sub-task configs
//!
//! Resolution is pure: all inputs are borrowed and never modified.

use super::merge::defaults_deep_all;
use super::schema::{Normalizer, OTHERS, SchemaNormalizer};
use super::types::{DestSpec, ResolvedNode, SrcSpec, TaskInfo, Visibility};
use crate::error::{ChefError, ChefResult};
use crate::paths::{join_globs, join_path};
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Keys always interpreted structurally, whatever the schema says.
pub const RESERVED_KEYS: &[&str] = &["src", "dest"];

/// Raw-config keys that override [`TaskInfo`] unless the schema declares them.
const TASK_INFO_KEYS: &[&str] = &[
    "name",
    "description",
    "visibility",
    "hidden",
    "disabled",
    "runtime",
    "task",
    "depends",
    "debug",
];

static SRC_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "properties": {
            "globs": {
                "description": "Glob patterns to read",
                "type": "array",
                "items": { "type": "string" },
                "alias": ["glob"]
            },
            "options": {
                "description": "Options for reading the globs",
                "properties": { "base": {}, "buffer": {}, "read": {}, "join": {} }
            }
        },
        "required": ["globs"],
        "primary": "globs",
        "gathering": "options"
    })
});

static DEST_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "properties": {
            "path": {
                "description": "Output directory"
            },
            "options": {
                "description": "Options for writing to the directory",
                "properties": { "cwd": {}, "mode": {}, "join": {} }
            }
        },
        "required": ["path"],
        "primary": "path",
        "gathering": "options"
    })
});

/// Normalize a raw `src` value into a [`SrcSpec`].
pub fn normalize_src(raw: &Value) -> ChefResult<SrcSpec> {
    let value = SchemaNormalizer.normalize(&SRC_SCHEMA, raw)?;
    let spec: SrcSpec = serde_json::from_value(value)
        .map_err(|e| ChefError::invalid_value("src.globs", &e.to_string()))?;
    if spec.globs.is_empty() {
        return Err(ChefError::invalid_value(
            "src.globs",
            "src.globs must not be empty",
        ));
    }
    Ok(spec)
}

/// Normalize a raw `dest` value into a [`DestSpec`].
pub fn normalize_dest(raw: &Value) -> ChefResult<DestSpec> {
    let value = SchemaNormalizer.normalize(&DEST_SCHEMA, raw)?;
    serde_json::from_value(value)
        .map_err(|_| ChefError::invalid_value("dest.path", "dest.path must be a string"))
}

/// Resolve a node with the default [`SchemaNormalizer`].
///
/// `schema: None` selects the legacy path where only `src`/`dest` are
/// recognized.
pub fn resolve(
    task_info: &TaskInfo,
    raw: &Value,
    parent: &Value,
    schema: Option<&Value>,
) -> ChefResult<ResolvedNode> {
    match schema {
        Some(schema) => resolve_with(&SchemaNormalizer, task_info, raw, parent, schema),
        None => resolve_legacy(task_info, raw, parent, &[]),
    }
}

/// Resolve a node against a schema using the given normalizer.
pub fn resolve_with(
    normalizer: &dyn Normalizer,
    task_info: &TaskInfo,
    raw: &Value,
    parent: &Value,
    schema: &Value,
) -> ChefResult<ResolvedNode> {
    let declared = declared_properties(schema);
    let mut raw = raw_shape(raw)?;
    let task_info = take_task_info(task_info, &mut raw, Some(schema), &declared)?;

    let inherited = inherit(&raw, parent)?;
    let merged = defaults_deep_all([&inherited, &Value::Object(raw.clone()), parent]);

    let effective = with_reserved_properties(schema);
    let mut task_config = normalizer.normalize(&effective, &merged)?;

    let others = match task_config.as_object_mut() {
        Some(map) => map.remove(OTHERS),
        None => None,
    };
    let others = match others {
        Some(Value::Object(others)) => others,
        _ => Map::new(),
    };

    // Only the node's own keys become sub-tasks; undeclared keys that merely
    // came down from the parent are dropped.
    let sub_task_configs: Map<String, Value> = raw
        .iter()
        .filter(|(key, _)| others.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let node = ResolvedNode {
        task_info,
        task_config,
        sub_task_configs,
    };
    trace_node(&node, &raw);
    Ok(node)
}

/// Legacy resolution for catalog entries without a schema.
///
/// Only `src`, `dest` and the entry's `consumes` keys are kept in the task
/// config; every other raw key is a sub-task config, verbatim.
pub fn resolve_legacy(
    task_info: &TaskInfo,
    raw: &Value,
    parent: &Value,
    consumes: &[String],
) -> ChefResult<ResolvedNode> {
    let declared: Vec<String> = consumes.to_vec();
    let mut raw = raw_shape(raw)?;
    let task_info = take_task_info(task_info, &mut raw, None, &declared)?;

    let inherited = inherit(&raw, parent)?;
    let merged = defaults_deep_all([&inherited, &Value::Object(raw.clone()), parent]);

    let keeps = |key: &str| RESERVED_KEYS.contains(&key) || declared.iter().any(|c| c == key);

    let task_config: Map<String, Value> = match merged {
        Value::Object(map) => map.into_iter().filter(|(key, _)| keeps(key)).collect(),
        _ => Map::new(),
    };
    let sub_task_configs: Map<String, Value> = raw
        .iter()
        .filter(|(key, _)| !keeps(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let node = ResolvedNode {
        task_info,
        task_config: Value::Object(task_config),
        sub_task_configs,
    };
    trace_node(&node, &raw);
    Ok(node)
}

/// Coerce the accepted short-hands of a node's raw config into a mapping.
///
/// - object: as-is
/// - string: a reference to another task (`{ task: name }`)
/// - array: a parallel composition (`{ task: [...] }`)
/// - `null` / `true`: an empty config
/// - `false`: a disabled node
fn raw_shape(raw: &Value) -> ChefResult<Map<String, Value>> {
    let mut map = Map::new();
    match raw {
        Value::Object(obj) => return Ok(obj.clone()),
        Value::String(_) | Value::Array(_) => {
            map.insert("task".to_string(), raw.clone());
        }
        Value::Null | Value::Bool(true) => {}
        Value::Bool(false) => {
            map.insert("disabled".to_string(), Value::Bool(true));
        }
        Value::Number(n) => {
            return Err(ChefError::invalid_shape(format!(
                "task config must be an object, a task name or a list, got {}",
                n
            )));
        }
    }
    Ok(map)
}

/// Pull reserved task-info keys out of the raw config and combine them with
/// the given info and the schema's `title`/`description`.
///
/// Priority: raw override, then the given info, then the schema.
fn take_task_info(
    given: &TaskInfo,
    raw: &mut Map<String, Value>,
    schema: Option<&Value>,
    declared: &[String],
) -> ChefResult<TaskInfo> {
    let mut info = given.clone();

    if let Some(schema) = schema {
        if info.name.is_none() {
            info.name = schema
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        if info.description.is_none() {
            info.description = schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
    }

    for key in TASK_INFO_KEYS {
        if declared.iter().any(|d| d == key) {
            continue;
        }
        let Some(value) = raw.remove(*key) else {
            continue;
        };
        match (*key, value) {
            ("name", Value::String(name)) => info.name = Some(name),
            ("description", Value::String(text)) => info.description = Some(text),
            ("visibility", value) => {
                let visibility: Visibility = serde_json::from_value(value).map_err(|_| {
                    ChefError::invalid_value(
                        "visibility",
                        "visibility must be visible, hidden or disabled",
                    )
                })?;
                info.visibility = Some(visibility);
            }
            ("hidden", Value::Bool(true)) => info.visibility = Some(Visibility::Hidden),
            ("disabled", Value::Bool(true)) => info.visibility = Some(Visibility::Disabled),
            ("hidden" | "disabled", Value::Bool(false)) => {}
            ("runtime", value) => info.runtime = Some(value),
            ("task", value) => info.task = Some(value),
            ("depends", Value::String(name)) => info.depends = Some(vec![name]),
            ("depends", Value::Array(names)) => {
                let names = names
                    .into_iter()
                    .map(|n| match n {
                        Value::String(s) => Ok(s),
                        _ => Err(ChefError::invalid_value(
                            "depends",
                            "depends must list task names",
                        )),
                    })
                    .collect::<ChefResult<Vec<_>>>()?;
                info.depends = Some(names);
            }
            ("debug", value) => {
                if value.as_bool().unwrap_or(false) {
                    let raw_dump = Value::Object(raw.clone());
                    info!(task = ?info.name, raw = %raw_dump, "debug: raw task config");
                }
            }
            (key, _) => {
                return Err(ChefError::invalid_value(
                    key,
                    &format!("unexpected value type for {}", key),
                ));
            }
        }
    }

    Ok(info)
}

/// Normalize the node's own `src`/`dest` and join them under the parent's.
fn inherit(raw: &Map<String, Value>, parent: &Value) -> ChefResult<Value> {
    let mut inherited = Map::new();

    if let Some(raw_src) = raw.get("src") {
        let mut src = normalize_src(raw_src)?;
        if let Some(parent_src) = parent.get("src") {
            let parent_src = SrcSpec::from_normalized(parent_src)?;
            if src.joins_parent() {
                src.globs = join_globs(&parent_src.globs, &src.globs);
            }
        }
        inherited.insert("src".to_string(), to_value(&src)?);
    }

    if let Some(raw_dest) = raw.get("dest") {
        let mut dest = normalize_dest(raw_dest)?;
        if let Some(parent_dest) = parent.get("dest") {
            let parent_dest = DestSpec::from_normalized(parent_dest)?;
            // dest always names a directory, which may not exist yet
            if dest.joins_parent() {
                dest.path = join_path(&parent_dest.path, &dest.path, true);
            }
        }
        inherited.insert("dest".to_string(), to_value(&dest)?);
    }

    Ok(Value::Object(inherited))
}

fn to_value<T: serde::Serialize>(value: &T) -> ChefResult<Value> {
    serde_json::to_value(value).map_err(ChefError::internal)
}

fn declared_properties(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

/// The schema with `src`/`dest` declared as opaque, already-normalized
/// properties.
fn with_reserved_properties(schema: &Value) -> Value {
    let mut effective = match schema {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let properties = effective
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(properties) = properties {
        for key in RESERVED_KEYS {
            properties.insert((*key).to_string(), json!({}));
        }
    }
    Value::Object(effective)
}

fn trace_node(node: &ResolvedNode, raw: &Map<String, Value>) {
    debug!(
        task = ?node.task_info.name,
        raw_keys = raw.len(),
        sub_tasks = node.sub_task_configs.len(),
        "Resolved task config"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn empty() -> Value {
        json!({})
    }

    #[test]
    fn test_empty_config_resolves_to_empty_node() {
        let node = resolve(&TaskInfo::default(), &empty(), &empty(), Some(&empty())).unwrap();
        assert_eq!(node.task_info, TaskInfo::default());
        assert_eq!(node.task_config, json!({}));
        assert!(node.sub_task_configs.is_empty());

        let again = resolve(&TaskInfo::default(), &empty(), &empty(), Some(&empty())).unwrap();
        assert_eq!(node, again);
    }

    #[test]
    fn test_src_and_dest_always_accepted() {
        let raw = json!({"src": "src", "dest": "dist"});
        let node = resolve(&TaskInfo::default(), &raw, &empty(), Some(&empty())).unwrap();
        assert_eq!(
            node.task_config,
            json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}})
        );
        assert!(node.sub_task_configs.is_empty());
    }

    #[test]
    fn test_legacy_mode_routes_every_other_key_to_sub_tasks() {
        let raw = json!({
            "src": "src",
            "dest": "dist",
            "blabla": ["bla", "bla"],
            "foo": false,
            "bar": {"name": "bar"}
        });
        let snapshot = raw.clone();
        let node = resolve(&TaskInfo::default(), &raw, &empty(), None).unwrap();
        assert_eq!(
            node.task_config,
            json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}})
        );
        let keys: Vec<&String> = node.sub_task_configs.keys().collect();
        assert_eq!(keys, ["blabla", "foo", "bar"]);
        assert_eq!(node.sub_task_configs["foo"], json!(false));
        assert_eq!(node.sub_task_configs["bar"], json!({"name": "bar"}));
        assert_eq!(raw, snapshot);
    }

    #[test]
    fn test_legacy_mode_keeps_consumed_keys() {
        let raw = json!({"src": "a", "bundles": [1], "minify": {}});
        let node =
            resolve_legacy(&TaskInfo::default(), &raw, &empty(), &["bundles".to_string()])
                .unwrap();
        assert_eq!(
            node.task_config,
            json!({"src": {"globs": ["a"]}, "bundles": [1]})
        );
        assert_eq!(node.sub_task_configs, json!({"minify": {}}).as_object().unwrap().clone());
    }

    #[test]
    fn test_inherits_parent_config() {
        let parent = json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}});
        let snapshot = parent.clone();
        let node = resolve(&TaskInfo::default(), &empty(), &parent, Some(&empty())).unwrap();
        assert_eq!(node.task_config, parent);
        assert_eq!(parent, snapshot);
    }

    #[test]
    fn test_joins_parent_paths() {
        let raw = json!({"src": ["services/**/*.js", "views/**/*.js"], "dest": "lib"});
        let parent = json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}});
        let (raw_snapshot, parent_snapshot) = (raw.clone(), parent.clone());

        let node = resolve(&TaskInfo::default(), &raw, &parent, Some(&empty())).unwrap();
        assert_eq!(
            node.task_config,
            json!({
                "src": {"globs": ["src/services/**/*.js", "src/views/**/*.js"]},
                "dest": {"path": "dist/lib"}
            })
        );
        assert_eq!(raw, raw_snapshot);
        assert_eq!(parent, parent_snapshot);
    }

    #[test]
    fn test_join_can_be_disabled() {
        let raw = json!({
            "src": {"globs": ["services/**/*.js"], "options": {"join": false}},
            "dest": {"path": "lib", "options": {"join": false}}
        });
        let parent = json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}});
        let node = resolve(&TaskInfo::default(), &raw, &parent, Some(&empty())).unwrap();
        assert_eq!(node.task_config["src"]["globs"], json!(["services/**/*.js"]));
        assert_eq!(node.task_config["dest"]["path"], json!("lib"));
    }

    #[test]
    fn test_unknown_keys_become_sub_tasks() {
        let raw = json!({
            "src": ["services/**/*.js"],
            "dest": "lib",
            "bundles": {"entries": ["a", "b", "c"]},
            "options": {"extensions": [".js", ".ts"]},
            "unknownProperty": "what?"
        });
        let parent = json!({"src": {"globs": ["src"]}, "dest": {"path": "dist"}});
        let schema = json!({
            "properties": {
                "bundles": {"properties": {"entries": {}}},
                "options": {}
            }
        });
        let snapshot = raw.clone();
        let node = resolve(&TaskInfo::default(), &raw, &parent, Some(&schema)).unwrap();
        assert_eq!(
            node.task_config,
            json!({
                "src": {"globs": ["src/services/**/*.js"]},
                "dest": {"path": "dist/lib"},
                "bundles": {"entries": ["a", "b", "c"]},
                "options": {"extensions": [".js", ".ts"]}
            })
        );
        assert_eq!(node.sub_task_configs.len(), 1);
        assert_eq!(node.sub_task_configs["unknownProperty"], json!("what?"));
        assert_eq!(raw, snapshot);
    }

    #[test]
    fn test_parent_only_keys_do_not_spawn_sub_tasks() {
        let parent = json!({"src": {"globs": ["src"]}, "bundles": {"entries": ["a"]}});
        let node =
            resolve(&TaskInfo::default(), &json!({"lint": {}}), &parent, Some(&empty())).unwrap();
        let keys: Vec<&String> = node.sub_task_configs.keys().collect();
        assert_eq!(keys, ["lint"]);
        assert_eq!(node.task_config, json!({"src": {"globs": ["src"]}}));
    }

    #[test]
    fn test_schema_title_and_description() {
        let schema = json!({
            "title": "schema-extractor",
            "description": "extract title and description from schema if available"
        });
        let node = resolve(&TaskInfo::default(), &empty(), &empty(), Some(&schema)).unwrap();
        assert_eq!(node.task_info.name.as_deref(), Some("schema-extractor"));
        assert_eq!(
            node.task_info.description.as_deref(),
            Some("extract title and description from schema if available")
        );

        // The key's own name wins over the schema title
        let node =
            resolve(&TaskInfo::named("styles"), &empty(), &empty(), Some(&schema)).unwrap();
        assert_eq!(node.task_info.name.as_deref(), Some("styles"));
    }

    #[test]
    fn test_task_info_overrides_consumed() {
        let raw = json!({
            "description": "Bundle scripts",
            "hidden": true,
            "depends": "clean",
            "debug": false,
            "minify": {}
        });
        let node = resolve(&TaskInfo::named("scripts"), &raw, &empty(), Some(&empty())).unwrap();
        assert_eq!(node.task_info.description.as_deref(), Some("Bundle scripts"));
        assert!(node.task_info.is_hidden());
        assert_eq!(node.task_info.depends, Some(vec!["clean".to_string()]));
        let keys: Vec<&String> = node.sub_task_configs.keys().collect();
        assert_eq!(keys, ["minify"]);
    }

    #[test]
    fn test_debug_flag_is_consumed() {
        let raw = json!({"debug": true, "dest": "out", "lint": {}});
        let node = resolve(&TaskInfo::named("scripts"), &raw, &empty(), Some(&empty())).unwrap();
        assert_eq!(node.task_config, json!({"dest": {"path": "out"}}));
        let keys: Vec<&String> = node.sub_task_configs.keys().collect();
        assert_eq!(keys, ["lint"]);
    }

    #[test]
    fn test_declared_property_is_not_task_info() {
        let schema = json!({"properties": {"name": {"type": "string"}}});
        let raw = json!({"name": "bundle.js"});
        let node = resolve(&TaskInfo::named("browserify"), &raw, &empty(), Some(&schema)).unwrap();
        assert_eq!(node.task_info.name.as_deref(), Some("browserify"));
        assert_eq!(node.task_config, json!({"name": "bundle.js"}));
    }

    #[test]
    fn test_short_hand_shapes() {
        let node = resolve(&TaskInfo::named("a"), &json!("clean"), &empty(), Some(&empty())).unwrap();
        assert_eq!(node.task_info.task, Some(json!("clean")));

        let node =
            resolve(&TaskInfo::named("a"), &json!(["x", "y"]), &empty(), Some(&empty())).unwrap();
        assert_eq!(node.task_info.task, Some(json!(["x", "y"])));

        let node = resolve(&TaskInfo::named("a"), &json!(false), &empty(), Some(&empty())).unwrap();
        assert!(node.task_info.is_disabled());

        let err = resolve(&TaskInfo::named("a"), &json!(3), &empty(), Some(&empty())).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidShape);
    }

    #[test]
    fn test_parent_not_normalized_is_invariant_violation() {
        let raw = json!({"src": "a", "dest": "b"});
        let err = resolve(&TaskInfo::default(), &raw, &json!({"src": "src"}), Some(&empty()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotNormalized);

        let err = resolve(
            &TaskInfo::default(),
            &raw,
            &json!({"dest": {"path": 42}}),
            Some(&empty()),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotNormalized);
    }

    #[test]
    fn test_empty_globs_rejected() {
        let err = resolve(&TaskInfo::default(), &json!({"src": []}), &empty(), Some(&empty()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }

    #[test]
    fn test_arrays_from_parent_not_spliced() {
        let raw = json!({"plugins": ["a"]});
        let parent = json!({"plugins": ["x", "y", "z"]});
        let schema = json!({"properties": {"plugins": {"type": "array"}}});
        let node = resolve(&TaskInfo::default(), &raw, &parent, Some(&schema)).unwrap();
        assert_eq!(node.task_config, json!({"plugins": ["a"]}));
    }
}
