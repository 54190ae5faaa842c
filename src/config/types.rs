//! Configuration types and structures.
//!
//! Task-level types produced by resolution (`TaskInfo`, `SrcSpec`, `DestSpec`,
//! `ResolvedNode`) and the process-level `Settings` read from the task file.

use crate::error::{ChefError, ChefResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether a task is independently addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Registered and listed under its display name.
    Visible,
    /// Implementation detail of its parent: not registered, listed as `<name>`.
    Hidden,
    /// Pruned: no task is produced at all.
    Disabled,
}

/// Runtime information about a task node, derived from its key, its schema,
/// and reserved keys in its raw config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Value>,
    /// Raw sub-task spec: a task name, an array of task specs, or an object
    /// of named sub-task configs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,
}

impl TaskInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Parse a task key such as `.helper`, `#skipped` or `build(production)`.
    ///
    /// A leading `.` hides the task, a leading `#` disables it, and a trailing
    /// parenthesized suffix is recorded as the runtime tag.
    pub fn from_key(key: &str) -> Self {
        let (visibility, rest) = if let Some(rest) = key.strip_prefix('.') {
            (Some(Visibility::Hidden), rest)
        } else if let Some(rest) = key.strip_prefix('#') {
            (Some(Visibility::Disabled), rest)
        } else {
            (None, key)
        };

        let (name, runtime) = match rest.strip_suffix(')').and_then(|r| r.split_once('(')) {
            Some((name, runtime)) if !name.is_empty() => {
                (name, Some(Value::String(runtime.to_string())))
            }
            _ => (rest, None),
        };

        Self {
            name: Some(name.to_string()),
            visibility,
            runtime,
            ..Default::default()
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == Some(Visibility::Hidden)
    }

    pub fn is_disabled(&self) -> bool {
        self.visibility == Some(Visibility::Disabled)
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.visibility, None | Some(Visibility::Visible))
    }
}

/// Normalized `src` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrcSpec {
    pub globs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

/// Normalized `dest` config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl SrcSpec {
    /// Read an already normalized `src` value.
    ///
    /// Fails with `NotNormalized` if the value does not have the normalized
    /// shape; callers only pass configs produced by an earlier resolution.
    pub fn from_normalized(value: &Value) -> ChefResult<Self> {
        let spec: SrcSpec = serde_json::from_value(value.clone())
            .map_err(|_| ChefError::not_normalized("src"))?;
        Ok(spec)
    }

    /// Whether this spec should be joined under the parent's globs.
    pub fn joins_parent(&self) -> bool {
        joins_parent(self.options.as_ref())
    }
}

impl DestSpec {
    /// Read an already normalized `dest` value.
    pub fn from_normalized(value: &Value) -> ChefResult<Self> {
        let spec: DestSpec = serde_json::from_value(value.clone())
            .map_err(|_| ChefError::not_normalized("dest"))?;
        Ok(spec)
    }

    /// Whether this spec should be joined under the parent's path.
    pub fn joins_parent(&self) -> bool {
        joins_parent(self.options.as_ref())
    }
}

fn joins_parent(options: Option<&Map<String, Value>>) -> bool {
    options
        .and_then(|o| o.get("join"))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Result of resolving one node of the task tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedNode {
    pub task_info: TaskInfo,
    /// Normalized config for this node; never contains sub-task configs.
    pub task_config: Value,
    /// Raw configs of the node's sub-tasks, in declaration order.
    pub sub_task_configs: Map<String, Value>,
}

/// What to do when two tasks resolve to the same display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Later registration silently replaces the earlier one.
    Allow,
    /// Later registration replaces the earlier one with a warning.
    Warn,
    /// Fail the build (default).
    #[default]
    Reject,
}

/// Process-level settings, read from the `settings` section of the task file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Policy for colliding display names.
    #[serde(default)]
    pub duplicates: DuplicatePolicy,

    /// Default log level when neither `--verbose` nor `RUST_LOG` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Name of the stream combinator used when a node has sub-tasks but no
    /// stream processor of its own.
    #[serde(default = "default_combinator")]
    pub default_combinator: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::default(),
            log_level: default_log_level(),
            default_combinator: default_combinator(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_combinator() -> String {
    "merge".to_string()
}
