//! Name-keyed registries.
//!
//! Two kinds with different lifecycles:
//! - [`Catalog`]: stream processors and recipes, configured once at startup
//! - [`TaskRegistry`]: display name -> task, filled while the tree is built

use crate::config::Defaults;
use crate::error::ChefResult;
use crate::stream::{Done, Stream};
use crate::task::{Context, ExecutableTask, LeafFn, RunnerFn, StreamFn};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Static name -> entry mapping, iterated in registration order.
#[derive(Debug)]
pub struct Catalog<T> {
    entries: IndexMap<String, T>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T> Catalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry; returns the one it replaced.
    pub fn register(&mut self, name: impl Into<String>, entry: T) -> Option<T> {
        self.entries.insert(name.into(), entry)
    }

    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalog metadata shared by recipes and stream processors.
#[derive(Clone, Debug, Default)]
pub struct EntryInfo {
    /// Normalization schema for nodes with this name
    pub schema: Option<Value>,
    /// Keys kept in the task config when there is no schema
    pub consumes: Vec<String>,
    /// Lowest-priority config at realization
    pub defaults: Defaults,
    pub description: Option<String>,
}

/// A self-contained named runner; sub-task configs under it are ignored.
#[derive(Clone)]
pub struct Recipe {
    pub runner: RunnerFn,
    pub info: EntryInfo,
}

impl Recipe {
    pub fn new(runner: RunnerFn) -> Self {
        Self {
            runner,
            info: EntryInfo::default(),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.info.description = self.info.description.or_else(|| description_of(&schema));
        self.info.schema = Some(schema);
        self
    }

    pub fn with_consumes(mut self, keys: &[&str]) -> Self {
        self.info.consumes = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.info.defaults = defaults;
        self
    }
}

/// Combines the sub-tasks built for a node.
#[derive(Clone)]
pub struct StreamProcessor {
    pub func: StreamFn,
    pub info: EntryInfo,
}

impl StreamProcessor {
    pub fn new(func: StreamFn) -> Self {
        Self {
            func,
            info: EntryInfo::default(),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.info.description = self.info.description.or_else(|| description_of(&schema));
        self.info.schema = Some(schema);
        self
    }

    pub fn with_consumes(mut self, keys: &[&str]) -> Self {
        self.info.consumes = keys.iter().map(|k| k.to_string()).collect();
        self
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe").field("info", &self.info).finish_non_exhaustive()
    }
}

impl fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn description_of(schema: &Value) -> Option<String> {
    schema
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// How a node with a given name is normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaLookup {
    Schema(Value),
    /// No schema: only `src`/`dest` and these keys are config
    Legacy(Vec<String>),
}

/// The stream and recipe catalogs.
#[derive(Debug, Default)]
pub struct Catalogs {
    pub streams: Catalog<StreamProcessor>,
    pub recipes: Catalog<Recipe>,
}

impl Catalogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogs pre-filled with the built-in combinators and recipes.
    pub fn with_builtins() -> Self {
        let mut catalogs = Self::new();
        crate::builtins::register(&mut catalogs);
        catalogs
    }

    fn info(&self, name: &str) -> Option<&EntryInfo> {
        self.streams
            .lookup(name)
            .map(|s| &s.info)
            .or_else(|| self.recipes.lookup(name).map(|r| &r.info))
    }

    /// Schema for a node name: stream catalog first, then recipes.
    ///
    /// Unknown names and entries without a schema get the empty schema,
    /// unless the entry declares `consumes`, which selects legacy mode.
    pub fn schema_for(&self, name: &str) -> SchemaLookup {
        match self.info(name) {
            Some(EntryInfo {
                schema: Some(schema),
                ..
            }) => SchemaLookup::Schema(schema.clone()),
            Some(info) if !info.consumes.is_empty() => SchemaLookup::Legacy(info.consumes.clone()),
            _ => SchemaLookup::Schema(Value::Object(Default::default())),
        }
    }
}

/// A task registered directly, outside the configured tree.
#[derive(Clone)]
pub struct PlainTask {
    pub name: String,
    pub description: Option<String>,
    pub func: LeafFn,
}

impl fmt::Debug for PlainTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTask")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Entry of the [`TaskRegistry`].
#[derive(Clone, Debug)]
pub enum RegisteredTask {
    /// Built from configuration; has a two-phase `run`
    Configurable(Arc<ExecutableTask>),
    /// Leaf callable taking only the context and `done`
    Plain(PlainTask),
}

impl RegisteredTask {
    pub fn description(&self) -> Option<&str> {
        match self {
            RegisteredTask::Configurable(task) => Some(task.description.as_str()),
            RegisteredTask::Plain(plain) => plain.description.as_deref(),
        }
    }
}

/// Display name -> task, shared by one build session and its runners.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<IndexMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<RegisteredTask> {
        self.tasks.read().get(name).cloned()
    }

    /// Set a task; returns the one it replaced.
    pub fn set(&self, name: impl Into<String>, task: RegisteredTask) -> Option<RegisteredTask> {
        self.tasks.write().insert(name.into(), task)
    }

    /// Register a plain leaf under its own name.
    pub fn set_plain<F>(&self, name: &str, description: Option<&str>, func: F)
    where
        F: Fn(&Context, Done) -> ChefResult<Option<Stream>> + Send + Sync + 'static,
    {
        let plain = PlainTask {
            name: name.to_string(),
            description: description.map(str::to_string),
            func: Arc::new(func),
        };
        self.set(name, RegisteredTask::Plain(plain));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}
