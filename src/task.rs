//! Executable tasks and the uniform runner signature.

use crate::config::{Defaults, Visibility, realize};
use crate::error::{ChefError, ChefResult};
use crate::registry::TaskRegistry;
use crate::stream::Stream;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use crate::stream::Done;

/// What a runner sees of the world at invocation time.
#[derive(Clone)]
pub struct Context {
    registry: Arc<TaskRegistry>,
    /// Names currently being delegated to by reference, outermost first
    chain: Vec<String>,
}

impl Context {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            chain: Vec::new(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Context for delegating to `name` by reference.
    ///
    /// Fails with `ReferenceCycle` if `name` is already being delegated to
    /// further up the same invocation.
    pub fn enter(&self, name: &str) -> ChefResult<Context> {
        let mut chain = self.chain.clone();
        chain.push(name.to_string());
        if self.chain.iter().any(|entered| entered == name) {
            return Err(ChefError::reference_cycle(&chain));
        }
        Ok(Self {
            registry: Arc::clone(&self.registry),
            chain,
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tasks", &self.registry.len())
            .field("chain", &self.chain)
            .finish()
    }
}

/// Uniform runner: `(ctx, config, stream, done)`.
///
/// A runner either calls `done` (now or later) or returns a [`Stream`] that
/// settles the work. A synchronous `Err` means `done` will not be called.
pub type RunnerFn =
    Arc<dyn Fn(&Context, &Value, Option<&Stream>, Done) -> ChefResult<Option<Stream>> + Send + Sync>;

/// Plain leaf task: only the context and the completion callback.
pub type LeafFn = Arc<dyn Fn(&Context, Done) -> ChefResult<Option<Stream>> + Send + Sync>;

/// Stream processor: like [`RunnerFn`] plus the sub-tasks built for the node.
pub type StreamFn = Arc<
    dyn Fn(&Context, &Value, Option<&Stream>, &[Arc<ExecutableTask>], Done) -> ChefResult<Option<Stream>>
        + Send
        + Sync,
>;

/// A runner plus what it contributes to the task wrapping it.
#[derive(Clone)]
pub struct Runner {
    pub func: RunnerFn,
    /// Lowest-priority config at realization time
    pub defaults: Defaults,
    /// Name used when the node itself has none
    pub display_name: Option<String>,
    /// Description used when the node itself has none
    pub description: Option<String>,
}

impl Runner {
    pub fn new(func: RunnerFn) -> Self {
        Self {
            func,
            defaults: Defaults::default(),
            display_name: None,
            description: None,
        }
    }

    /// Completes immediately.
    pub fn noop() -> Self {
        Self::new(Arc::new(|_ctx, _config, _stream, done| {
            done(Ok(()));
            Ok(None)
        }))
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn invoke(
        &self,
        ctx: &Context,
        config: &Value,
        stream: Option<&Stream>,
        done: Done,
    ) -> ChefResult<Option<Stream>> {
        (self.func)(ctx, config, stream, done)
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("defaults", &self.defaults)
            .field("display_name", &self.display_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A resolved, runnable node of the task tree.
///
/// Immutable once built. `config` is the node's statically resolved config;
/// each invocation realizes it against injected config first.
#[derive(Debug)]
pub struct ExecutableTask {
    pub id: usize,
    /// `prefix + name`; unique among registered tasks
    pub display_name: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub runtime: Option<Value>,
    pub config: Value,
    pub runner: Runner,
}

impl ExecutableTask {
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    /// Two-phase entry point used by composition: realize, then invoke.
    pub fn run(
        &self,
        ctx: &Context,
        injected: &Value,
        stream: Option<&Stream>,
        done: Done,
    ) -> ChefResult<Option<Stream>> {
        let config = realize(&self.config, injected, &self.runner.defaults);
        debug!(task = %self.display_name, config = %config, "Running task");
        self.runner.invoke(ctx, &config, stream, done)
    }

    /// Leaf entry point used by a scheduler: static config, no stream.
    pub fn call(&self, ctx: &Context, done: Done) -> ChefResult<Option<Stream>> {
        self.run(ctx, &Value::Object(Map::new()), None, done)
    }
}

/// A task spec inside a parallel composition.
///
/// Normalized into a runner once, at construction time.
#[derive(Clone)]
pub enum TaskRef {
    /// Looked up in the registry at call time
    Named(String),
    /// A plain leaf
    Callable(LeafFn),
    /// A built task with a two-phase entry point
    Composed(Arc<ExecutableTask>),
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            TaskRef::Callable(_) => f.write_str("Callable"),
            TaskRef::Composed(task) => f.debug_tuple("Composed").field(&task.display_name).finish(),
        }
    }
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        TaskRef::Named(name.to_string())
    }
}

impl From<Arc<ExecutableTask>> for TaskRef {
    fn from(task: Arc<ExecutableTask>) -> Self {
        TaskRef::Composed(task)
    }
}
