//! Runner selection for resolved nodes.
//!
//! Strategies, in the order `create` tries them:
//! 1. recipe: a catalog runner registered under the node's name
//! 2. reference: `task: "name"`, looked up in the registry at call time
//! 3. parallel: `task: [...]`, every entry started at once
//! 4. stream: sub-tasks built first, then combined by a stream processor
//!
//! `task: {...}` contributes extra sub-task configs to the stream strategy.
//! `depends` wraps whichever runner was chosen.

use crate::config::{ResolvedNode, Settings, Visibility};
use crate::error::{ChefError, ChefResult};
use crate::registry::{Catalogs, RegisteredTask};
use crate::stream::{Done, Step, Stream, join_all, sequence};
use crate::task::{Context, ExecutableTask, LeafFn, Runner, RunnerFn, TaskRef};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capability to build sub-tasks, injected by the task factory.
pub trait SubTaskBuilder {
    fn build(
        &mut self,
        prefix: &str,
        configs: &Map<String, Value>,
        parent: &Value,
    ) -> ChefResult<Vec<Arc<ExecutableTask>>>;
}

impl<F> SubTaskBuilder for F
where
    F: FnMut(&str, &Map<String, Value>, &Value) -> ChefResult<Vec<Arc<ExecutableTask>>>,
{
    fn build(
        &mut self,
        prefix: &str,
        configs: &Map<String, Value>,
        parent: &Value,
    ) -> ChefResult<Vec<Arc<ExecutableTask>>> {
        self(prefix, configs, parent)
    }
}

/// Builds runners from resolved nodes.
pub struct RunnerFactory<'a> {
    catalogs: &'a Catalogs,
    settings: &'a Settings,
}

impl<'a> RunnerFactory<'a> {
    pub fn new(catalogs: &'a Catalogs, settings: &'a Settings) -> Self {
        Self { catalogs, settings }
    }

    /// Pick and build the runner for `node`.
    ///
    /// May force `node.task_info.visibility` to hidden (named stream
    /// processors) and may extend `node.sub_task_configs` (`task: {...}`).
    pub fn create(
        &self,
        prefix: &str,
        node: &mut ResolvedNode,
        builder: &mut dyn SubTaskBuilder,
    ) -> ChefResult<Option<Runner>> {
        let name = node.task_info.name.clone().unwrap_or_default();

        let runner = match self.recipe(&name, node) {
            Some(runner) => Some(runner),
            None => match node.task_info.task.clone() {
                Some(Value::String(target)) => Some(Self::reference(&target)),
                Some(Value::Array(items)) => {
                    let refs = self.task_refs(prefix, node, &items, builder)?;
                    Some(Self::parallel(refs))
                }
                Some(Value::Object(extra)) => {
                    for (key, value) in extra {
                        if !node.sub_task_configs.contains_key(&key) {
                            node.sub_task_configs.insert(key, value);
                        }
                    }
                    self.stream(prefix, node, builder)?
                }
                Some(Value::Null) | None => self.stream(prefix, node, builder)?,
                Some(_) => {
                    return Err(ChefError::invalid_value(
                        "task",
                        "task must be a task name, a list of tasks or a mapping of sub-tasks",
                    ));
                }
            },
        };

        Ok(match (runner, node.task_info.depends.clone()) {
            (runner, Some(depends)) if !depends.is_empty() => Some(Self::depends(
                depends,
                runner.unwrap_or_else(Runner::noop),
            )),
            (runner, _) => runner,
        })
    }

    /// Use a recipe registered under `name`; sub-task configs are ignored.
    pub fn recipe(&self, name: &str, node: &ResolvedNode) -> Option<Runner> {
        let recipe = self.catalogs.recipes.lookup(name)?;
        if !node.sub_task_configs.is_empty() {
            let ignored: Vec<&String> = node.sub_task_configs.keys().collect();
            warn!(recipe = %name, ?ignored, "Recipe ignores sub-task configs");
        }
        Some(
            Runner::new(recipe.runner.clone())
                .with_defaults(recipe.info.defaults.clone())
                .with_description(recipe.info.description.clone()),
        )
    }

    /// Build the node's sub-tasks and combine them with a stream processor.
    ///
    /// Returns `None` when the name is not a stream processor and there are
    /// no sub-task configs.
    pub fn stream(
        &self,
        prefix: &str,
        node: &mut ResolvedNode,
        builder: &mut dyn SubTaskBuilder,
    ) -> ChefResult<Option<Runner>> {
        let name = node.task_info.name.clone().unwrap_or_default();
        let explicit = self.catalogs.streams.lookup(&name);
        if explicit.is_none() && node.sub_task_configs.is_empty() {
            return Ok(None);
        }

        let child_prefix = if explicit.is_some() {
            prefix.to_string()
        } else {
            child_prefix(prefix, node)
        };
        let tasks = builder.build(&child_prefix, &node.sub_task_configs, &node.task_config)?;

        let processor = match explicit {
            Some(processor) => {
                // A named processor has no identity of its own
                node.task_info.visibility = Some(Visibility::Hidden);
                processor
            }
            None => {
                let fallback = &self.settings.default_combinator;
                self.catalogs.streams.lookup(fallback).ok_or_else(|| {
                    ChefError::invalid_value(
                        "settings.default_combinator",
                        &format!("stream combinator not found: {}", fallback),
                    )
                })?
            }
        };
        debug!(task = %name, sub_tasks = tasks.len(), "Built stream runner");

        let func = processor.func.clone();
        let tasks: Arc<[Arc<ExecutableTask>]> = tasks.into();
        let runner: RunnerFn = Arc::new(move |ctx, config, stream, done| {
            func(ctx, config, stream, &tasks[..], done)
        });
        Ok(Some(
            Runner::new(runner)
                .with_defaults(processor.info.defaults.clone())
                .with_description(processor.info.description.clone()),
        ))
    }

    /// Look `name` up in the registry at call time and delegate to it.
    ///
    /// A missing task fails synchronously with `TaskNotFound`; delegating to
    /// a name already being delegated to fails with `ReferenceCycle`.
    pub fn reference(name: &str) -> Runner {
        let name = name.to_string();
        Runner::new(Arc::new(move |ctx, config, stream, done| {
            let task = ctx
                .registry()
                .lookup(&name)
                .ok_or_else(|| ChefError::task_not_found(&name))?;
            let ctx = ctx.enter(&name)?;
            match task {
                RegisteredTask::Configurable(task) => task.run(&ctx, config, stream, done),
                RegisteredTask::Plain(plain) => (plain.func)(&ctx, done),
            }
        }))
    }

    /// Start every task at once with the same `(ctx, config, stream)`.
    ///
    /// Completes with the first failure, or once all tasks succeeded.
    pub fn parallel(refs: Vec<TaskRef>) -> Runner {
        let runners: Vec<RunnerFn> = refs.into_iter().map(Self::normalize).collect();
        Runner::new(Arc::new(move |ctx, config, stream, done| {
            let steps = runners
                .iter()
                .map(|runner| bind(runner, ctx, config, stream))
                .collect();
            join_all(steps, done);
            Ok(None)
        }))
    }

    /// Adapt a plain leaf to the runner signature.
    pub fn wrapper(leaf: LeafFn) -> Runner {
        Runner::new(Arc::new(move |ctx, _config, _stream, done| leaf(ctx, done)))
    }

    /// Run the named tasks one after another, then `runner`.
    pub fn depends(names: Vec<String>, runner: Runner) -> Runner {
        let dependencies: Vec<RunnerFn> = names
            .iter()
            .map(|name| Self::reference(name).func)
            .collect();
        let main = runner.func.clone();
        let func: RunnerFn = Arc::new(move |ctx, config, stream, done| {
            let empty = Value::Object(Map::new());
            let mut steps: Vec<Step> = dependencies
                .iter()
                .map(|dependency| bind(dependency, ctx, &empty, None))
                .collect();
            steps.push(bind(&main, ctx, config, stream));
            sequence(steps, done);
            Ok(None)
        });
        Runner { func, ..runner }
    }

    fn normalize(task: TaskRef) -> RunnerFn {
        match task {
            TaskRef::Named(name) => Self::reference(&name).func,
            TaskRef::Callable(leaf) => Self::wrapper(leaf).func,
            TaskRef::Composed(task) => {
                Arc::new(move |ctx, config, stream, done| task.run(ctx, config, stream, done))
            }
        }
    }

    /// Turn `task: [...]` entries into task refs; inline mappings are built
    /// as sub-tasks.
    fn task_refs(
        &self,
        prefix: &str,
        node: &ResolvedNode,
        items: &[Value],
        builder: &mut dyn SubTaskBuilder,
    ) -> ChefResult<Vec<TaskRef>> {
        let mut refs = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(name) => refs.push(TaskRef::Named(name.clone())),
                Value::Object(configs) => {
                    let tasks =
                        builder.build(&child_prefix(prefix, node), configs, &node.task_config)?;
                    refs.extend(tasks.into_iter().map(TaskRef::Composed));
                }
                _ => {
                    return Err(ChefError::invalid_value(
                        "task",
                        "task list entries must be task names or mappings of sub-tasks",
                    ));
                }
            }
        }
        Ok(refs)
    }
}

/// Prefix for a node's sub-tasks: visible nodes add `name:`.
fn child_prefix(prefix: &str, node: &ResolvedNode) -> String {
    match &node.task_info.name {
        Some(name) if node.task_info.is_visible() => format!("{}{}:", prefix, name),
        _ => prefix.to_string(),
    }
}

/// Capture a runner invocation as a deferred step.
fn bind(runner: &RunnerFn, ctx: &Context, config: &Value, stream: Option<&Stream>) -> Step {
    let runner = Arc::clone(runner);
    let ctx = ctx.clone();
    let config = config.clone();
    let stream = stream.cloned();
    Box::new(move |done: Done| runner(&ctx, &config, stream.as_ref(), done))
}
