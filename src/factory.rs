//! Task factory: turns a raw config tree into executable tasks.
//!
//! Per node:
//! 1. parse the key (`.hidden`, `#disabled`, `name(runtime)`)
//! 2. look up the schema by name and resolve the config
//! 3. drop disabled nodes
//! 4. build the runner, recursing into sub-tasks through the runner factory
//! 5. wrap it as an [`ExecutableTask`], register it if visible, record metadata

use crate::config::{
    DuplicatePolicy, ResolvedNode, Settings, TaskInfo, Visibility, resolve, resolve_legacy,
};
use crate::error::{ChefError, ChefResult};
use crate::metadata::MetadataTree;
use crate::registry::{Catalogs, RegisteredTask, SchemaLookup, TaskRegistry};
use crate::runner::RunnerFactory;
use crate::task::{Context, ExecutableTask, Runner};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// State shared by every node of one build: registry, metadata, settings.
#[derive(Debug)]
pub struct BuildSession {
    registry: Arc<TaskRegistry>,
    metadata: MetadataTree,
    settings: Settings,
    next_id: AtomicUsize,
}

impl BuildSession {
    pub fn new(settings: Settings) -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new()), settings)
    }

    /// Use an existing registry, e.g. one holding plain tasks already.
    pub fn with_registry(registry: Arc<TaskRegistry>, settings: Settings) -> Self {
        Self {
            registry,
            metadata: MetadataTree::new(),
            settings,
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn metadata(&self) -> &MetadataTree {
        &self.metadata
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Invocation context bound to this session's registry.
    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.registry))
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a visible task under its display name.
    pub fn register(&self, task: &Arc<ExecutableTask>) -> ChefResult<()> {
        let name = &task.display_name;
        if self.registry.contains(name) {
            match self.settings.duplicates {
                DuplicatePolicy::Reject => return Err(ChefError::duplicate_task(name)),
                DuplicatePolicy::Warn => {
                    warn!(task = %name, "Task defined twice; the later definition wins")
                }
                DuplicatePolicy::Allow => debug!(task = %name, "Replacing task"),
            }
        }
        self.registry
            .set(name.clone(), RegisteredTask::Configurable(Arc::clone(task)));
        Ok(())
    }
}

/// Builds executable tasks from raw config.
pub struct TaskFactory {
    catalogs: Arc<Catalogs>,
    session: BuildSession,
}

impl TaskFactory {
    pub fn new(catalogs: Arc<Catalogs>, settings: Settings) -> Self {
        Self::with_session(catalogs, BuildSession::new(settings))
    }

    pub fn with_session(catalogs: Arc<Catalogs>, session: BuildSession) -> Self {
        Self { catalogs, session }
    }

    pub fn session(&self) -> &BuildSession {
        &self.session
    }

    pub fn context(&self) -> Context {
        self.session.context()
    }

    /// Build every top-level entry of a task tree.
    pub fn build(&self, tree: &Map<String, Value>) -> ChefResult<Vec<Arc<ExecutableTask>>> {
        self.multiple("", tree, &Value::Object(Map::new()))
    }

    /// Build one task per config entry, in key order; disabled entries are
    /// dropped.
    pub fn multiple(
        &self,
        prefix: &str,
        configs: &Map<String, Value>,
        parent: &Value,
    ) -> ChefResult<Vec<Arc<ExecutableTask>>> {
        let mut tasks = Vec::with_capacity(configs.len());
        for (name, raw) in configs {
            if let Some(task) = self.one(prefix, name, raw, parent)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Build the task for one node; `None` if the node is disabled.
    pub fn one(
        &self,
        prefix: &str,
        name: &str,
        raw: &Value,
        parent: &Value,
    ) -> ChefResult<Option<Arc<ExecutableTask>>> {
        let task_info = TaskInfo::from_key(name);
        let mut node = self.resolve_node(&task_info, raw, parent)?;
        if node.task_info.is_disabled() {
            debug!(task = %name, "Skipping disabled task");
            return Ok(None);
        }

        let mut sub_tasks: Vec<Arc<ExecutableTask>> = Vec::new();
        let runner = {
            let mut builder = |prefix: &str,
                               configs: &Map<String, Value>,
                               parent: &Value|
             -> ChefResult<Vec<Arc<ExecutableTask>>> {
                let tasks = self.multiple(prefix, configs, parent)?;
                sub_tasks.extend(tasks.iter().cloned());
                Ok(tasks)
            };
            RunnerFactory::new(&self.catalogs, &self.session.settings).create(
                prefix,
                &mut node,
                &mut builder,
            )?
        };

        let runner = match runner {
            Some(runner) => runner,
            None => {
                warn!(
                    task = %node.task_info.name.as_deref().unwrap_or(name),
                    "Can't infer a runner: task will do nothing"
                );
                Runner::noop()
            }
        };

        let ResolvedNode {
            task_info,
            task_config,
            ..
        } = node;
        let task = self.create(prefix, &task_info, task_config, runner)?;
        self.session
            .metadata
            .set_children(task.id, sub_tasks.iter().map(|t| t.id).collect());
        Ok(Some(task))
    }

    /// Wrap a runner as an executable task; register it if visible.
    pub fn create(
        &self,
        prefix: &str,
        task_info: &TaskInfo,
        config: Value,
        runner: Runner,
    ) -> ChefResult<Arc<ExecutableTask>> {
        let name = task_info
            .name
            .clone()
            .or_else(|| runner.display_name.clone())
            .unwrap_or_else(|| "<anonymous>".to_string());
        let description = task_info
            .description
            .clone()
            .or_else(|| runner.description.clone())
            .unwrap_or_default();

        let task = Arc::new(ExecutableTask {
            id: self.session.next_id(),
            display_name: format!("{}{}", prefix, name),
            name,
            description,
            visibility: task_info.visibility.unwrap_or(Visibility::Visible),
            runtime: task_info.runtime.clone(),
            config,
            runner,
        });

        if task.is_visible() {
            self.session.register(&task)?;
            self.session.metadata.set(task.id, task.display_name.clone());
        } else {
            self.session.metadata.set(task.id, format!("<{}>", task.name));
        }
        debug!(task = %task.display_name, visible = task.is_visible(), "Created task");
        Ok(task)
    }

    fn resolve_node(
        &self,
        task_info: &TaskInfo,
        raw: &Value,
        parent: &Value,
    ) -> ChefResult<ResolvedNode> {
        let name = task_info.name.as_deref().unwrap_or_default();
        match self.catalogs.schema_for(name) {
            SchemaLookup::Schema(schema) => resolve(task_info, raw, parent, Some(&schema)),
            SchemaLookup::Legacy(consumes) => resolve_legacy(task_info, raw, parent, &consumes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn factory(settings: Settings) -> TaskFactory {
        TaskFactory::new(Arc::new(Catalogs::with_builtins()), settings)
    }

    fn tree(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_disabled_node_produces_nothing() {
        let factory = factory(Settings::default());
        let tasks = factory
            .build(&tree(json!({"#lint": {}, "test": {"disabled": true}, "docs": false})))
            .unwrap();
        assert!(tasks.is_empty());
        assert!(factory.session().registry().is_empty());
    }

    #[test]
    fn test_hidden_node_not_registered() {
        let factory = factory(Settings::default());
        let tasks = factory.build(&tree(json!({".helper": {}}))).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(!factory.session().registry().contains("helper"));
        assert_eq!(
            factory.session().metadata().label(tasks[0].id).as_deref(),
            Some("<helper>")
        );
    }

    #[test]
    fn test_noop_for_unknown_strategy() {
        let factory = factory(Settings::default());
        let tasks = factory.build(&tree(json!({"lonely": {}}))).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        tasks[0]
            .call(&factory.context(), Box::new(move |r| tx.send(r).unwrap()))
            .unwrap();
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_runtime_suffix_and_description() {
        let factory = factory(Settings::default());
        let tasks = factory
            .build(&tree(json!({"deploy(production)": {"description": "Ship it"}})))
            .unwrap();
        assert_eq!(tasks[0].display_name, "deploy");
        assert_eq!(tasks[0].runtime, Some(json!("production")));
        assert_eq!(tasks[0].description, "Ship it");
    }

    #[test]
    fn test_duplicates_follow_policy() {
        let raw = json!({"a": {"x": {}}, "a:x": {}});

        let err = factory(Settings::default()).build(&tree(raw.clone())).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateTask);

        let settings = Settings {
            duplicates: DuplicatePolicy::Warn,
            ..Settings::default()
        };
        let factory = factory(settings);
        let tasks = factory.build(&tree(raw)).unwrap();
        assert_eq!(tasks.len(), 2);
        match factory.session().registry().lookup("a:x") {
            Some(RegisteredTask::Configurable(task)) => assert_eq!(task.id, tasks[1].id),
            other => panic!("unexpected registry entry: {:?}", other),
        }
    }
}
