//! Built-in stream processors and recipes.
//!
//! - `merge`: start every sub-task at once; the returned stream finishes when
//!   all have (the default combinator)
//! - `queue`: run sub-tasks one at a time; the returned stream finishes after
//!   the last one
//! - `parallel` / `series`: the same compositions reported through `done`
//!   instead of a stream
//! - `log`: recipe that logs its realized `message`
//!
//! Sub-tasks receive the combinator's realized config as injected config.

use crate::error::ChefResult;
use crate::registry::{Catalogs, Recipe, StreamProcessor};
use crate::stream::{Done, Step, Stream, join_all, sequence};
use crate::task::{Context, ExecutableTask, RunnerFn, StreamFn};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// Register the built-ins into `catalogs`.
pub fn register(catalogs: &mut Catalogs) {
    catalogs.streams.register(
        "merge",
        StreamProcessor::new(Arc::new(merge) as StreamFn).with_schema(json!({
            "title": "merge",
            "description": "Run sub-tasks concurrently and merge their streams.",
            "properties": {}
        })),
    );
    catalogs.streams.register(
        "queue",
        StreamProcessor::new(Arc::new(queue) as StreamFn).with_schema(json!({
            "title": "queue",
            "description": "Run sub-tasks one at a time, in declaration order.",
            "properties": {}
        })),
    );
    catalogs.streams.register(
        "parallel",
        StreamProcessor::new(Arc::new(parallel) as StreamFn).with_schema(json!({
            "title": "parallel",
            "description": "Run sub-tasks in parallel, without waiting for the previous one.",
            "properties": {}
        })),
    );
    catalogs.streams.register(
        "series",
        StreamProcessor::new(Arc::new(series) as StreamFn).with_schema(json!({
            "title": "series",
            "description": "Run sub-tasks one after another.",
            "properties": {}
        })),
    );
    catalogs.recipes.register(
        "log",
        Recipe::new(Arc::new(log) as RunnerFn).with_schema(json!({
            "title": "log",
            "description": "Log a message.",
            "properties": {
                "message": { "description": "Text to log; may use {{placeholders}}" }
            }
        })),
    );
}

fn steps(
    ctx: &Context,
    config: &Value,
    stream: Option<&Stream>,
    tasks: &[Arc<ExecutableTask>],
) -> Vec<Step> {
    tasks
        .iter()
        .map(|task| {
            let task = Arc::clone(task);
            let ctx = ctx.clone();
            let config = config.clone();
            let stream = stream.cloned();
            Box::new(move |done: Done| task.run(&ctx, &config, stream.as_ref(), done)) as Step
        })
        .collect()
}

fn merge(
    ctx: &Context,
    config: &Value,
    stream: Option<&Stream>,
    tasks: &[Arc<ExecutableTask>],
    _done: Done,
) -> ChefResult<Option<Stream>> {
    let output = Stream::new("merge");
    let sink = output.clone();
    join_all(
        steps(ctx, config, stream, tasks),
        Box::new(move |result| {
            sink.finish(result);
        }),
    );
    Ok(Some(output))
}

fn queue(
    ctx: &Context,
    config: &Value,
    stream: Option<&Stream>,
    tasks: &[Arc<ExecutableTask>],
    _done: Done,
) -> ChefResult<Option<Stream>> {
    let output = Stream::new("queue");
    let sink = output.clone();
    sequence(
        steps(ctx, config, stream, tasks),
        Box::new(move |result| {
            sink.finish(result);
        }),
    );
    Ok(Some(output))
}

fn parallel(
    ctx: &Context,
    config: &Value,
    stream: Option<&Stream>,
    tasks: &[Arc<ExecutableTask>],
    done: Done,
) -> ChefResult<Option<Stream>> {
    join_all(steps(ctx, config, stream, tasks), done);
    Ok(None)
}

fn series(
    ctx: &Context,
    config: &Value,
    stream: Option<&Stream>,
    tasks: &[Arc<ExecutableTask>],
    done: Done,
) -> ChefResult<Option<Stream>> {
    sequence(steps(ctx, config, stream, tasks), done);
    Ok(None)
}

fn log(_ctx: &Context, config: &Value, _stream: Option<&Stream>, done: Done) -> ChefResult<Option<Stream>> {
    match config.get("message") {
        Some(Value::String(message)) => info!("{}", message),
        Some(other) => info!("{}", other),
        None => info!(config = %config, "log"),
    }
    done(Ok(()));
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Defaults, Visibility};
    use crate::error::ChefError;
    use crate::registry::TaskRegistry;
    use crate::task::Runner;
    use parking_lot::Mutex;

    fn leaf(id: usize, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<ExecutableTask> {
        let log = Arc::clone(log);
        let runner = Runner::new(Arc::new(move |_ctx, config: &Value, _stream, done| {
            log.lock().push(config["label"].as_str().unwrap_or("?").to_string());
            done(if fail {
                Err(ChefError::task_failed("leaf", "boom"))
            } else {
                Ok(())
            });
            Ok(None)
        }));
        Arc::new(ExecutableTask {
            id,
            display_name: format!("leaf{}", id),
            name: format!("leaf{}", id),
            description: String::new(),
            visibility: Visibility::Visible,
            runtime: None,
            config: json!({"label": format!("{{{{prefix}}}}-{}", id)}),
            runner: runner.with_defaults(Defaults::default()),
        })
    }

    fn ctx() -> Context {
        Context::new(Arc::new(TaskRegistry::new()))
    }

    #[test]
    fn test_builtins_registered() {
        let catalogs = Catalogs::with_builtins();
        for name in ["merge", "queue", "parallel", "series"] {
            assert!(catalogs.streams.contains(name), "{}", name);
        }
        assert!(catalogs.recipes.contains("log"));
    }

    #[test]
    fn test_merge_realizes_children_with_injected_config() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tasks = vec![leaf(1, &log, false), leaf(2, &log, false)];
        let stream = merge(&ctx(), &json!({"prefix": "app"}), None, &tasks, Box::new(|_| {}))
            .unwrap()
            .unwrap();
        assert!(stream.outcome().is_some_and(|r| r.is_ok()));
        assert_eq!(*log.lock(), ["app-1", "app-2"]);
    }

    #[test]
    fn test_queue_stops_at_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tasks = vec![leaf(1, &log, true), leaf(2, &log, false)];
        let stream = queue(&ctx(), &json!({}), None, &tasks, Box::new(|_| {}))
            .unwrap()
            .unwrap();
        assert!(stream.outcome().is_some_and(|r| r.is_err()));
        assert_eq!(*log.lock(), ["prefix-1"]);
    }

    #[test]
    fn test_parallel_flow_reports_through_done() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tasks = vec![leaf(1, &log, false), leaf(2, &log, true)];
        let (tx, rx) = std::sync::mpsc::channel();
        let returned = parallel(
            &ctx(),
            &json!({}),
            None,
            &tasks,
            Box::new(move |r| tx.send(r).unwrap()),
        )
        .unwrap();
        assert!(returned.is_none());
        assert!(rx.try_recv().unwrap().is_err());
        assert_eq!(log.lock().len(), 2);
    }
}
