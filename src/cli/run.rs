//! `run` command: invoke one registered task and wait for it to settle.

use crate::error::{ChefError, ChefResult};
use crate::factory::TaskFactory;
use crate::registry::RegisteredTask;
use crate::stream::{Step, start};
use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde_json::{Map, Value};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Display name of the task to run
    pub task: String,

    /// Extra config injected at call time, as a JSON object
    #[arg(long = "with", value_name = "JSON")]
    pub with: Option<String>,

    /// Seconds to wait for asynchronous completion
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

/// Run a task; errors if it fails or does not settle within the timeout.
pub fn run_task(factory: &TaskFactory, args: &RunArgs) -> Result<()> {
    let injected = match &args.with {
        Some(text) => {
            let value: Value = serde_json::from_str(text).context("--with must be valid JSON")?;
            if !value.is_object() {
                bail!("--with must be a JSON object");
            }
            value
        }
        None => Value::Object(Map::new()),
    };

    let entry = factory
        .session()
        .registry()
        .lookup(&args.task)
        .ok_or_else(|| ChefError::task_not_found(&args.task))?;

    let ctx = factory.context();
    let step: Step = match entry {
        RegisteredTask::Configurable(task) => {
            Box::new(move |done| task.run(&ctx, &injected, None, done))
        }
        RegisteredTask::Plain(plain) => Box::new(move |done| (plain.func)(&ctx, done)),
    };

    let started = Instant::now();
    let (tx, rx) = mpsc::channel::<ChefResult<()>>();
    start(
        step,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );

    match rx.recv_timeout(Duration::from_secs(args.timeout)) {
        Ok(Ok(())) => {
            info!(task = %args.task, elapsed_ms = started.elapsed().as_millis() as u64, "Finished");
            Ok(())
        }
        Ok(Err(err)) => Err(err.into()),
        Err(_) => bail!("task '{}' did not complete", args.task),
    }
}
