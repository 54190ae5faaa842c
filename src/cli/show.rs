//! `show` command: one task's identity and statically resolved config.

use crate::error::ChefError;
use crate::factory::TaskFactory;
use crate::registry::RegisteredTask;
use anyhow::Result;
use clap::Args;
use serde_json::{Value, json};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Display name of the task (e.g. `build:minify`)
    pub task: String,
}

pub fn run_show(factory: &TaskFactory, args: &ShowArgs) -> Result<String> {
    let entry = factory
        .session()
        .registry()
        .lookup(&args.task)
        .ok_or_else(|| ChefError::task_not_found(&args.task))?;

    let view = match entry {
        RegisteredTask::Configurable(task) => json!({
            "display_name": task.display_name,
            "name": task.name,
            "description": task.description,
            "visibility": task.visibility,
            "runtime": task.runtime,
            "config": task.config,
        }),
        RegisteredTask::Plain(plain) => json!({
            "display_name": plain.name,
            "name": plain.name,
            "description": plain.description.unwrap_or_default(),
            "visibility": "visible",
            "runtime": Value::Null,
            "config": Value::Null,
        }),
    };
    Ok(serde_json::to_string_pretty(&view)? + "\n")
}
