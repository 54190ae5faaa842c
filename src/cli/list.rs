//! `list` command: registered tasks, flat or as the build tree.

use crate::factory::TaskFactory;
use crate::task::ExecutableTask;
use anyhow::Result;
use clap::Args;
use std::fmt::Write;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show how tasks nest instead of a flat list
    #[arg(long)]
    pub tree: bool,

    /// Print the tree as JSON (implies --tree)
    #[arg(long)]
    pub json: bool,
}

/// Render the listing for the tasks built from the top-level config.
pub fn run_list(factory: &TaskFactory, roots: &[Arc<ExecutableTask>], args: &ListArgs) -> Result<String> {
    let metadata = factory.session().metadata();
    if args.json {
        let trees: Vec<_> = roots.iter().filter_map(|task| metadata.tree(task.id)).collect();
        return Ok(serde_json::to_string_pretty(&trees)? + "\n");
    }
    if args.tree {
        let ids: Vec<usize> = roots.iter().map(|task| task.id).collect();
        return Ok(metadata.render(&ids));
    }

    let registry = factory.session().registry();
    let names = registry.names();
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
    let mut out = String::new();
    for name in names {
        match registry.lookup(&name).and_then(|t| t.description().map(str::to_string)) {
            Some(description) if !description.is_empty() => {
                writeln!(out, "{:width$}  {}", name, description, width = width)?
            }
            _ => writeln!(out, "{}", name)?,
        }
    }
    Ok(out)
}
