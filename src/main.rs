//! task-chef
//!
//! Builds the task tree described by the project's task file and lists,
//! shows or runs its tasks.

use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use task_chef::cli::list::run_list;
use task_chef::cli::run::run_task;
use task_chef::cli::show::run_show;
use task_chef::cli::{Cli, Command};
use task_chef::config::ConfigLoader;
use task_chef::factory::TaskFactory;
use task_chef::logging::{self, LogTarget};
use task_chef::registry::Catalogs;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings carry the default log level, so load before logging starts
    let loader = ConfigLoader::load(cli.config.clone())?;
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        loader.settings().log_level.clone()
    };
    logging::init(&LogTarget::parse(&cli.log), &level)?;
    info!(path = %loader.config_path().display(), "Loaded task file");

    let (tasks, settings) = loader.into_parts();
    let factory = TaskFactory::new(Arc::new(Catalogs::with_builtins()), settings);
    let roots = factory.build(&tasks)?;
    debug!(
        roots = roots.len(),
        registered = factory.session().registry().len(),
        "Built task tree"
    );

    let mut stdout = std::io::stdout();
    match cli.command {
        Command::List(args) => {
            stdout.write_all(run_list(&factory, &roots, &args)?.as_bytes())?;
        }
        Command::Show(args) => {
            stdout.write_all(run_show(&factory, &args)?.as_bytes())?;
        }
        Command::Run(args) => run_task(&factory, &args)?,
    }
    Ok(())
}
