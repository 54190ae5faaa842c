//! CLI command definitions for task-chef
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod list;
pub mod run;
pub mod show;

use clap::{Parser, Subcommand};
use list::ListArgs;
use run::RunArgs;
use show::ShowArgs;
use std::path::PathBuf;

/// Configuration-driven task composition
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the task file (default: chef.yaml, chef.yml or chef.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered tasks
    List(ListArgs),

    /// Show one task's resolved configuration
    Show(ShowArgs),

    /// Run a registered task
    Run(RunArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::parse_from(["task-chef", "-v", "run", "build", "--log", "off"]);
        assert!(cli.verbose);
        assert_eq!(cli.log, "off");
        match cli.command {
            Command::Run(args) => assert_eq!(args.task, "build"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_list_tree() {
        let cli = Cli::parse_from(["task-chef", "--config", "tasks.yaml", "list", "--tree"]);
        assert_eq!(cli.config, Some(PathBuf::from("tasks.yaml")));
        assert!(matches!(cli.command, Command::List(ListArgs { tree: true, .. })));
    }
}
