//! task-chef library
//!
//! Turns a declarative task tree into registered, composable tasks:
//! configuration resolution (`config`), runner selection (`runner`),
//! task construction (`factory`) and completion plumbing (`stream`).

pub mod builtins;
pub mod cli;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod metadata;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod stream;
pub mod task;
