//! Task configuration: normalization, inheritance, realization and loading.
//!
//! Every node of the user's task tree goes through:
//! 1. **Normalize** - `schema`: aliases, defaults, required, `others` bucket
//! 2. **Inherit** - `resolve`: src/dest joins plus first-writer-wins merge
//! 3. **Realize** - `realize`: per-invocation merge and `{{placeholder}}` fill
//!
//! ## Environment Variables
//! - `TASK_CHEF_CONFIG_PATH` - Explicit task file (overrides discovery)
//! - `TASK_CHEF_PROJECT_DIR` - Directory searched for the task file (default: `.`)
//! - `TASK_CHEF_USER_DIR` - User settings dir (default: `~/.task-chef`)
//! - `TASK_CHEF_LOG_LEVEL` - Overrides `settings.log_level`
//! - `TASK_CHEF_DUPLICATES` - Overrides `settings.duplicates`

mod loader;
mod merge;
mod realize;
mod resolve;
mod schema;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, SETTINGS_KEY, TASK_FILE_NAMES, read_document};
pub use merge::{deep_merge, deep_merge_all, defaults_deep, defaults_deep_all};
pub use realize::{ComputeFn, Defaults, interpolate, realize};
pub use resolve::{RESERVED_KEYS, normalize_dest, normalize_src, resolve, resolve_legacy, resolve_with};
pub use schema::{Normalizer, OTHERS, SchemaNormalizer};
pub use types::*;
