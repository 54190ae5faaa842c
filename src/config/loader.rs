//! Task file loader with tier-based settings merging.
//!
//! The task tree comes from a single task file. Settings are layered
//! field-by-field, lowest to highest priority:
//! 1. built-in defaults
//! 2. the task file's top-level `settings:` section
//! 3. the user's `~/.task-chef/settings.yaml`
//! 4. environment variables

use super::merge::deep_merge_all;
use super::types::{DuplicatePolicy, Settings};
use crate::error::ChefError;
use anyhow::{Result, bail};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Task file names searched in the project directory, in order.
pub const TASK_FILE_NAMES: &[&str] = &["chef.yaml", "chef.yml", "chef.json"];

/// Key of the settings section inside the task file.
pub const SETTINGS_KEY: &str = "settings";

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// `settings:` section of the task file
    Project = 1,
    /// User-level settings (~/.task-chef/settings.yaml)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Where to look for the task file and user settings.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directory searched for `chef.yaml` / `chef.yml` / `chef.json`
    pub project_dir: PathBuf,
    /// User-level settings directory
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover paths from the environment and defaults.
    pub fn discover() -> Self {
        // Project dir: TASK_CHEF_PROJECT_DIR or $CWD
        let project_dir = std::env::var("TASK_CHEF_PROJECT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        // User dir: TASK_CHEF_USER_DIR or ~/.task-chef
        let user_dir = std::env::var("TASK_CHEF_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".task-chef")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: impl Into<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            user_dir,
        }
    }

    /// First existing task file in the project directory.
    pub fn find_task_file(&self) -> Option<PathBuf> {
        TASK_FILE_NAMES
            .iter()
            .map(|name| self.project_dir.join(name))
            .find(|path| path.is_file())
    }

    /// The user settings file, whether or not it exists.
    pub fn user_settings_file(&self) -> Option<PathBuf> {
        self.user_dir.as_ref().map(|dir| dir.join("settings.yaml"))
    }
}

/// Loaded task tree plus merged settings.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Paths used for discovery
    pub paths: ConfigPaths,
    /// Raw task tree (the task file without its `settings` section)
    tasks: Map<String, Value>,
    /// Merged settings
    settings: Settings,
    /// Task file that was read
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Load using discovered paths.
    ///
    /// An explicit task file (from `--config`) wins over
    /// `TASK_CHEF_CONFIG_PATH`, which wins over discovery.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let explicit = explicit.or_else(|| {
            std::env::var("TASK_CHEF_CONFIG_PATH")
                .ok()
                .map(PathBuf::from)
        });
        Self::load_with_paths(ConfigPaths::discover(), explicit)
    }

    /// Load with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths, explicit: Option<PathBuf>) -> Result<Self> {
        let config_path = match explicit.or_else(|| paths.find_task_file()) {
            Some(path) => path,
            None => bail!(
                "no task file found in {} (looked for {})",
                paths.project_dir.display(),
                TASK_FILE_NAMES.join(", ")
            ),
        };
        debug!(path = %config_path.display(), "Loading task file");

        let mut tasks = match read_document(&config_path)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ChefError::invalid_shape(format!(
                    "{} must contain a mapping of task names",
                    config_path.display()
                ))
                .into());
            }
        };

        // Collect settings from each tier
        let mut layers: Vec<Value> = Vec::new();

        // Tier 1: Defaults
        layers.push(serde_json::to_value(Settings::default())?);

        // Tier 2: Project settings section
        if let Some(section) = tasks.remove(SETTINGS_KEY) {
            layers.push(section);
        }

        // Tier 3: User settings
        if let Some(user_file) = paths.user_settings_file()
            && user_file.is_file()
        {
            match read_document(&user_file) {
                Ok(value) => layers.push(value),
                Err(err) => warn!(path = %user_file.display(), "Ignoring user settings: {}", err),
            }
        }

        let merged = deep_merge_all(layers);
        let mut settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ChefError::parse(SETTINGS_KEY, e))?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut settings);

        Ok(Self {
            paths,
            tasks,
            settings,
            config_path,
        })
    }

    /// Apply environment variable overrides to settings.
    fn apply_env_overrides(settings: &mut Settings) {
        if let Ok(level) = std::env::var("TASK_CHEF_LOG_LEVEL") {
            settings.log_level = level;
        }

        if let Ok(policy) = std::env::var("TASK_CHEF_DUPLICATES") {
            match serde_json::from_value::<DuplicatePolicy>(Value::String(policy.clone())) {
                Ok(policy) => settings.duplicates = policy,
                Err(_) => warn!("Ignoring TASK_CHEF_DUPLICATES={}: expected allow, warn or reject", policy),
            }
        }
    }

    /// The raw task tree.
    pub fn tasks(&self) -> &Map<String, Value> {
        &self.tasks
    }

    /// The merged settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The task file that was read.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Consume the loader and return the task tree and settings.
    pub fn into_parts(self) -> (Map<String, Value>, Settings) {
        (self.tasks, self.settings)
    }
}

/// Read a YAML or JSON document; the format is chosen by extension.
pub fn read_document(path: &Path) -> Result<Value, ChefError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ChefError::io(&display, e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| ChefError::parse(&display, e))
    } else {
        serde_yaml::from_str(&content).map_err(|e| ChefError::parse(&display, e))
    }
}
