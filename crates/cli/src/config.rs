use std::path::{Path, PathBuf};

use orchestrator::RunnerConfig;
use serde::{Deserialize, Serialize};

pub const TASKFLOW_DIR: &str = ".taskflow";
pub const CONFIG_FILE: &str = "config.toml";
const DEFAULT_PLANS_DIR: &str = ".taskflow/plans";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskflowConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_plans_dir")]
    pub plans_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            plans_dir: default_plans_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_plans_dir() -> PathBuf {
    PathBuf::from(DEFAULT_PLANS_DIR)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Outcome of reading the config file.
#[derive(Debug)]
pub enum Loaded {
    Found(TaskflowConfig),
    Missing,
    /// The file exists but could not be used
    Invalid(String),
}

impl Loaded {
    pub fn into_config(self) -> TaskflowConfig {
        match self {
            Self::Found(config) => config,
            Self::Missing | Self::Invalid(_) => TaskflowConfig::default(),
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(TASKFLOW_DIR).join(CONFIG_FILE)
}

pub async fn load(root: &Path) -> Loaded {
    let path = config_path(root);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Missing,
        Err(e) => return Loaded::Invalid(format!("{}: {}", path.display(), e)),
    };

    match toml::from_str(&content) {
        Ok(config) => Loaded::Found(config),
        Err(e) => Loaded::Invalid(format!("{}: {}", path.display(), e)),
    }
}

/// Resolve the plans dir against the project root.
pub fn plans_dir(root: &Path, config: &TaskflowConfig) -> PathBuf {
    if config.storage.plans_dir.is_absolute() {
        config.storage.plans_dir.clone()
    } else {
        root.join(&config.storage.plans_dir)
    }
}
