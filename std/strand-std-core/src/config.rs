///
/// # Runtime Configuration
///
/// Types and functions for loading `strand.toml` runtime configuration.
/// Every field has a default, so an empty file (or no file at all) yields a
/// usable configuration.
///
/// ## Example strand.toml
///
/// ```toml
/// [threads]
/// name_prefix = "worker"
/// stack_size = 2097152
///
/// [logging]
/// level = "debug"
/// ansi = false
/// ```
///
/// ## Process-wide Configuration
///
/// `install()` publishes a configuration once for the whole process. Threads
/// read `current()` when they are started, so install before starting any.
/// Without an install, `current()` returns the defaults.
///

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub threads: ThreadsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Native threads are named `<name_prefix>-<n>`
    pub name_prefix: String,
    /// Stack size in bytes; the platform default when absent
    pub stack_size: Option<usize>,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            name_prefix: "strand".to_string(),
            stack_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: false,
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

pub fn parse_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl RuntimeConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        parse_config(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads.name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("threads.name_prefix must not be empty".to_string()));
        }
        if self.threads.stack_size == Some(0) {
            return Err(ConfigError::Invalid("threads.stack_size must be positive".to_string()));
        }
        self.logging.max_level()?;
        Ok(())
    }
}

impl FromStr for RuntimeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_config_str(s)
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Publish the process-wide configuration. Returns `false` if one was
/// already installed (the first one stays in effect).
pub fn install(config: RuntimeConfig) -> bool {
    CONFIG.set(config).is_ok()
}

pub fn current() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}
