//! Application configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `HABITRACK_*` environment variables. Invalid environment values are
//! logged and ignored.

use crate::client::session::SessionOptions;
use crate::client::store::LEADERBOARD_LIMIT;
use crate::client::completion::UNDO_WINDOW;
use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "HABITRACK_DB";
pub const ENV_LOG_LEVEL: &str = "HABITRACK_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HABITRACK_LOG_DIR";
pub const ENV_UNDO_WINDOW_MS: &str = "HABITRACK_UNDO_WINDOW_MS";

const DEFAULT_DATABASE_FILE: &str = "habitrack.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "failed to parse {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_level: String,
    /// Must be absolute.
    pub log_dir: PathBuf,
    pub undo_window_ms: u64,
    pub leaderboard_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: std::env::temp_dir().join("habitrack").join("logs"),
            undo_window_ms: u64::try_from(UNDO_WINDOW.as_millis()).unwrap_or(u64::MAX),
            leaderboard_limit: LEADERBOARD_LIMIT,
        }
    }
}

/// One partial layer as written in a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub database_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub undo_window_ms: Option<u64>,
    pub leaderboard_limit: Option<u32>,
}

impl ConfigLayer {
    pub fn apply_to(self, config: &mut AppConfig) {
        if let Some(path) = self.database_path {
            config.database_path = path;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }
        if let Some(window) = self.undo_window_ms {
            config.undo_window_ms = window;
        }
        if let Some(limit) = self.leaderboard_limit {
            config.leaderboard_limit = limit;
        }
    }
}

impl AppConfig {
    /// Defaults, then `path` when it exists, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(layer) = path.map(load_layer).transpose()?.flatten() {
            layer.apply_to(&mut config);
        }
        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.undo_window_ms == 0 {
            return Err(ConfigError::Invalid("undo_window_ms must be positive".into()));
        }
        if self.leaderboard_limit == 0 {
            return Err(ConfigError::Invalid("leaderboard_limit must be positive".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database_path cannot be empty".into()));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            undo_window: Duration::from_millis(self.undo_window_ms),
        }
    }
}

/// Reads one TOML layer; `None` when the file does not exist.
pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides_with(config, |key| std::env::var(key).ok());
}

/// Applies overrides from `lookup`, keyed by the `ENV_*` names.
pub fn apply_overrides_with(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let value = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    if let Some(path) = value(ENV_DATABASE) {
        config.database_path = PathBuf::from(path);
    }
    if let Some(level) = value(ENV_LOG_LEVEL) {
        config.log_level = level;
    }
    if let Some(dir) = value(ENV_LOG_DIR) {
        config.log_dir = PathBuf::from(dir);
    }
    if let Some(raw) = value(ENV_UNDO_WINDOW_MS) {
        match raw.parse::<u64>() {
            Ok(window) if window > 0 => config.undo_window_ms = window,
            Ok(_) => warn!("event=config_env module=config status=ignored key={ENV_UNDO_WINDOW_MS} reason=zero"),
            Err(err) => warn!(
                "event=config_env module=config status=ignored key={ENV_UNDO_WINDOW_MS} error={err}"
            ),
        }
    }
}
