//! Store and logging configuration.
//!
//! # Responsibility
//! - Describe which repository variant to open, where, and how many pooled
//!   connections it may hold.
//! - Describe the file logger's level and directory.
//! - Load settings from the process environment with logged fallbacks.
//!
//! # Invariants
//! - Missing values fall back to defaults; malformed values are errors.
//! - A `None` path means an in-memory database.

use crate::db::DEFAULT_POOL_SIZE;
use crate::logging::{default_log_level, LogLevel};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DRIVER_ENV: &str = "ITEMSTORE_DRIVER";
pub const DB_PATH_ENV: &str = "ITEMSTORE_DB_PATH";
pub const BUSY_TIMEOUT_ENV: &str = "ITEMSTORE_BUSY_TIMEOUT_MS";
pub const POOL_SIZE_ENV: &str = "ITEMSTORE_POOL_SIZE";
pub const LOG_LEVEL_ENV: &str = "ITEMSTORE_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "ITEMSTORE_LOG_DIR";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Repository variant used for item persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseDriver {
    /// `item` table plus `item_tag` join table.
    Relational,
    /// One JSON document per item with embedded tags.
    #[default]
    Document,
}

impl DatabaseDriver {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
        }
    }
}

impl FromStr for DatabaseDriver {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "sql" | "sqlite" => Ok(Self::Relational),
            "document" | "doc" => Ok(Self::Document),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

/// Configuration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownDriver(String),
    InvalidBusyTimeout(String),
    InvalidPoolSize(String),
    InvalidLogLevel(String),
    RelativeLogDir(PathBuf),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDriver(value) => write!(
                f,
                "unsupported database driver `{value}`; expected relational|document"
            ),
            Self::InvalidBusyTimeout(value) => {
                write!(f, "invalid busy timeout `{value}`; expected milliseconds")
            }
            Self::InvalidPoolSize(value) => {
                write!(f, "invalid pool size `{value}`; expected a positive integer")
            }
            Self::InvalidLogLevel(value) => write!(
                f,
                "unsupported log level `{value}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeLogDir(dir) => {
                write!(f, "log directory must be absolute, got `{}`", dir.display())
            }
        }
    }
}

impl Error for ConfigError {}

/// Settings consumed by `open_item_repository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: DatabaseDriver,
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    /// Upper bound on pooled connections shared by concurrent requests.
    pub pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl StoreConfig {
    /// In-memory configuration for the given driver.
    pub fn in_memory(driver: DatabaseDriver) -> Self {
        Self {
            driver,
            ..Self::default()
        }
    }

    /// Storage deadline applied to every statement.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Reads `ITEMSTORE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        match lookup(DRIVER_ENV) {
            Some(value) => config.driver = value.parse()?,
            None => info!(
                "event=config_load module=config status=default key={DRIVER_ENV} value={}",
                config.driver.as_str()
            ),
        }

        match lookup(DB_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            Some(value) => config.path = Some(PathBuf::from(value.trim())),
            None => info!(
                "event=config_load module=config status=default key={DB_PATH_ENV} value=memory"
            ),
        }

        if let Some(value) = lookup(BUSY_TIMEOUT_ENV) {
            config.busy_timeout_ms = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBusyTimeout(value.clone()))?;
        }

        if let Some(value) = lookup(POOL_SIZE_ENV) {
            config.pool_size = value
                .trim()
                .parse()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| ConfigError::InvalidPoolSize(value.clone()))?;
        }

        Ok(config)
    }
}

/// File logger settings handed to `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Absolute directory holding the rotated `itemstore` log files.
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: std::env::temp_dir().join("itemstore-logs"),
        }
    }
}

impl LogConfig {
    /// Reads `ITEMSTORE_LOG_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds logger settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(LOG_LEVEL_ENV) {
            config.level = value
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(value.clone()))?;
        }

        if let Some(value) = lookup(LOG_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            let dir = PathBuf::from(value.trim());
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir));
            }
            config.dir = dir;
        }

        Ok(config)
    }
}
