// crates/kontrol-config/src/config.rs
// ============================================================================
// Module: Kontrol Configuration
// Description: TOML configuration model with loading and validation.
// Purpose: Describe storage, sweeper, and logging settings for a registry.
// Dependencies: kontrol-core, kontrol-store-postgres, kontrol-store-sqlite,
//               serde, toml
// ============================================================================

//! ## Overview
//! A config file has three sections:
//!
//! ```toml
//! [storage]
//! backend = "postgres"
//! host = "localhost"
//! dbname = "kontrol"
//!
//! [sweeper]
//! interval_ms = 30000
//! expire_ms = 20000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every section is optional. The storage section defaults to Postgres with
//! its environment fallbacks for username and database name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kontrol_core::LogLevel;
use kontrol_core::LogLevelState;
use kontrol_core::StderrLogger;
use kontrol_core::SweeperConfig;
use kontrol_store_postgres::PostgresConfig;
use kontrol_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "kontrol.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "KONTROL_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

/// Default time between sweeps in milliseconds.
const DEFAULT_INTERVAL_MS: u64 = 30_000;
/// Default expiry age in milliseconds.
const DEFAULT_EXPIRE_MS: u64 = 20_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level registry configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KontrolConfig {
    /// Storage backend selection.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sweeper schedule.
    #[serde(default)]
    pub sweeper: SweeperSettings,
    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend, tagged by `backend`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Shared `PostgreSQL` database.
    Postgres(PostgresConfig),
    /// Local `SQLite` file.
    Sqlite(SqliteStoreConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Postgres(PostgresConfig::default())
    }
}

/// Sweeper schedule in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweeperSettings {
    /// Time between sweeps.
    pub interval_ms: u64,
    /// Age after which an unrefreshed kite is evicted.
    pub expire_ms: u64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            expire_ms: DEFAULT_EXPIRE_MS,
        }
    }
}

impl SweeperSettings {
    /// Converts to the engine's sweeper schedule.
    #[must_use]
    pub const fn to_sweeper_config(self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_millis(self.interval_ms),
            expire: Duration::from_millis(self.expire_ms),
        }
    }

    /// Rejects a zero interval or expiry.
    fn validate(self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.expire_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweeper.expire_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Base level; `KITE_LOG_LEVEL` applies when unset.
    pub level: Option<LogLevel>,
}

impl LoggingConfig {
    /// Returns the configured level or the environment default.
    #[must_use]
    pub fn resolve_level(self) -> LogLevel {
        self.level.unwrap_or_else(LogLevel::from_env)
    }

    /// Builds a shared level state at the resolved level.
    #[must_use]
    pub fn level_state(self) -> Arc<LogLevelState> {
        Arc::new(LogLevelState::new(self.resolve_level()))
    }

    /// Builds a JSON-lines stderr logger at the resolved level.
    ///
    /// The logger's [`LogLevelState`] stays reachable through
    /// [`StderrLogger::level_state`] for runtime debug toggling.
    #[must_use]
    pub fn stderr_logger(self, name: &str) -> Arc<StderrLogger> {
        Arc::new(StderrLogger::new(name, self.level_state()))
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl KontrolConfig {
    /// Loads configuration from `path`, [`CONFIG_ENV_VAR`], or
    /// `kontrol.toml`, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sweeper.validate()?;
        match &self.storage {
            StorageConfig::Postgres(postgres) => {
                if postgres.max_connections == 0 {
                    return Err(ConfigError::Invalid(
                        "storage.max_connections must be greater than zero".to_string(),
                    ));
                }
            }
            StorageConfig::Sqlite(sqlite) => {
                if sqlite.path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("storage.path must be set".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    match env::var(CONFIG_ENV_VAR) {
        Ok(env_path) if !env_path.is_empty() => PathBuf::from(env_path),
        _ => PathBuf::from(DEFAULT_CONFIG_NAME),
    }
}
