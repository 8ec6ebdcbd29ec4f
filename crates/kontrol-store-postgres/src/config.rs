// crates/kontrol-store-postgres/src/config.rs
// ============================================================================
// Module: Postgres Connection Config
// Description: Connection settings and their environment fallbacks.
// Purpose: Resolve a complete connection description before dialing.
// Dependencies: kontrol-core, postgres, serde
// ============================================================================

//! ## Overview
//! [`PostgresConfig`] mirrors what an operator writes in a config file. The
//! username and database name are required; when left blank they fall back
//! to [`USERNAME_ENV_VAR`] and [`DBNAME_ENV_VAR`]. Resolution takes the
//! environment as a lookup function so callers and tests control it.

use std::time::Duration;

use kontrol_core::RegistryError;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable consulted when no username is configured.
pub const USERNAME_ENV_VAR: &str = "KONTROL_POSTGRES_USERNAME";
/// Environment variable consulted when no database name is configured.
pub const DBNAME_ENV_VAR: &str = "KONTROL_POSTGRES_DBNAME";

/// Default server host.
const DEFAULT_HOST: &str = "localhost";
/// Default server port.
const DEFAULT_PORT: u16 = 5432;
/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 16;
/// Default connect timeout in milliseconds.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Default statement timeout in milliseconds.
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Postgres connection settings as configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role; falls back to [`USERNAME_ENV_VAR`].
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Database name; falls back to [`DBNAME_ENV_VAR`].
    pub dbname: Option<String>,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            dbname: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }
}

impl PostgresConfig {
    /// Resolves required fields using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Configuration`] when a required field stays
    /// unresolved.
    pub fn resolve_from_env(&self) -> Result<ResolvedPostgresConfig, RegistryError> {
        self.resolve(|key| std::env::var(key).ok())
    }

    /// Resolves required fields, consulting `env` for blank ones.
    ///
    /// Empty strings count as missing both in the config and in `env`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Configuration`] when a required field stays
    /// unresolved or the pool size is zero.
    pub fn resolve(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedPostgresConfig, RegistryError> {
        let username = required(self.username.as_deref(), USERNAME_ENV_VAR, "username", &env)?;
        let dbname = required(self.dbname.as_deref(), DBNAME_ENV_VAR, "dbname", &env)?;
        if self.max_connections == 0 {
            return Err(RegistryError::Configuration(
                "postgres max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(ResolvedPostgresConfig {
            host: self.host.clone(),
            port: self.port,
            username,
            password: self.password.clone().filter(|password| !password.is_empty()),
            dbname,
            max_connections: self.max_connections,
            connect_timeout_ms: self.connect_timeout_ms,
            statement_timeout_ms: self.statement_timeout_ms,
        })
    }
}

/// Picks the configured value or the environment fallback.
fn required(
    configured: Option<&str>,
    env_var: &str,
    label: &str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<String, RegistryError> {
    configured
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| env(env_var).filter(|value| !value.is_empty()))
        .ok_or_else(|| {
            RegistryError::Configuration(format!(
                "postgres {label} is not set; configure it or export {env_var}"
            ))
        })
}

// ============================================================================
// SECTION: Resolved Config
// ============================================================================

/// Connection settings with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPostgresConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub username: String,
    /// Optional password.
    pub password: Option<String>,
    /// Database name.
    pub dbname: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

impl ResolvedPostgresConfig {
    /// Builds the driver configuration.
    #[must_use]
    pub fn to_pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config.host(&self.host).port(self.port).user(&self.username).dbname(&self.dbname);
        if let Some(password) = &self.password {
            config.password(password);
        }
        config.connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        config.options(&format!("-c statement_timeout={}", self.statement_timeout_ms));
        config
    }
}
