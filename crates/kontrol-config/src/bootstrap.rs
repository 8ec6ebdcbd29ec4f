// crates/kontrol-config/src/bootstrap.rs
// ============================================================================
// Module: Registry Bootstrap
// Description: Opens the configured store and starts the registry.
// Purpose: Single entry point from configuration to a running registry.
// Dependencies: kontrol-core, kontrol-store-postgres, kontrol-store-sqlite
// ============================================================================

//! Backend selection and sweeper start-up.

use std::sync::Arc;

use kontrol_core::Kontrol;
use kontrol_core::LogLevelState;
use kontrol_core::Logger;
use kontrol_core::RegistryError;
use kontrol_core::RegistryStore;
use kontrol_core::StoreError;
use kontrol_store_postgres::PostgresRegistryStore;
use kontrol_store_sqlite::SqliteRegistryStore;

use crate::config::KontrolConfig;
use crate::config::StorageConfig;

/// Logger name used by [`start_kontrol`].
pub const LOGGER_NAME: &str = "kontrol";

/// Opens the configured storage backend.
///
/// # Errors
///
/// Returns [`RegistryError::Configuration`] when required settings are
/// missing, [`RegistryError::Connection`] when the Postgres pool cannot be
/// built, and [`RegistryError::Store`] when opening or schema setup fails.
pub fn open_store(
    storage: &StorageConfig,
    logger: &dyn Logger,
) -> Result<Arc<dyn RegistryStore>, RegistryError> {
    match storage {
        StorageConfig::Postgres(config) => {
            let resolved = config.resolve_from_env()?;
            Ok(Arc::new(PostgresRegistryStore::connect(&resolved, logger)?))
        }
        StorageConfig::Sqlite(config) => {
            let store = SqliteRegistryStore::open(config, logger).map_err(StoreError::from)?;
            Ok(Arc::new(store))
        }
    }
}

/// Opens the configured store and starts the sweeper over it.
///
/// # Errors
///
/// Returns [`RegistryError`] when the store cannot be opened or the sweeper
/// cannot start.
pub fn open_kontrol(
    config: &KontrolConfig,
    logger: Arc<dyn Logger>,
) -> Result<Kontrol<dyn RegistryStore>, RegistryError> {
    let store = open_store(&config.storage, logger.as_ref())?;
    logger.info(format_args!("registry: store ready, starting sweeper"));
    Kontrol::start(store, config.sweeper.to_sweeper_config(), logger)
}

/// Starts the registry with a stderr logger built from `[logging]`.
///
/// Returns the running registry and the level state of its logger.
///
/// # Errors
///
/// Same as [`open_kontrol`].
pub fn start_kontrol(
    config: &KontrolConfig,
) -> Result<(Kontrol<dyn RegistryStore>, Arc<LogLevelState>), RegistryError> {
    let logger = config.logging.stderr_logger(LOGGER_NAME);
    let level = Arc::clone(logger.level_state());
    let kontrol = open_kontrol(config, logger)?;
    Ok((kontrol, level))
}
