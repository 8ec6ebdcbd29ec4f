// crates/kontrol-config/src/lib.rs
// ============================================================================
// Module: Kontrol Config
// Description: Configuration model, loading, and registry bootstrap.
// Purpose: Turn a TOML file into a running registry with its sweeper.
// Dependencies: kontrol-core, kontrol-store-postgres, kontrol-store-sqlite, toml
// ============================================================================

//! ## Overview
//! [`KontrolConfig`] selects a storage backend, the sweeper schedule, and the
//! log level. [`open_kontrol`] bootstraps the selected backend and starts the
//! sweeper over it; [`start_kontrol`] does the same with a stderr logger
//! built from the `[logging]` section.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::open_kontrol;
pub use bootstrap::open_store;
pub use bootstrap::start_kontrol;
pub use config::ConfigError;
pub use config::KontrolConfig;
pub use config::LoggingConfig;
pub use config::StorageConfig;
pub use config::SweeperSettings;
