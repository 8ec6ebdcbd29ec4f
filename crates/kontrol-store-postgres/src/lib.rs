// crates/kontrol-store-postgres/src/lib.rs
// ============================================================================
// Module: Postgres Registry Store
// Description: Pooled RegistryStore backend using PostgreSQL.
// Purpose: Persist kite registrations for shared, multi-instance deployments.
// Dependencies: kontrol-core, postgres, r2d2
// ============================================================================

//! ## Overview
//! This crate provides [`PostgresRegistryStore`], a [`RegistryStore`] over an
//! r2d2 connection pool, and [`PostgresConfig`], the connection settings with
//! their environment fallbacks.
//!
//! [`RegistryStore`]: kontrol_core::RegistryStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::DBNAME_ENV_VAR;
pub use config::PostgresConfig;
pub use config::ResolvedPostgresConfig;
pub use config::USERNAME_ENV_VAR;
pub use store::PostgresRegistryStore;
pub use store::PostgresStoreError;
