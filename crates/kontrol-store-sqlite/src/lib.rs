// crates/kontrol-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Registry Store
// Description: Durable RegistryStore backend using SQLite.
// Purpose: Persist kite registrations for single-node deployments and tests.
// Dependencies: kontrol-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`RegistryStore`] implementation.
//! Every kite is one row of the `kite` table keyed by its id; upserts use
//! `SQLite`'s native `ON CONFLICT` clause so a heartbeat is a single atomic
//! statement.
//!
//! [`RegistryStore`]: kontrol_core::RegistryStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteRegistryStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
