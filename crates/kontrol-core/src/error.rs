// crates/kontrol-core/src/error.rs
// ============================================================================
// Module: Registry Errors
// Description: Error taxonomy for registry bootstrap, queries, and storage.
// Purpose: Give callers one error type with stable, matchable variants.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`RegistryError`] is returned by every engine operation. Storage backends
//! report [`StoreError`], which the engine wraps unchanged so callers can
//! still tell a uniqueness conflict from an engine failure.

use thiserror::Error;

/// Errors reported by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or pool failure.
    #[error("registry store io error: {0}")]
    Io(String),
    /// Primary-key conflict for an existing kite id.
    #[error("registry store conflict: {0}")]
    Conflict(String),
    /// Engine error while executing a statement.
    #[error("registry store db error: {0}")]
    Db(String),
    /// Stored row could not be decoded.
    #[error("registry store corruption: {0}")]
    Corrupt(String),
}

/// Errors reported by the registry engine.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Required configuration could not be resolved.
    #[error("registry configuration error: {0}")]
    Configuration(String),
    /// Backing store was unreachable at bootstrap.
    #[error("registry connection error: {0}")]
    Connection(String),
    /// Registration input was rejected before any mutation.
    #[error("invalid registration: {0}")]
    Validation(String),
    /// Query was rejected before any fetch.
    #[error("invalid query: {0}")]
    Query(String),
    /// Version was neither an exact version nor a valid range.
    #[error("invalid version constraint: {0}")]
    ConstraintParse(String),
    /// Backing store failed while executing an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Background sweeper thread could not be started.
    #[error("registry sweeper error: {0}")]
    Sweeper(String),
}
