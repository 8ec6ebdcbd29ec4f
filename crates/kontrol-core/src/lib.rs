// crates/kontrol-core/src/lib.rs
// ============================================================================
// Module: Kontrol Core Library
// Description: Public API surface for the Kontrol registry engine.
// Purpose: Expose the identity model, query planning, engine, and sweeper.
// Dependencies: crate::{identity, query, version, selector, registry, store}
// ============================================================================

//! ## Overview
//! Kontrol core is the storage-and-query engine behind kite service
//! discovery. Kites register a hierarchical identity and an endpoint URL;
//! clients resolve sparse identity queries, optionally with a version range,
//! to live endpoints. Entries expire unless refreshed. Persistence is
//! delegated to a [`RegistryStore`] backend.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod identity;
pub mod kontrol;
pub mod logging;
pub mod query;
pub mod registry;
pub mod selector;
pub mod store;
pub mod sweeper;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::RegistryError;
pub use error::StoreError;
pub use identity::IDENTITY_FIELDS;
pub use identity::Identity;
pub use identity::IdentityField;
pub use identity::KiteRecord;
pub use identity::KontrolQuery;
pub use identity::RegistrationValue;
pub use kontrol::Kontrol;
pub use logging::LogLevel;
pub use logging::LogLevelState;
pub use logging::Logger;
pub use logging::MemoryLogger;
pub use logging::NullLogger;
pub use logging::StderrLogger;
pub use query::PlaceholderStyle;
pub use query::Predicate;
pub use query::QueryPlan;
pub use query::plan_query;
pub use registry::KiteRegistry;
pub use store::InMemoryRegistryStore;
pub use store::RegistryStore;
pub use sweeper::Sweeper;
pub use sweeper::SweeperConfig;
pub use sweeper::SweeperHandle;
pub use version::VersionConstraint;
pub use version::VersionMatch;
