// crates/kontrol-core/src/registry.rs
// ============================================================================
// Module: Kite Registry Engine
// Description: Register, refresh, delete, and resolve kites.
// Purpose: Validate inputs, plan lookups, and select results over a store.
// Dependencies: crate::{identity, query, selector, store}, rand
// ============================================================================

//! ## Overview
//! [`KiteRegistry`] is the entry point used by the RPC layer. Registration
//! inputs are validated before any write reaches the store; lookups are
//! planned by [`plan_query`], executed as one snapshot read, and finished by
//! [`select_records`]. All atomicity is delegated to the backing store, so
//! the engine holds no locks of its own and can be shared freely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::RegistryError;
use crate::identity::Identity;
use crate::identity::KiteRecord;
use crate::identity::KontrolQuery;
use crate::identity::RegistrationValue;
use crate::query::plan_query;
use crate::selector::select_records;
use crate::store::RegistryStore;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry engine over a [`RegistryStore`].
pub struct KiteRegistry<S: ?Sized> {
    /// Backing store.
    store: Arc<S>,
}

impl<S: ?Sized> Clone for KiteRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RegistryStore + ?Sized> KiteRegistry<S> {
    /// Creates a registry over the given store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self {
            store,
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolves a query to matching kites in random order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Query`] for an empty query,
    /// [`RegistryError::ConstraintParse`] for a malformed version, or
    /// [`RegistryError::Store`] when the read fails.
    pub fn get(&self, query: &KontrolQuery) -> Result<Vec<KiteRecord>, RegistryError> {
        self.get_with_rng(query, &mut rand::thread_rng())
    }

    /// Resolves a query using the supplied random source for ordering.
    ///
    /// # Errors
    ///
    /// Same as [`KiteRegistry::get`].
    pub fn get_with_rng<R: Rng + ?Sized>(
        &self,
        query: &KontrolQuery,
        rng: &mut R,
    ) -> Result<Vec<KiteRecord>, RegistryError> {
        let plan = plan_query(query)?;
        let records = self.store.select(&plan.predicate)?;
        Ok(select_records(records, plan.post_filter.as_ref(), rng))
    }

    /// Registers or refreshes a kite; the heartbeat path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for a malformed URL or empty id,
    /// or [`RegistryError::Store`] when the write fails.
    pub fn upsert(
        &self,
        identity: &Identity,
        value: &RegistrationValue,
    ) -> Result<(), RegistryError> {
        identity.validate()?;
        value.parse_url()?;
        self.store.upsert(identity, &value.url)?;
        Ok(())
    }

    /// Registers a kite that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for a malformed URL or empty id,
    /// or [`RegistryError::Store`] (a conflict when the id is taken).
    pub fn add(&self, identity: &Identity, value: &RegistrationValue) -> Result<(), RegistryError> {
        identity.validate()?;
        value.parse_url()?;
        self.store.insert(identity, &value.url)?;
        Ok(())
    }

    /// Refreshes an existing kite without inserting.
    ///
    /// Returns the number of rows changed; an unknown id changes nothing and
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for a malformed URL, or
    /// [`RegistryError::Store`] when the write fails.
    pub fn update(
        &self,
        identity: &Identity,
        value: &RegistrationValue,
    ) -> Result<u64, RegistryError> {
        value.parse_url()?;
        Ok(self.store.update(&identity.id, &value.url)?)
    }

    /// Removes a kite. Removing an unknown id succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the write fails.
    pub fn delete(&self, identity: &Identity) -> Result<(), RegistryError> {
        self.store.delete(&identity.id)?;
        Ok(())
    }

    /// Removes kites whose last registration is older than `expire`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the write fails.
    pub fn clean_expired_rows(&self, expire: Duration) -> Result<u64, RegistryError> {
        Ok(self.store.delete_expired(expire)?)
    }
}
