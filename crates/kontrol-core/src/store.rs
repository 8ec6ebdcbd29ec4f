// crates/kontrol-core/src/store.rs
// ============================================================================
// Module: Registry Store Interface
// Description: Backend contract for persisting kite registrations.
// Purpose: Keep the engine independent of the transactional store in use.
// Dependencies: crate::{identity, query, error}, time
// ============================================================================

//! ## Overview
//! Backends implement [`RegistryStore`] on top of a transactional store whose
//! primary key on `id` enforces one row per kite. Inputs reaching a backend
//! have already been validated by the engine. [`InMemoryRegistryStore`] is a
//! mutex-guarded map for tests and examples.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use time::OffsetDateTime;

use crate::error::StoreError;
use crate::identity::Identity;
use crate::identity::KiteRecord;
use crate::query::Predicate;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Persistence backend for kite registrations.
pub trait RegistryStore: Send + Sync {
    /// Reads every row matching the predicate in one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn select(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, StoreError>;

    /// Atomically refreshes the row for `identity.id` or inserts it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; no change is kept.
    fn upsert(&self, identity: &Identity, url: &str) -> Result<(), StoreError>;

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the id already exists.
    fn insert(&self, identity: &Identity, url: &str) -> Result<(), StoreError>;

    /// Refreshes url and `updated_at` of an existing row.
    ///
    /// Returns the number of rows changed (zero when the id is unknown).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update(&self, id: &str, url: &str) -> Result<u64, StoreError>;

    /// Deletes the row for `id`, returning the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn delete(&self, id: &str) -> Result<u64, StoreError>;

    /// Deletes every row whose `updated_at` is older than `now - expire`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn delete_expired(&self, expire: std::time::Duration) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory registry store for tests and examples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistryStore {
    /// Records keyed by kite id.
    records: Arc<Mutex<BTreeMap<String, KiteRecord>>>,
}

impl InMemoryRegistryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the record map.
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, KiteRecord>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Db("registry store mutex poisoned".to_string()))
    }

    /// Overwrites `updated_at` for a stored kite, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store lock is poisoned.
    pub fn set_updated_at(&self, id: &str, updated_at: OffsetDateTime) -> Result<bool, StoreError> {
        Ok(self.lock()?.get_mut(id).map(|record| record.updated_at = updated_at).is_some())
    }
}

impl RegistryStore for InMemoryRegistryStore {
    fn select(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .filter(|record| predicate.matches(&record.identity))
            .cloned()
            .collect())
    }

    fn upsert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.lock()?;
        if let Some(record) = records.get_mut(&identity.id) {
            record.url = url.to_string();
            record.updated_at = record.updated_at.max(now);
            return Ok(());
        }
        records.insert(identity.id.clone(), KiteRecord {
            identity: identity.clone(),
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    fn insert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.lock()?;
        if records.contains_key(&identity.id) {
            return Err(StoreError::Conflict(format!("kite {} already exists", identity.id)));
        }
        records.insert(identity.id.clone(), KiteRecord {
            identity: identity.clone(),
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    fn update(&self, id: &str, url: &str) -> Result<u64, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(id) else {
            return Ok(0);
        };
        record.url = url.to_string();
        record.updated_at = record.updated_at.max(now);
        Ok(1)
    }

    fn delete(&self, id: &str) -> Result<u64, StoreError> {
        Ok(u64::from(self.lock()?.remove(id).is_some()))
    }

    fn delete_expired(&self, expire: std::time::Duration) -> Result<u64, StoreError> {
        let expire = time::Duration::try_from(expire).unwrap_or(time::Duration::MAX);
        let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(expire) else {
            return Ok(0);
        };
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, record| record.updated_at >= cutoff);
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}
