// crates/kontrol-core/tests/sweeper.rs
// ============================================================================
// Module: Sweeper Tests
// Description: Validate background eviction and its logging.
// Purpose: Ensure stale kites are evicted and failures do not stop the loop.
// Dependencies: kontrol-core, time
// ============================================================================

//! ## Overview
//! Drives the sweeper against the in-memory store and a store that always
//! fails, observing outcomes through a memory logger.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use kontrol_core::Identity;
use kontrol_core::InMemoryRegistryStore;
use kontrol_core::KiteRecord;
use kontrol_core::KiteRegistry;
use kontrol_core::Kontrol;
use kontrol_core::KontrolQuery;
use kontrol_core::LogLevel;
use kontrol_core::MemoryLogger;
use kontrol_core::Predicate;
use kontrol_core::RegistrationValue;
use kontrol_core::RegistryError;
use kontrol_core::RegistryStore;
use kontrol_core::StoreError;
use kontrol_core::Sweeper;
use kontrol_core::SweeperConfig;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn kite(id: &str) -> Identity {
    Identity {
        username: "alice".to_string(),
        environment: "production".to_string(),
        name: "mathworker".to_string(),
        version: "1.0.0".to_string(),
        region: "eu".to_string(),
        hostname: "host-1".to_string(),
        id: id.to_string(),
    }
}

fn seeded_store() -> InMemoryRegistryStore {
    let store = InMemoryRegistryStore::new();
    let url = RegistrationValue::new("http://10.0.0.1:4000/kite");
    let registry = KiteRegistry::new(Arc::new(store.clone()));
    registry.upsert(&kite("stale"), &url).unwrap();
    registry.upsert(&kite("fresh"), &url).unwrap();
    let now = OffsetDateTime::now_utc();
    store.set_updated_at("stale", now - time::Duration::seconds(21)).unwrap();
    store.set_updated_at("fresh", now - time::Duration::seconds(19)).unwrap();
    store
}

fn ids(registry: &KiteRegistry<InMemoryRegistryStore>) -> Vec<String> {
    let query = KontrolQuery {
        username: "alice".to_string(),
        ..KontrolQuery::default()
    };
    registry.get(&query).unwrap().into_iter().map(|r| r.identity.id).collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Store whose every operation fails, counting expiry attempts.
#[derive(Default)]
struct FailingStore {
    sweeps: AtomicU64,
}

impl RegistryStore for FailingStore {
    fn select(&self, _predicate: &Predicate) -> Result<Vec<KiteRecord>, StoreError> {
        Err(StoreError::Io("offline".to_string()))
    }

    fn upsert(&self, _identity: &Identity, _url: &str) -> Result<(), StoreError> {
        Err(StoreError::Io("offline".to_string()))
    }

    fn insert(&self, _identity: &Identity, _url: &str) -> Result<(), StoreError> {
        Err(StoreError::Io("offline".to_string()))
    }

    fn update(&self, _id: &str, _url: &str) -> Result<u64, StoreError> {
        Err(StoreError::Io("offline".to_string()))
    }

    fn delete(&self, _id: &str) -> Result<u64, StoreError> {
        Err(StoreError::Io("offline".to_string()))
    }

    fn delete_expired(&self, _expire: Duration) -> Result<u64, StoreError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Io("offline".to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn run_once_evicts_only_expired_rows() {
    let store = seeded_store();
    let registry = KiteRegistry::new(Arc::new(store));
    let logger = Arc::new(MemoryLogger::new());
    let sweeper = Sweeper::new(registry.clone(), logger.clone(), SweeperConfig::default());
    assert_eq!(sweeper.run_once(), Some(1));
    assert_eq!(ids(&registry), ["fresh"]);
    assert_eq!(sweeper.run_once(), Some(0));
    let entries = logger.entries();
    assert_eq!(entries.len(), 1, "zero removals must not log: {entries:?}");
    assert_eq!(entries[0].0, LogLevel::Info);
    assert!(entries[0].1.contains("cleaned up 1 expired kites"));
}

#[test]
fn spawned_sweeper_runs_immediately() {
    let store = seeded_store();
    let logger = Arc::new(MemoryLogger::new());
    let config = SweeperConfig {
        interval: Duration::from_secs(3600),
        expire: Duration::from_secs(20),
    };
    let kontrol = Kontrol::start(Arc::new(store), config, logger.clone()).unwrap();
    assert!(wait_until(|| ids(kontrol.registry()) == ["fresh"]));
    assert!(kontrol.sweeper_running());
    let registry = kontrol.shutdown();
    assert_eq!(ids(&registry), ["fresh"]);
}

#[test]
fn failures_are_logged_and_retried() {
    let store = Arc::new(FailingStore::default());
    let logger = Arc::new(MemoryLogger::new());
    let config = SweeperConfig {
        interval: Duration::from_millis(10),
        expire: Duration::from_secs(20),
    };
    let handle =
        Sweeper::new(KiteRegistry::new(store.clone()), logger.clone(), config).spawn().unwrap();
    assert!(wait_until(|| store.sweeps.load(Ordering::SeqCst) >= 3));
    handle.stop();
    let entries = logger.entries();
    assert!(entries.len() >= 3);
    assert!(entries.iter().all(|(level, message)| {
        *level == LogLevel::Warning && message.contains("cleaning expired kites failed")
    }));
}

#[test]
fn zero_interval_is_rejected() {
    let logger = Arc::new(MemoryLogger::new());
    let config = SweeperConfig {
        interval: Duration::ZERO,
        expire: Duration::from_secs(20),
    };
    let store = Arc::new(InMemoryRegistryStore::new());
    let result = Sweeper::new(KiteRegistry::new(store.clone()), logger.clone(), config).spawn();
    assert!(matches!(result, Err(RegistryError::Sweeper(_))));
    assert!(matches!(Kontrol::start(store, config, logger), Err(RegistryError::Sweeper(_))));
}
