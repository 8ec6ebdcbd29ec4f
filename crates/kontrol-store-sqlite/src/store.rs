// crates/kontrol-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Registry Store
// Description: RegistryStore backed by a single SQLite table.
// Purpose: Persist kite registrations with atomic heartbeat upserts.
// Dependencies: kontrol-core, rusqlite, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Kites live in the `kite` table with `id` as primary key, so uniqueness is
//! enforced by `SQLite` rather than by the engine. Timestamps are stored as
//! unix milliseconds and `updated_at` is written as `MAX(previous, now)` so it
//! never moves backwards for a given id. The connection is shared behind a
//! mutex; each operation is one statement inside one transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use kontrol_core::Identity;
use kontrol_core::KiteRecord;
use kontrol_core::Logger;
use kontrol_core::PlaceholderStyle;
use kontrol_core::Predicate;
use kontrol_core::RegistryStore;
use kontrol_core::StoreError;
use kontrol_core::query::INSERT_COLUMNS;
use kontrol_core::query::KITE_TABLE;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Secondary index supporting expiry sweeps.
const UPDATED_AT_INDEX: &str = "kite_updated_at_btree_idx";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` registry store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Primary-key conflict.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Stored row could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Corrupt(message)
            }
        }
    }
}

/// Maps write failures, separating primary-key conflicts.
fn write_error(err: &rusqlite::Error) -> SqliteStoreError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Conflict(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

/// Maps any other engine failure.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed kite registry store.
#[derive(Clone)]
pub struct SqliteRegistryStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRegistryStore {
    /// Opens the store, creating the `kite` table when absent.
    ///
    /// Creating the `updated_at` index is best effort; a failure is logged
    /// as a warning and the store still opens.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(
        config: &SqliteStoreConfig,
        logger: &dyn Logger,
    ) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        if let Err(err) = connection.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {UPDATED_AT_INDEX} ON {KITE_TABLE} (updated_at);"
        )) {
            logger.warning(format_args!("sqlite: enable updated_at index: {err}"));
        }
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Reads every row matching the predicate.
    fn select_rows(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, SqliteStoreError> {
        let rows = {
            let guard = self.lock()?;
            let mut statement = guard
                .prepare(&predicate.select_sql(PlaceholderStyle::Question))
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params_from_iter(predicate.params()), |row| {
                    Ok(RawKite {
                        identity: Identity {
                            username: row.get(0)?,
                            environment: row.get(1)?,
                            name: row.get(2)?,
                            version: row.get(3)?,
                            region: row.get(4)?,
                            hostname: row.get(5)?,
                            id: row.get(6)?,
                        },
                        url: row.get(7)?,
                        created_at_ms: row.get(8)?,
                        updated_at_ms: row.get(9)?,
                    })
                })
                .map_err(|err| db_error(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_error(&err))?;
            drop(statement);
            drop(guard);
            rows
        };
        rows.into_iter().map(RawKite::into_record).collect()
    }

    /// Inserts or refreshes a kite row.
    fn upsert_row(&self, identity: &Identity, url: &str) -> Result<(), SqliteStoreError> {
        let now = unix_millis();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| db_error(&err))?;
        tx.execute(
            &format!(
                "INSERT INTO {KITE_TABLE} ({INSERT_COLUMNS}, created_at, updated_at) VALUES (?1, \
                 ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) ON CONFLICT(id) DO UPDATE SET url = \
                 excluded.url, updated_at = MAX({KITE_TABLE}.updated_at, excluded.updated_at)"
            ),
            params![
                identity.username,
                identity.environment,
                identity.name,
                identity.version,
                identity.region,
                identity.hostname,
                identity.id,
                url,
                now
            ],
        )
        .map_err(|err| write_error(&err))?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(())
    }

    /// Inserts a new kite row.
    fn insert_row(&self, identity: &Identity, url: &str) -> Result<(), SqliteStoreError> {
        let now = unix_millis();
        let guard = self.lock()?;
        guard
            .execute(
                &format!(
                    "INSERT INTO {KITE_TABLE} ({INSERT_COLUMNS}, created_at, updated_at) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"
                ),
                params![
                    identity.username,
                    identity.environment,
                    identity.name,
                    identity.version,
                    identity.region,
                    identity.hostname,
                    identity.id,
                    url,
                    now
                ],
            )
            .map_err(|err| write_error(&err))?;
        drop(guard);
        Ok(())
    }

    /// Refreshes url and `updated_at` of an existing row.
    fn update_row(&self, id: &str, url: &str) -> Result<u64, SqliteStoreError> {
        let now = unix_millis();
        let guard = self.lock()?;
        let changed = guard
            .execute(
                &format!(
                    "UPDATE {KITE_TABLE} SET url = ?1, updated_at = MAX(updated_at, ?2) WHERE id \
                     = ?3"
                ),
                params![url, now, id],
            )
            .map_err(|err| write_error(&err))?;
        drop(guard);
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    /// Deletes one row by id.
    fn delete_row(&self, id: &str) -> Result<u64, SqliteStoreError> {
        let guard = self.lock()?;
        let removed = guard
            .execute(&format!("DELETE FROM {KITE_TABLE} WHERE id = ?1"), params![id])
            .map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    /// Deletes rows not refreshed within `expire`.
    fn delete_expired_rows(&self, expire: Duration) -> Result<u64, SqliteStoreError> {
        let expire_ms = i64::try_from(expire.as_millis()).unwrap_or(i64::MAX);
        let cutoff = unix_millis().saturating_sub(expire_ms);
        let guard = self.lock()?;
        let removed = guard
            .execute(&format!("DELETE FROM {KITE_TABLE} WHERE updated_at < ?1"), params![cutoff])
            .map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

impl RegistryStore for SqliteRegistryStore {
    fn select(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, StoreError> {
        self.select_rows(predicate).map_err(StoreError::from)
    }

    fn upsert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        self.upsert_row(identity, url).map_err(StoreError::from)
    }

    fn insert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        self.insert_row(identity, url).map_err(StoreError::from)
    }

    fn update(&self, id: &str, url: &str) -> Result<u64, StoreError> {
        self.update_row(id, url).map_err(StoreError::from)
    }

    fn delete(&self, id: &str) -> Result<u64, StoreError> {
        self.delete_row(id).map_err(StoreError::from)
    }

    fn delete_expired(&self, expire: Duration) -> Result<u64, StoreError> {
        self.delete_expired_rows(expire).map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Row as read from `SQLite`, before timestamp conversion.
struct RawKite {
    /// Identity columns.
    identity: Identity,
    /// Registered endpoint.
    url: String,
    /// Creation time in unix milliseconds.
    created_at_ms: i64,
    /// Last refresh time in unix milliseconds.
    updated_at_ms: i64,
}

impl RawKite {
    /// Converts stored millisecond timestamps into a record.
    fn into_record(self) -> Result<KiteRecord, SqliteStoreError> {
        Ok(KiteRecord {
            created_at: from_unix_millis(self.created_at_ms)?,
            updated_at: from_unix_millis(self.updated_at_ms)?,
            identity: self.identity,
            url: self.url,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {KITE_TABLE} (
            username TEXT NOT NULL,
            environment TEXT NOT NULL,
            kitename TEXT NOT NULL,
            version TEXT NOT NULL,
            region TEXT NOT NULL,
            hostname TEXT NOT NULL,
            id TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            created_at INTEGER NOT NULL
                DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)),
            updated_at INTEGER NOT NULL
                DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
        );"
    ))
    .map_err(|err| db_error(&err))?;
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Converts stored unix milliseconds to a UTC timestamp.
fn from_unix_millis(ms: i64) -> Result<OffsetDateTime, SqliteStoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|err| SqliteStoreError::Corrupt(format!("invalid timestamp {ms}: {err}")))
}
