// crates/kontrol-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Registry Store
// Description: Pooled PostgreSQL persistence for kite registrations.
// Purpose: Back the registry engine with a shared relational store.
// Dependencies: kontrol-core, postgres, r2d2, r2d2_postgres, thiserror
// ============================================================================

//! ## Overview
//! [`PostgresRegistryStore`] keeps one `kite` row per kite id. Timestamps are
//! `TIMESTAMPTZ` values set by the server clock, so every instance sharing
//! the database ages rows against the same time source. Heartbeats are a
//! single `INSERT .. ON CONFLICT` statement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use kontrol_core::Identity;
use kontrol_core::KiteRecord;
use kontrol_core::Logger;
use kontrol_core::PlaceholderStyle;
use kontrol_core::Predicate;
use kontrol_core::RegistryError;
use kontrol_core::RegistryStore;
use kontrol_core::StoreError;
use kontrol_core::query::INSERT_COLUMNS;
use kontrol_core::query::KITE_TABLE;
use postgres::NoTls;
use postgres::Row;
use postgres::error::SqlState;
use postgres::types::ToSql;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::ResolvedPostgresConfig;

/// Secondary index supporting expiry sweeps.
const UPDATED_AT_INDEX: &str = "kite_updated_at_btree_idx";

/// Pooled connection type.
type PgConnection = PooledConnection<PostgresConnectionManager<NoTls>>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres store errors.
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// Pool checkout or connection failure.
    #[error("postgres pool error: {0}")]
    Pool(String),
    /// Statement failure.
    #[error("postgres store error: {0}")]
    Postgres(String),
    /// Uniqueness violation.
    #[error("postgres store conflict: {0}")]
    Conflict(String),
    /// Row that could not be decoded.
    #[error("postgres store invalid data: {0}")]
    Invalid(String),
}

impl From<PostgresStoreError> for StoreError {
    fn from(error: PostgresStoreError) -> Self {
        match error {
            PostgresStoreError::Pool(message) => Self::Io(message),
            PostgresStoreError::Postgres(message) => Self::Db(message),
            PostgresStoreError::Conflict(message) => Self::Conflict(message),
            PostgresStoreError::Invalid(message) => Self::Corrupt(message),
        }
    }
}

/// Maps a write failure, separating uniqueness violations.
fn write_error(err: &postgres::Error) -> PostgresStoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return PostgresStoreError::Conflict(err.to_string());
    }
    PostgresStoreError::Postgres(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Postgres-backed registry store.
pub struct PostgresRegistryStore {
    /// Connection pool; taken on drop.
    pool: Option<Pool<PostgresConnectionManager<NoTls>>>,
}

impl Drop for PostgresRegistryStore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgresRegistryStore {
    /// Opens the pool and ensures the `kite` table exists.
    ///
    /// Creating the `updated_at` index is best effort; a failure is logged
    /// as a warning and the store stays usable.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connection`] when the pool cannot be built
    /// and [`RegistryError::Store`] when the table cannot be created.
    pub fn connect(
        config: &ResolvedPostgresConfig,
        logger: &dyn Logger,
    ) -> Result<Self, RegistryError> {
        let manager = PostgresConnectionManager::new(config.to_pg_config(), NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build(manager)
            .map_err(|err| RegistryError::Connection(err.to_string()))?;
        let store = Self {
            pool: Some(pool),
        };
        let mut conn = store.conn().map_err(|err| RegistryError::Connection(err.to_string()))?;
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {KITE_TABLE} (username TEXT NOT NULL, environment TEXT \
             NOT NULL, kitename TEXT NOT NULL, version TEXT NOT NULL, region TEXT NOT NULL, \
             hostname TEXT NOT NULL, id TEXT PRIMARY KEY, url TEXT NOT NULL, created_at \
             TIMESTAMPTZ NOT NULL DEFAULT now(), updated_at TIMESTAMPTZ NOT NULL DEFAULT now());"
        ))
        .map_err(|err| StoreError::from(PostgresStoreError::Postgres(err.to_string())))?;
        if let Err(err) = conn.batch_execute(&format!(
            "CREATE INDEX IF NOT EXISTS {UPDATED_AT_INDEX} ON {KITE_TABLE} USING BTREE \
             (updated_at);"
        )) {
            logger.warning(format_args!("postgres: enable btree index: {err}"));
        }
        drop(conn);
        logger.debug(format_args!(
            "postgres: connected to {}:{}/{}",
            config.host, config.port, config.dbname
        ));
        Ok(store)
    }

    /// Checks out a pooled connection.
    fn conn(&self) -> Result<PgConnection, PostgresStoreError> {
        self.pool
            .as_ref()
            .ok_or_else(|| PostgresStoreError::Pool("postgres store closed".to_string()))?
            .get()
            .map_err(|err| PostgresStoreError::Pool(err.to_string()))
    }

    /// Reads every row matching the predicate.
    fn select_rows(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, PostgresStoreError> {
        let values = predicate.params();
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|value| value as &(dyn ToSql + Sync)).collect();
        let rows = self
            .conn()?
            .query(&predicate.select_sql(PlaceholderStyle::Dollar), &params)
            .map_err(|err| PostgresStoreError::Postgres(err.to_string()))?;
        rows.iter().map(decode_row).collect()
    }

    /// Writes a row with the given statement and its eight identity params.
    fn write_row(
        &self,
        statement: &str,
        identity: &Identity,
        url: &str,
    ) -> Result<(), PostgresStoreError> {
        self.conn()?
            .execute(
                statement,
                &[
                    &identity.username,
                    &identity.environment,
                    &identity.name,
                    &identity.version,
                    &identity.region,
                    &identity.hostname,
                    &identity.id,
                    &url,
                ],
            )
            .map_err(|err| write_error(&err))?;
        Ok(())
    }

    /// Runs a row-count statement.
    fn execute_count(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PostgresStoreError> {
        self.conn()?
            .execute(statement, params)
            .map_err(|err| PostgresStoreError::Postgres(err.to_string()))
    }
}

/// Decodes one `SELECT` row.
fn decode_row(row: &Row) -> Result<KiteRecord, PostgresStoreError> {
    let text = |index: usize| -> Result<String, PostgresStoreError> {
        row.try_get(index).map_err(|err| PostgresStoreError::Invalid(err.to_string()))
    };
    let timestamp = |index: usize| -> Result<OffsetDateTime, PostgresStoreError> {
        row.try_get(index).map_err(|err| PostgresStoreError::Invalid(err.to_string()))
    };
    Ok(KiteRecord {
        identity: Identity {
            username: text(0)?,
            environment: text(1)?,
            name: text(2)?,
            version: text(3)?,
            region: text(4)?,
            hostname: text(5)?,
            id: text(6)?,
        },
        url: text(7)?,
        created_at: timestamp(8)?,
        updated_at: timestamp(9)?,
    })
}

impl RegistryStore for PostgresRegistryStore {
    fn select(&self, predicate: &Predicate) -> Result<Vec<KiteRecord>, StoreError> {
        Ok(self.select_rows(predicate)?)
    }

    fn upsert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        Ok(self.write_row(
            &format!(
                "INSERT INTO {KITE_TABLE} ({INSERT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 $8) ON CONFLICT (id) DO UPDATE SET url = EXCLUDED.url, updated_at = \
                 GREATEST({KITE_TABLE}.updated_at, now())"
            ),
            identity,
            url,
        )?)
    }

    fn insert(&self, identity: &Identity, url: &str) -> Result<(), StoreError> {
        Ok(self.write_row(
            &format!(
                "INSERT INTO {KITE_TABLE} ({INSERT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 $8)"
            ),
            identity,
            url,
        )?)
    }

    fn update(&self, id: &str, url: &str) -> Result<u64, StoreError> {
        Ok(self.execute_count(
            &format!(
                "UPDATE {KITE_TABLE} SET url = $1, updated_at = GREATEST(updated_at, now()) WHERE \
                 id = $2"
            ),
            &[&url, &id],
        )?)
    }

    fn delete(&self, id: &str) -> Result<u64, StoreError> {
        Ok(self.execute_count(&format!("DELETE FROM {KITE_TABLE} WHERE id = $1"), &[&id])?)
    }

    fn delete_expired(&self, expire: Duration) -> Result<u64, StoreError> {
        let seconds = expire.as_secs_f64();
        Ok(self.execute_count(
            &format!(
                "DELETE FROM {KITE_TABLE} WHERE updated_at < now() - make_interval(secs => $1)"
            ),
            &[&seconds],
        )?)
    }
}
