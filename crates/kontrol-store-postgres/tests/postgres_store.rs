// crates/kontrol-store-postgres/tests/postgres_store.rs
// ============================================================================
// Module: Postgres Store Tests
// Description: Config resolution and live-server checks for the Postgres store.
// Purpose: Validate bootstrap without a server and behavior with one.
// Dependencies: kontrol-store-postgres, kontrol-core, serde_json
// ============================================================================

//! Postgres store tests. The live test runs only when
//! `KONTROL_POSTGRES_TEST_DBNAME` names a reachable database.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kontrol_core::Identity;
use kontrol_core::KiteRegistry;
use kontrol_core::KontrolQuery;
use kontrol_core::NullLogger;
use kontrol_core::RegistrationValue;
use kontrol_core::RegistryError;
use kontrol_core::StoreError;
use kontrol_store_postgres::DBNAME_ENV_VAR;
use kontrol_store_postgres::PostgresConfig;
use kontrol_store_postgres::PostgresRegistryStore;
use kontrol_store_postgres::USERNAME_ENV_VAR;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    move |key| map.get(key).cloned()
}

// ============================================================================
// SECTION: Config Resolution
// ============================================================================

#[test]
fn postgres_config_defaults() {
    let config = PostgresConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 5432);
    assert!(config.username.is_none());
    assert!(config.dbname.is_none());
    assert!(config.max_connections > 0);
    assert!(config.connect_timeout_ms > 0);
}

#[test]
fn configured_values_win_over_environment() {
    let config = PostgresConfig {
        username: Some("kontrol".to_string()),
        dbname: Some("registry".to_string()),
        ..PostgresConfig::default()
    };
    let env = env_of(&[(USERNAME_ENV_VAR, "other"), (DBNAME_ENV_VAR, "other")]);
    let resolved = config.resolve(env).unwrap();
    assert_eq!(resolved.username, "kontrol");
    assert_eq!(resolved.dbname, "registry");
}

#[test]
fn blank_fields_fall_back_to_environment() {
    let config = PostgresConfig {
        username: Some(String::new()),
        ..PostgresConfig::default()
    };
    let env = env_of(&[(USERNAME_ENV_VAR, "kontrol"), (DBNAME_ENV_VAR, "registry")]);
    let resolved = config.resolve(env).unwrap();
    assert_eq!(resolved.username, "kontrol");
    assert_eq!(resolved.dbname, "registry");
    assert!(resolved.password.is_none());
}

#[test]
fn missing_username_is_a_configuration_error() {
    let env = env_of(&[(DBNAME_ENV_VAR, "registry")]);
    let err = PostgresConfig::default().resolve(env).unwrap_err();
    assert!(matches!(&err, RegistryError::Configuration(message) if message.contains(USERNAME_ENV_VAR)));
}

#[test]
fn empty_environment_dbname_is_a_configuration_error() {
    let env = env_of(&[(USERNAME_ENV_VAR, "kontrol"), (DBNAME_ENV_VAR, "")]);
    let err = PostgresConfig::default().resolve(env).unwrap_err();
    assert!(matches!(&err, RegistryError::Configuration(message) if message.contains(DBNAME_ENV_VAR)));
}

#[test]
fn resolved_config_builds_driver_config() {
    let config = PostgresConfig {
        host: "db.internal".to_string(),
        port: 6543,
        username: Some("kontrol".to_string()),
        password: Some("secret".to_string()),
        dbname: Some("registry".to_string()),
        connect_timeout_ms: 1_500,
        ..PostgresConfig::default()
    };
    let pg = config.resolve(|_| None).unwrap().to_pg_config();
    assert_eq!(pg.get_user(), Some("kontrol"));
    assert_eq!(pg.get_dbname(), Some("registry"));
    assert_eq!(pg.get_password(), Some(&b"secret"[..]));
    assert_eq!(pg.get_ports(), &[6543]);
    assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_millis(1_500)));
}

#[test]
fn postgres_config_deserializes_with_defaults() {
    let config: PostgresConfig =
        serde_json::from_str(r#"{"username":"kontrol","dbname":"registry"}"#).unwrap();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 5432);
    assert_eq!(config.username.as_deref(), Some("kontrol"));
}

#[test]
fn unreachable_server_is_a_connection_error() {
    let config = PostgresConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        username: Some("kontrol".to_string()),
        dbname: Some("registry".to_string()),
        max_connections: 1,
        connect_timeout_ms: 200,
        ..PostgresConfig::default()
    };
    let resolved = config.resolve(|_| None).unwrap();
    let result = PostgresRegistryStore::connect(&resolved, &NullLogger);
    assert!(matches!(result, Err(RegistryError::Connection(_))));
}

// ============================================================================
// SECTION: Live Server
// ============================================================================

#[test]
fn live_registry_round_trip() {
    let Ok(dbname) = std::env::var("KONTROL_POSTGRES_TEST_DBNAME") else {
        return;
    };
    let config = PostgresConfig {
        dbname: Some(dbname),
        ..PostgresConfig::default()
    };
    let resolved = config.resolve_from_env().unwrap();
    let store = PostgresRegistryStore::connect(&resolved, &NullLogger).unwrap();
    let registry = KiteRegistry::new(Arc::new(store));
    let identity = Identity {
        username: "kontrol-live-test".to_string(),
        environment: "test".to_string(),
        name: "mathworker".to_string(),
        version: "1.0.0".to_string(),
        region: "local".to_string(),
        hostname: "host-1".to_string(),
        id: "kontrol-live-test-kite".to_string(),
    };
    registry.delete(&identity).unwrap();
    let value = RegistrationValue::new("http://127.0.0.1:4000/kite");
    registry.upsert(&identity, &value).unwrap();
    registry.upsert(&identity, &value).unwrap();
    let rows = registry.get(&KontrolQuery::from(&identity)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].url, value.url);
    let err = registry.add(&identity, &value).unwrap_err();
    assert!(matches!(err, RegistryError::Store(StoreError::Conflict(_))));
    registry.delete(&identity).unwrap();
    assert!(registry.get(&KontrolQuery::from(&identity)).unwrap().is_empty());
}
