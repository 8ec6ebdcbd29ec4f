// crates/kontrol-core/src/identity.rs
// ============================================================================
// Module: Kite Identity Model
// Description: Hierarchical kite identity, registration values, and queries.
// Purpose: Define the ordered identity tuple and its persisted column mapping.
// Dependencies: serde, time, url
// ============================================================================

//! ## Overview
//! A kite is named by an ordered tuple of seven fields. The order defines the
//! namespace hierarchy used by queries; [`IDENTITY_FIELDS`] is the single
//! source of truth for that order and for the column each field is persisted
//! under. Only `id` is unique; every other field is descriptive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use url::Url;

use crate::error::RegistryError;

// ============================================================================
// SECTION: Field Table
// ============================================================================

/// One field of the kite identity tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityField {
    /// Owner of the kite.
    Username,
    /// Deployment environment.
    Environment,
    /// Kite name.
    Name,
    /// Kite version.
    Version,
    /// Region the kite runs in.
    Region,
    /// Host the kite runs on.
    Hostname,
    /// Globally unique instance identifier.
    Id,
}

/// Identity fields in hierarchy order.
pub const IDENTITY_FIELDS: [IdentityField; 7] = [
    IdentityField::Username,
    IdentityField::Environment,
    IdentityField::Name,
    IdentityField::Version,
    IdentityField::Region,
    IdentityField::Hostname,
    IdentityField::Id,
];

/// Fields that scope a version-constrained fetch.
pub const NAMESPACE_FIELDS: [IdentityField; 3] =
    [IdentityField::Username, IdentityField::Environment, IdentityField::Name];

/// Fields that follow `version` in the hierarchy.
pub const SUFFIX_FIELDS: [IdentityField; 3] =
    [IdentityField::Region, IdentityField::Hostname, IdentityField::Id];

impl IdentityField {
    /// Returns the logical field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Environment => "environment",
            Self::Name => "name",
            Self::Version => "version",
            Self::Region => "region",
            Self::Hostname => "hostname",
            Self::Id => "id",
        }
    }

    /// Returns the persisted column name.
    ///
    /// `name` is a reserved word in some engines, so it is stored as
    /// `kitename`.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Name => "kitename",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Full identity of a registered kite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Owner of the kite.
    pub username: String,
    /// Deployment environment.
    pub environment: String,
    /// Kite name.
    pub name: String,
    /// Kite version.
    pub version: String,
    /// Region the kite runs in.
    pub region: String,
    /// Host the kite runs on.
    pub hostname: String,
    /// Globally unique instance identifier.
    pub id: String,
}

impl Identity {
    /// Returns the value of a single identity field.
    #[must_use]
    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Username => &self.username,
            IdentityField::Environment => &self.environment,
            IdentityField::Name => &self.name,
            IdentityField::Version => &self.version,
            IdentityField::Region => &self.region,
            IdentityField::Hostname => &self.hostname,
            IdentityField::Id => &self.id,
        }
    }

    /// Returns all field values in hierarchy order.
    #[must_use]
    pub fn values(&self) -> [&str; 7] {
        IDENTITY_FIELDS.map(|field| self.field(field))
    }

    /// Ensures the identity can be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] when `id` is empty.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.id.is_empty() {
            return Err(RegistryError::Validation("kite id must not be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in self.values() {
            write!(f, "/{value}")?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Registration Value
// ============================================================================

/// Value stored alongside an identity on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationValue {
    /// Endpoint the kite is reachable at.
    pub url: String,
}

impl RegistrationValue {
    /// Creates a registration value for the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
        }
    }

    /// Parses the endpoint as an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] when the URL is malformed.
    pub fn parse_url(&self) -> Result<Url, RegistryError> {
        Url::parse(&self.url)
            .map_err(|err| RegistryError::Validation(format!("invalid url {:?}: {err}", self.url)))
    }
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Sparse identity filter. Empty fields are unconstrained.
///
/// `version` may hold an exact version or a range expression such as
/// `">=1.0.0, <1.4.0"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KontrolQuery {
    /// Owner of the kite.
    pub username: String,
    /// Deployment environment.
    pub environment: String,
    /// Kite name.
    pub name: String,
    /// Exact version or version range.
    pub version: String,
    /// Region the kite runs in.
    pub region: String,
    /// Host the kite runs on.
    pub hostname: String,
    /// Globally unique instance identifier.
    pub id: String,
}

impl KontrolQuery {
    /// Returns the value of a single query field.
    #[must_use]
    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::Username => &self.username,
            IdentityField::Environment => &self.environment,
            IdentityField::Name => &self.name,
            IdentityField::Version => &self.version,
            IdentityField::Region => &self.region,
            IdentityField::Hostname => &self.hostname,
            IdentityField::Id => &self.id,
        }
    }

    /// Returns true when no field constrains the query.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        IDENTITY_FIELDS.iter().all(|field| self.field(*field).is_empty())
    }
}

impl From<&Identity> for KontrolQuery {
    fn from(identity: &Identity) -> Self {
        Self {
            username: identity.username.clone(),
            environment: identity.environment.clone(),
            name: identity.name.clone(),
            version: identity.version.clone(),
            region: identity.region.clone(),
            hostname: identity.hostname.clone(),
            id: identity.id.clone(),
        }
    }
}

// ============================================================================
// SECTION: Stored Record
// ============================================================================

/// A registered kite as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KiteRecord {
    /// Identity of the kite.
    pub identity: Identity,
    /// Endpoint registered most recently.
    pub url: String,
    /// First registration time (UTC).
    pub created_at: OffsetDateTime,
    /// Most recent registration time (UTC); the liveness marker.
    pub updated_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::IDENTITY_FIELDS;
    use super::Identity;
    use super::IdentityField;
    use super::KontrolQuery;
    use super::RegistrationValue;
    use crate::error::RegistryError;

    fn identity() -> Identity {
        Identity {
            username: "alice".to_string(),
            environment: "production".to_string(),
            name: "mathworker".to_string(),
            version: "1.0.0".to_string(),
            region: "eu".to_string(),
            hostname: "host-1".to_string(),
            id: "b1c2".to_string(),
        }
    }

    #[test]
    fn name_field_is_stored_as_kitename() {
        assert_eq!(IdentityField::Name.column(), "kitename");
        let columns: Vec<_> = IDENTITY_FIELDS.iter().map(|field| field.column()).collect();
        assert_eq!(
            columns,
            ["username", "environment", "kitename", "version", "region", "hostname", "id"]
        );
    }

    #[test]
    fn identity_renders_canonical_key() {
        assert_eq!(identity().to_string(), "/alice/production/mathworker/1.0.0/eu/host-1/b1c2");
    }

    #[test]
    fn identity_without_id_is_rejected() {
        let mut identity = identity();
        identity.id.clear();
        assert!(matches!(identity.validate(), Err(RegistryError::Validation(_))));
    }

    #[test]
    fn query_from_identity_is_not_empty() {
        let query = KontrolQuery::from(&identity());
        assert!(!query.is_empty());
        assert!(KontrolQuery::default().is_empty());
        assert_eq!(query.field(IdentityField::Hostname), "host-1");
    }

    #[test]
    fn registration_value_rejects_relative_url() {
        assert!(RegistrationValue::new("http://localhost:4000/kite").parse_url().is_ok());
        assert!(matches!(
            RegistrationValue::new("localhost/kite").parse_url(),
            Err(RegistryError::Validation(_))
        ));
    }
}
