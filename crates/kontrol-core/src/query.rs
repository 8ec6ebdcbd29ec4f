// crates/kontrol-core/src/query.rs
// ============================================================================
// Module: Query Builder
// Description: Turn a sparse kite query into a conjunctive predicate.
// Purpose: Keep predicate construction pure and shared by every backend.
// Dependencies: crate::{identity, version}
// ============================================================================

//! ## Overview
//! Every non-empty query field contributes one equality clause, walked in
//! [`IDENTITY_FIELDS`] order. Empty fields are skipped and later fields still
//! apply. A query with no clauses is rejected so a lookup can never fetch the
//! whole table.
//!
//! When the version is a range, the stored predicate is narrowed to the
//! namespace fields and the range plus the remaining suffix fields become a
//! [`PostFilter`] evaluated on the fetched rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::error::RegistryError;
use crate::identity::IDENTITY_FIELDS;
use crate::identity::Identity;
use crate::identity::IdentityField;
use crate::identity::KontrolQuery;
use crate::identity::NAMESPACE_FIELDS;
use crate::identity::SUFFIX_FIELDS;
use crate::version::VersionConstraint;
use crate::version::VersionMatch;

// ============================================================================
// SECTION: Schema Constants
// ============================================================================

/// Name of the kite table.
pub const KITE_TABLE: &str = "kite";

/// Columns returned by every kite select, in decode order.
pub const SELECT_COLUMNS: &str =
    "username, environment, kitename, version, region, hostname, id, url, created_at, updated_at";

/// Columns written by a full insert, in bind order.
pub const INSERT_COLUMNS: &str =
    "username, environment, kitename, version, region, hostname, id, url";

// ============================================================================
// SECTION: Predicate
// ============================================================================

/// Bind parameter syntax of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (Postgres).
    Dollar,
    /// `?1`, `?2`, ... (`SQLite`).
    Question,
}

impl PlaceholderStyle {
    /// Renders the placeholder for a 1-based parameter index.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Dollar => format!("${index}"),
            Self::Question => format!("?{index}"),
        }
    }
}

/// Single equality constraint on an identity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Constrained field.
    pub field: IdentityField,
    /// Required value.
    pub value: String,
}

impl Clause {
    /// Returns true when the identity carries the required value.
    #[must_use]
    pub fn matches(&self, identity: &Identity) -> bool {
        identity.field(self.field) == self.value
    }
}

/// Collects clauses for the non-empty query fields among `fields`.
fn clauses_for(query: &KontrolQuery, fields: &[IdentityField]) -> Vec<Clause> {
    fields
        .iter()
        .filter(|field| !query.field(**field).is_empty())
        .map(|field| Clause {
            field: *field,
            value: query.field(*field).to_string(),
        })
        .collect()
}

/// Non-empty conjunction of equality clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Clauses in hierarchy order.
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Builds a predicate from the given fields of a query.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Query`] when every selected field is empty.
    pub fn from_fields(
        query: &KontrolQuery,
        fields: &[IdentityField],
    ) -> Result<Self, RegistryError> {
        let clauses = clauses_for(query, fields);
        if clauses.is_empty() {
            return Err(RegistryError::Query("all query fields are empty".to_string()));
        }
        Ok(Self {
            clauses,
        })
    }

    /// Returns the clauses in hierarchy order.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns true when the identity satisfies every clause.
    #[must_use]
    pub fn matches(&self, identity: &Identity) -> bool {
        self.clauses.iter().all(|clause| clause.matches(identity))
    }

    /// Returns the bind parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> Vec<&str> {
        self.clauses.iter().map(|clause| clause.value.as_str()).collect()
    }

    /// Renders the `SELECT` statement for this predicate.
    #[must_use]
    pub fn select_sql(&self, style: PlaceholderStyle) -> String {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM {KITE_TABLE} WHERE ");
        for (index, clause) in self.clauses.iter().enumerate() {
            if index > 0 {
                sql.push_str(" AND ");
            }
            let _ = write!(sql, "{} = {}", clause.field.column(), style.placeholder(index + 1));
        }
        sql
    }
}

// ============================================================================
// SECTION: Query Plan
// ============================================================================

/// Filter applied to fetched rows when the version is a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFilter {
    /// Version range each row must satisfy.
    pub constraint: VersionConstraint,
    /// Region, hostname, and id clauses retained from the query.
    pub suffix: Vec<Clause>,
}

impl PostFilter {
    /// Returns true when the row satisfies the range and every suffix clause.
    #[must_use]
    pub fn matches(&self, identity: &Identity) -> bool {
        self.constraint.matches(&identity.version)
            && self.suffix.iter().all(|clause| clause.matches(identity))
    }
}

/// Fetch predicate plus optional post-fetch filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Predicate pushed down to storage.
    pub predicate: Predicate,
    /// Filter applied after the fetch, if the version is a range.
    pub post_filter: Option<PostFilter>,
}

/// Plans a kite lookup.
///
/// # Errors
///
/// Returns [`RegistryError::Query`] when the query (or, for a range, its
/// namespace part) is empty, and [`RegistryError::ConstraintParse`] when the
/// version is malformed.
pub fn plan_query(query: &KontrolQuery) -> Result<QueryPlan, RegistryError> {
    let query = trim_version(query);
    let query = query.as_ref();
    let predicate = Predicate::from_fields(query, &IDENTITY_FIELDS)?;
    match VersionMatch::resolve(&query.version)? {
        VersionMatch::Any | VersionMatch::Exact(_) => Ok(QueryPlan {
            predicate,
            post_filter: None,
        }),
        VersionMatch::Range(constraint) => Ok(QueryPlan {
            predicate: Predicate::from_fields(query, &NAMESPACE_FIELDS)?,
            post_filter: Some(PostFilter {
                constraint,
                suffix: clauses_for(query, &SUFFIX_FIELDS),
            }),
        }),
    }
}

/// Strips surrounding whitespace from the version so the stored clause
/// carries the same text the resolver classified.
fn trim_version(query: &KontrolQuery) -> Cow<'_, KontrolQuery> {
    let trimmed = query.version.trim();
    if trimmed.len() == query.version.len() {
        return Cow::Borrowed(query);
    }
    Cow::Owned(KontrolQuery {
        version: trimmed.to_string(),
        ..query.clone()
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Unit tests use unwrap for setup clarity.")]
mod tests {
    use super::PlaceholderStyle;
    use super::plan_query;
    use crate::error::RegistryError;
    use crate::identity::IdentityField;
    use crate::identity::KontrolQuery;

    #[test]
    fn empty_fields_are_skipped_not_terminal() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            name: "mathworker".to_string(),
            hostname: "host-1".to_string(),
            ..KontrolQuery::default()
        };
        let plan = plan_query(&query).unwrap();
        let fields: Vec<_> = plan.predicate.clauses().iter().map(|c| c.field).collect();
        assert_eq!(fields, [IdentityField::Username, IdentityField::Name, IdentityField::Hostname]);
        assert!(plan.post_filter.is_none());
        assert_eq!(
            plan.predicate.select_sql(PlaceholderStyle::Dollar),
            "SELECT username, environment, kitename, version, region, hostname, id, url, \
             created_at, updated_at FROM kite WHERE username = $1 AND kitename = $2 AND hostname \
             = $3"
        );
        assert_eq!(plan.predicate.params(), ["alice", "mathworker", "host-1"]);
    }

    #[test]
    fn empty_query_is_rejected() {
        assert!(matches!(plan_query(&KontrolQuery::default()), Err(RegistryError::Query(_))));
    }

    #[test]
    fn exact_version_stays_in_predicate() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            version: "1.0.0".to_string(),
            ..KontrolQuery::default()
        };
        let plan = plan_query(&query).unwrap();
        assert_eq!(plan.predicate.params(), ["alice", "1.0.0"]);
        assert_eq!(
            plan.predicate.select_sql(PlaceholderStyle::Question),
            "SELECT username, environment, kitename, version, region, hostname, id, url, \
             created_at, updated_at FROM kite WHERE username = ?1 AND version = ?2"
        );
    }

    #[test]
    fn exact_version_is_bound_without_padding_whitespace() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            version: " 1.0.0 ".to_string(),
            ..KontrolQuery::default()
        };
        let plan = plan_query(&query).unwrap();
        assert_eq!(plan.predicate.params(), ["alice", "1.0.0"]);
        assert!(plan.post_filter.is_none());
    }

    #[test]
    fn whitespace_only_version_is_ignored() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            version: "   ".to_string(),
            ..KontrolQuery::default()
        };
        let plan = plan_query(&query).unwrap();
        assert_eq!(plan.predicate.params(), ["alice"]);
    }

    #[test]
    fn range_version_moves_suffix_to_post_filter() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            environment: "production".to_string(),
            name: "mathworker".to_string(),
            version: ">=1.0.0, <2.0.0".to_string(),
            hostname: "host-1".to_string(),
            ..KontrolQuery::default()
        };
        let plan = plan_query(&query).unwrap();
        assert_eq!(plan.predicate.params(), ["alice", "production", "mathworker"]);
        let post = plan.post_filter.unwrap();
        assert_eq!(post.constraint.as_str(), ">=1.0.0, <2.0.0");
        assert_eq!(post.suffix.len(), 1);
        assert_eq!(post.suffix[0].field, IdentityField::Hostname);
    }

    #[test]
    fn range_without_namespace_is_rejected() {
        let query = KontrolQuery {
            version: ">=1.0.0".to_string(),
            region: "eu".to_string(),
            ..KontrolQuery::default()
        };
        assert!(matches!(plan_query(&query), Err(RegistryError::Query(_))));
    }

    #[test]
    fn malformed_range_is_rejected() {
        let query = KontrolQuery {
            username: "alice".to_string(),
            version: "~~1".to_string(),
            ..KontrolQuery::default()
        };
        assert!(matches!(plan_query(&query), Err(RegistryError::ConstraintParse(_))));
    }
}
