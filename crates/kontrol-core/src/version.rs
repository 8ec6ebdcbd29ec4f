// crates/kontrol-core/src/version.rs
// ============================================================================
// Module: Version Constraint Resolver
// Description: Distinguish exact versions from range expressions.
// Purpose: Decide whether a query needs a post-fetch version filter.
// Dependencies: semver
// ============================================================================

//! ## Overview
//! A query's `version` is first read as an exact version. Exact parsing is
//! lenient the way kites publish versions: a leading `v` is accepted and
//! missing minor or patch components count as zero (`"1.2"` is `1.2.0`).
//! Anything else that is non-empty must parse as a comma-separated range
//! such as `">=1.0.0, <1.4.0"`.

use std::fmt;

use semver::Version;
use semver::VersionReq;

use crate::error::RegistryError;

/// Parses a version string leniently.
///
/// Returns `None` when the string is not a version at all.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() >= 3
        || parts.iter().any(|part| part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = core.to_string();
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Version::parse(&padded).ok()
}

/// Parsed version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    /// Expression as supplied by the caller.
    raw: String,
    /// Parsed requirement.
    requirement: VersionReq,
}

impl VersionConstraint {
    /// Parses a range expression.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ConstraintParse`] when the expression is
    /// malformed.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let requirement = VersionReq::parse(raw.trim())
            .map_err(|err| RegistryError::ConstraintParse(format!("{raw:?}: {err}")))?;
        Ok(Self {
            raw: raw.to_string(),
            requirement,
        })
    }

    /// Returns true when the stored version satisfies the range.
    ///
    /// Versions that do not parse never match.
    #[must_use]
    pub fn matches(&self, version: &str) -> bool {
        parse_version(version).is_some_and(|parsed| self.requirement.matches(&parsed))
    }

    /// Returns the expression as supplied by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How a query constrains the version field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionMatch {
    /// No version given.
    Any,
    /// Exact version; matched by column equality.
    Exact(Version),
    /// Range; matched after the fetch.
    Range(VersionConstraint),
}

impl VersionMatch {
    /// Classifies a query version string.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ConstraintParse`] when the string is neither
    /// an exact version nor a valid range.
    pub fn resolve(raw: &str) -> Result<Self, RegistryError> {
        if raw.is_empty() {
            return Ok(Self::Any);
        }
        if let Some(version) = parse_version(raw) {
            return Ok(Self::Exact(version));
        }
        VersionConstraint::parse(raw).map(Self::Range)
    }
}
