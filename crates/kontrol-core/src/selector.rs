// crates/kontrol-core/src/selector.rs
// ============================================================================
// Module: Result Selector
// Description: Post-filter and shuffle fetched kite records.
// Purpose: Spread callers evenly across equivalent kites.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! A single fetched row is returned untouched. Larger result sets are
//! filtered by the plan's [`PostFilter`] when present and then shuffled
//! uniformly so repeated lookups do not pin every caller to the same kite.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::identity::KiteRecord;
use crate::query::PostFilter;

/// Applies the post-filter and shuffles the fetched records.
#[must_use]
pub fn select_records<R: Rng + ?Sized>(
    mut records: Vec<KiteRecord>,
    post_filter: Option<&PostFilter>,
    rng: &mut R,
) -> Vec<KiteRecord> {
    if records.len() == 1 {
        return records;
    }
    if let Some(filter) = post_filter {
        records.retain(|record| filter.matches(&record.identity));
    }
    records.shuffle(rng);
    records
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Unit tests use unwrap for setup clarity.")]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use time::OffsetDateTime;

    use super::select_records;
    use crate::identity::Identity;
    use crate::identity::KiteRecord;
    use crate::query::PostFilter;
    use crate::version::VersionConstraint;

    fn record(id: &str, version: &str) -> KiteRecord {
        KiteRecord {
            identity: Identity {
                username: "alice".to_string(),
                environment: "production".to_string(),
                name: "mathworker".to_string(),
                version: version.to_string(),
                region: "eu".to_string(),
                hostname: "host-1".to_string(),
                id: id.to_string(),
            },
            url: format!("http://{id}.local/kite"),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn range(expr: &str) -> PostFilter {
        PostFilter {
            constraint: VersionConstraint::parse(expr).unwrap(),
            suffix: Vec::new(),
        }
    }

    #[test]
    fn single_record_skips_filter() {
        let filter = range(">=2.0.0");
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_records(vec![record("a", "1.0.0")], Some(&filter), &mut rng);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn range_filter_drops_non_matching_versions() {
        let filter = range(">=1.0.0, <2.0.0");
        let mut rng = StdRng::seed_from_u64(7);
        let records = vec![record("a", "1.0.0"), record("b", "1.2.0"), record("c", "2.0.0")];
        let mut ids: Vec<_> = select_records(records, Some(&filter), &mut rng)
            .into_iter()
            .map(|r| r.identity.id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn filter_may_leave_nothing() {
        let filter = range(">=3.0.0");
        let mut rng = StdRng::seed_from_u64(7);
        let records = vec![record("a", "1.0.0"), record("b", "1.2.0")];
        assert!(select_records(records, Some(&filter), &mut rng).is_empty());
    }
}
