// crates/kontrol-core/tests/query_proptest.rs
// ============================================================================
// Module: Query Planning Property Tests
// Description: Property checks for predicate construction and selection.
// Purpose: Guard the skip-empty policy and shuffle invariants.
// Dependencies: kontrol-core, proptest, rand, time
// ============================================================================

//! ## Overview
//! Property tests over arbitrary sparse queries and result sets.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use kontrol_core::IDENTITY_FIELDS;
use kontrol_core::Identity;
use kontrol_core::KiteRecord;
use kontrol_core::KontrolQuery;
use kontrol_core::PlaceholderStyle;
use kontrol_core::RegistryError;
use kontrol_core::plan_query;
use kontrol_core::selector::select_records;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use time::OffsetDateTime;

fn field_value() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[a-z]{1,6}"]
}

prop_compose! {
    fn sparse_query()(
        username in field_value(),
        environment in field_value(),
        name in field_value(),
        version in prop_oneof![Just(String::new()), "[0-9]\\.[0-9]\\.[0-9]"],
        region in field_value(),
        hostname in field_value(),
        id in field_value(),
    ) -> KontrolQuery {
        KontrolQuery { username, environment, name, version, region, hostname, id }
    }
}

fn record(id: usize) -> KiteRecord {
    KiteRecord {
        identity: Identity {
            username: "alice".to_string(),
            id: format!("kite-{id}"),
            ..Identity::default()
        },
        url: format!("http://10.0.0.{id}:4000/kite"),
        created_at: OffsetDateTime::UNIX_EPOCH,
        updated_at: OffsetDateTime::UNIX_EPOCH,
    }
}

proptest! {
    #[test]
    fn predicate_has_one_clause_per_non_empty_field(query in sparse_query()) {
        let expected: Vec<_> = IDENTITY_FIELDS
            .iter()
            .copied()
            .filter(|field| !query.field(*field).is_empty())
            .collect();
        match plan_query(&query) {
            Ok(plan) => {
                let fields: Vec<_> = plan.predicate.clauses().iter().map(|c| c.field).collect();
                prop_assert_eq!(&fields, &expected);
                prop_assert!(plan.post_filter.is_none());
                let sql = plan.predicate.select_sql(PlaceholderStyle::Dollar);
                prop_assert_eq!(sql.matches(" = $").count(), expected.len());
            }
            Err(RegistryError::Query(_)) => prop_assert!(expected.is_empty()),
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn selection_is_a_permutation(count in 0usize..12, seed in any::<u64>()) {
        let records: Vec<_> = (0..count).map(record).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let selected = select_records(records.clone(), None, &mut rng);
        let mut selected_ids: Vec<_> = selected.into_iter().map(|r| r.identity.id).collect();
        let mut original_ids: Vec<_> = records.into_iter().map(|r| r.identity.id).collect();
        selected_ids.sort();
        original_ids.sort();
        prop_assert_eq!(selected_ids, original_ids);
    }
}
