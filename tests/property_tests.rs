//! Property-based tests for statement building and id generation.

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use couchkit::IdGenerator;
use couchkit::query::{build_count, build_delete, build_select, scope_filter};
use proptest::prelude::*;

proptest! {
    /// Property: a select without clauses is exactly `SELECT * FROM` the
    /// bucket.
    #[test]
    fn prop_select_defaults(bucket in "[a-z][a-z0-9_]{0,20}") {
        let statement = build_select(&bucket, None, None, None, None, None);
        prop_assert_eq!(statement, format!("SELECT * FROM `{bucket}`"));
    }

    /// Property: clauses always render in WHERE, ORDER BY, OFFSET, LIMIT
    /// order regardless of which are present.
    #[test]
    fn prop_select_clause_order(
        filter in prop::option::of("[a-z]{1,8}='[a-z]{1,8}'"),
        sort in prop::option::of("[a-z]{1,8}"),
        skip in prop::option::of(0u64..1000),
        take in prop::option::of(1u64..1000),
    ) {
        let statement = build_select(
            "test",
            None,
            filter.as_deref(),
            sort.as_deref(),
            skip,
            take,
        );
        let mut last = 0usize;
        for (clause, present) in [
            (" WHERE ", filter.is_some()),
            (" ORDER BY ", sort.is_some()),
            (" OFFSET ", skip.is_some()),
            (" LIMIT ", take.is_some()),
        ] {
            let at = statement.find(clause);
            prop_assert_eq!(at.is_some(), present);
            if let Some(at) = at {
                prop_assert!(at >= last);
                last = at;
            }
        }
    }

    /// Property: count and delete statements share the same WHERE rendering.
    #[test]
    fn prop_count_delete_share_filter(filter in "[a-z]{1,8}='[a-z]{1,8}'") {
        let count = build_count("test", Some(&filter));
        let delete = build_delete("test", Some(&filter));
        prop_assert_eq!(count, format!("SELECT COUNT(*) FROM `test` WHERE {filter}"));
        prop_assert_eq!(delete, format!("DELETE FROM `test` WHERE {filter}"));
    }

    /// Property: a scoped filter always starts with the collection
    /// predicate, and the caller filter survives verbatim.
    #[test]
    fn prop_scope_filter_prefixes_collection(
        collection in "[a-z]{1,12}",
        filter in prop::option::of("[a-z]{1,8}='[a-z]{1,8}'"),
    ) {
        let scoped = scope_filter(&collection, filter.as_deref());
        let predicate = format!("_c='{collection}'");
        prop_assert!(scoped.starts_with(&predicate));
        if let Some(filter) = filter {
            let suffix = format!(" AND {filter}");
            prop_assert!(scoped.ends_with(&suffix));
        }
    }

    /// Property: generated long ids are always 16 ASCII digits.
    #[test]
    fn prop_long_ids_are_sixteen_digits(_ in 0u8..20) {
        let id = IdGenerator::next_long();
        prop_assert_eq!(id.len(), 16);
        prop_assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    /// Property: generated uuids are 32 lowercase hex characters.
    #[test]
    fn prop_uuids_are_simple_hex(_ in 0u8..20) {
        let id = IdGenerator::next_uuid();
        prop_assert_eq!(id.len(), 32);
        prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
