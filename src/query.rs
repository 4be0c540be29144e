//! N1QL-style statement construction.
//!
//! Persistence components build plain statement strings and hand them to
//! the store client together with a consistency level. Filter, sort, and
//! projection fragments are caller-supplied and inserted verbatim; they are
//! expected to come from code, not from untrusted input.

use std::fmt::Write;

/// Field injected into every document of a logical collection.
pub const COLLECTION_TAG: &str = "_c";

/// Scan consistency requested for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryConsistency {
    /// No consistency bound; fastest.
    #[default]
    NotBounded,
    /// Reads observe this statement's own prior mutations.
    StatementPlus,
    /// Reads observe all mutations issued before the request.
    RequestPlus,
}

/// Builds a `SELECT` statement.
///
/// `selection` defaults to `*`; `skip` renders an `OFFSET` clause only when
/// present; `take` renders a `LIMIT` clause only when present.
#[must_use]
pub fn build_select(
    bucket: &str,
    selection: Option<&str>,
    filter: Option<&str>,
    sort: Option<&str>,
    skip: Option<u64>,
    take: Option<u64>,
) -> String {
    let selection = selection.filter(|s| !s.is_empty()).unwrap_or("*");
    let mut statement = format!("SELECT {selection} FROM `{bucket}`");
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let _ = write!(statement, " WHERE {filter}");
    }
    if let Some(sort) = sort.filter(|s| !s.is_empty()) {
        let _ = write!(statement, " ORDER BY {sort}");
    }
    if let Some(skip) = skip {
        let _ = write!(statement, " OFFSET {skip}");
    }
    if let Some(take) = take {
        let _ = write!(statement, " LIMIT {take}");
    }
    statement
}

/// Builds a `SELECT COUNT(*)` statement.
#[must_use]
pub fn build_count(bucket: &str, filter: Option<&str>) -> String {
    let mut statement = format!("SELECT COUNT(*) FROM `{bucket}`");
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let _ = write!(statement, " WHERE {filter}");
    }
    statement
}

/// Builds a `DELETE` statement.
#[must_use]
pub fn build_delete(bucket: &str, filter: Option<&str>) -> String {
    let mut statement = format!("DELETE FROM `{bucket}`");
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let _ = write!(statement, " WHERE {filter}");
    }
    statement
}

/// Equality predicate selecting documents of one logical collection.
#[must_use]
pub fn collection_predicate(collection: &str) -> String {
    format!("{COLLECTION_TAG}='{collection}'")
}

/// Prepends the collection predicate to an optional caller filter.
#[must_use]
pub fn scope_filter(collection: &str, filter: Option<&str>) -> String {
    let predicate = collection_predicate(collection);
    match filter.filter(|f| !f.is_empty()) {
        Some(filter) => format!("{predicate} AND {filter}"),
        None => predicate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_defaults() {
        assert_eq!(
            build_select("test", None, None, None, None, None),
            "SELECT * FROM `test`"
        );
    }

    #[test]
    fn test_select_full_clause_order() {
        let statement = build_select(
            "test",
            Some("key, content"),
            Some("_c='dummies' AND key='5'"),
            Some("key DESC"),
            Some(10),
            Some(5),
        );
        assert_eq!(
            statement,
            "SELECT key, content FROM `test` WHERE _c='dummies' AND key='5' \
             ORDER BY key DESC OFFSET 10 LIMIT 5"
        );
    }

    #[test]
    fn test_select_skip_omitted_when_unrequested() {
        let statement = build_select("test", None, Some("_c='dummies'"), None, None, Some(100));
        assert_eq!(
            statement,
            "SELECT * FROM `test` WHERE _c='dummies' LIMIT 100"
        );
    }

    #[test]
    fn test_count_and_delete() {
        assert_eq!(
            build_count("test", Some("key='1'")),
            "SELECT COUNT(*) FROM `test` WHERE key='1'"
        );
        assert_eq!(build_delete("test", None), "DELETE FROM `test`");
        assert_eq!(
            build_delete("test", Some("_c='dummies'")),
            "DELETE FROM `test` WHERE _c='dummies'"
        );
    }

    #[test]
    fn test_scope_filter() {
        assert_eq!(scope_filter("dummies", None), "_c='dummies'");
        assert_eq!(scope_filter("dummies", Some("")), "_c='dummies'");
        assert_eq!(
            scope_filter("dummies", Some("key='5'")),
            "_c='dummies' AND key='5'"
        );
    }
}
