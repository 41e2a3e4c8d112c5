//! Assertion helpers for rendered SQL.

use helios_query::sql::{SqlFragment, SqlParam, SqlQuery};

/// Renders the full statement, panicking on unknown relations.
pub fn render(query: &SqlQuery) -> SqlFragment {
    query.to_sql().expect("Failed to render query")
}

/// Asserts the WHERE condition of `query`, without the keyword.
pub fn assert_where(query: &SqlQuery, expected: &str) {
    let fragment = query.where_clause().expect("Failed to render conditions");
    assert_eq!(
        fragment.sql, expected,
        "WHERE mismatch: expected {}, got {}",
        expected, fragment.sql
    );
}

/// Asserts the bound parameters of `query`, in placeholder order.
pub fn assert_params(query: &SqlQuery, expected: &[SqlParam]) {
    let fragment = render(query);
    assert_eq!(
        fragment.params, expected,
        "Parameter mismatch for {}",
        fragment.sql
    );
}

/// Asserts that nothing has been appended to `query`.
pub fn assert_untouched(query: &SqlQuery) {
    assert!(
        query.conditions().is_empty(),
        "Expected no conditions, got {:?}",
        query.conditions()
    );
    assert!(
        query.orders().is_empty(),
        "Expected no orderings, got {:?}",
        query.orders()
    );
    assert!(query.eager_loads().is_empty());
    assert_eq!(query.limit_value(), None);
}

/// Shorthand for a string parameter.
pub fn s(value: &str) -> SqlParam {
    SqlParam::string(value)
}

/// Shorthand for an integer parameter.
pub fn i(value: i64) -> SqlParam {
    SqlParam::Integer(value)
}
