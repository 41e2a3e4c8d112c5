//! Integration tests for relationship-scoped filters.
//!
//! Covers:
//! - belongs_to and has_many existence subqueries
//! - Self-referential relations and custom owner keys
//! - Casts resolved on the related model
//! - Depth limits and undeclared relations

mod common;

use common::*;
use helios_query::{ErrorKind, FilterError};
use serde_json::json;

#[test]
fn test_belongs_to_filter() {
    let mut query = products_query();
    query_filter()
        .filter(&mut query, &json!({"category.name": "Tools"}))
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM categories category_1 \
         WHERE category_1.id = products.category_id AND category_1.name = ?1)",
    );
    assert_params(&query, &[s("Tools")]);
}

#[test]
fn test_has_many_filter_casts_on_related_model() {
    let mut query = products_query();
    query_filter()
        .filter(&mut query, &json!({"reviews.rating": {"gte": "4"}}))
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM reviews reviews_1 \
         WHERE reviews_1.product_id = products.id AND reviews_1.rating >= ?1)",
    );
    assert_params(&query, &[i(4)]);
}

#[test]
fn test_self_referential_relation_gets_distinct_aliases() {
    let mut query = products_query();
    query_filter()
        .filter(&mut query, &json!({"category.parent.name": "Hardware"}))
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM categories category_1 \
         WHERE category_1.id = products.category_id AND \
         EXISTS (SELECT 1 FROM categories parent_2 \
         WHERE parent_2.id = category_1.parent_id AND parent_2.name = ?1))",
    );
}

#[test]
fn test_custom_owner_key() {
    let mut query = products_query();
    query_filter()
        .filter(&mut query, &json!({"brand.country.name": "Japan"}))
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM brands brand_1 \
         WHERE brand_1.id = products.brand_id AND \
         EXISTS (SELECT 1 FROM countries country_2 \
         WHERE country_2.code = brand_1.country_code AND country_2.name = ?1))",
    );
}

#[test]
fn test_operator_map_inside_relation() {
    let mut query = products_query();
    query_filter()
        .filter(
            &mut query,
            &json!({"reviews.rating": {"lt": 2, "gt": 4, "boolean": "or"}}),
        )
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM reviews reviews_1 \
         WHERE reviews_1.product_id = products.id AND \
         (reviews_1.rating < ?1 OR reviews_1.rating > ?2))",
    );
    assert_params(&query, &[i(2), i(4)]);
}

#[test]
fn test_relation_pattern_on_postgres() {
    let mut query = products_query_pg();
    query_filter()
        .filter(&mut query, &json!({"reviews.author.name": {"ilike": "ann"}}))
        .unwrap();

    assert_where(
        &query,
        "EXISTS (SELECT 1 FROM reviews reviews_1 \
         WHERE reviews_1.product_id = products.id AND \
         EXISTS (SELECT 1 FROM users author_2 \
         WHERE author_2.id = reviews_1.user_id AND author_2.name ILIKE ?1 ESCAPE '\\'))",
    );
    assert_params(&query, &[s("%ann%")]);
}

#[test]
fn test_relations_inside_or_group() {
    let mut query = products_query();
    query_filter()
        .filter(
            &mut query,
            &json!({"_group": {"boolean": "or", "filters": {"category.name": "Tools", "stock": 0}}}),
        )
        .unwrap();

    assert_where(
        &query,
        "(EXISTS (SELECT 1 FROM categories category_1 \
         WHERE category_1.id = products.category_id AND category_1.name = ?1) \
         OR products.stock = ?2)",
    );
}

#[test]
fn test_empty_relation_condition_is_skipped() {
    let mut query = products_query();
    query_filter()
        .filter(&mut query, &json!({"category.id": [null, ""]}))
        .unwrap();
    assert_untouched(&query);
}

#[test]
fn test_unknown_relation() {
    let mut query = products_query();
    let err = query_filter()
        .filter(&mut query, &json!({"stock": 1, "vendor.name": "x"}))
        .unwrap_err();
    assert_eq!(
        err,
        FilterError::UnknownRelationship {
            model: "products".to_string(),
            relation: "vendor".to_string(),
        }
    );
    assert_untouched(&query);

    let err = query_filter()
        .filter(&mut query, &json!({"category.vendor.name": "x"}))
        .unwrap_err();
    assert_eq!(
        err,
        FilterError::UnknownRelationship {
            model: "categories".to_string(),
            relation: "vendor".to_string(),
        }
    );
}

#[test]
fn test_relation_depth_counts_toward_nesting() {
    let qf = query_filter_with(|c| c.max_nesting_level = 1);
    let mut query = products_query();

    qf.filter(&mut query, &json!({"category.name": "Tools"}))
        .unwrap();

    let err = qf
        .filter(&mut query, &json!({"category.parent.name": "Hardware"}))
        .unwrap_err();
    assert!(matches!(
        err,
        FilterError::NestingTooDeep { ref path, depth: 2, max: 1 } if path == "category.parent.name"
    ));

    // A relation inside a group adds to the group's depth.
    let err = qf
        .filter(
            &mut query,
            &json!({"_group": {"filters": {"category.name": "Tools"}}}),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NestingTooDeep);
    assert_eq!(query.conditions().len(), 1);
}

#[test]
fn test_whitelist_matches_full_dotted_path() {
    let qf = query_filter_with(|c| c.global_whitelist = vec!["category.name".to_string()]);
    let mut query = products_query();

    qf.filter(&mut query, &json!({"category.name": "Tools"}))
        .unwrap();

    let err = qf
        .filter(&mut query, &json!({"category.id": 3}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FieldNotFilterable);

    let err = qf.filter(&mut query, &json!({"name": "x"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FieldNotFilterable);
}

#[test]
fn test_malformed_dotted_path_rejected() {
    let mut query = products_query();
    for field in ["category..name", ".name", "category.", "category.name;drop"] {
        let err = query_filter()
            .filter(&mut query, &json!({ field: "x" }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldNotFilterable, "field {}", field);
    }
    assert_untouched(&query);
}
