//! Catalog and facade fixtures.
//!
//! The catalog models a small shop:
//!
//! ```text
//! products -> category (categories) -> parent (categories)
//! products -> brand (brands) -> country (countries, keyed by code)
//! products -> reviews (has many) -> author (users)
//! ```

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use helios_query::config::EngineConfig;
use helios_query::filter::FixedClock;
use helios_query::schema::Catalog;
use helios_query::sql::{Dialect, SqlQuery};
use helios_query::QueryFilter;

/// The shop catalog as JSON, in the `{"models": {...}}` form.
pub const CATALOG_JSON: &str = r#"{
  "models": {
    "products": {
      "table": "products",
      "searchable": ["name", "description"],
      "search_param": "q",
      "casts": {
        "price": "float",
        "stock": "int",
        "active": "bool",
        "released_at": "datetime"
      },
      "relations": {
        "category": {"kind": "belongs_to", "target": "categories", "foreign_key": "category_id"},
        "brand": {"kind": "belongs_to", "target": "brands", "foreign_key": "brand_id"},
        "reviews": {"kind": "has_many", "target": "reviews", "foreign_key": "product_id"}
      }
    },
    "categories": {
      "table": "categories",
      "relations": {
        "parent": {"kind": "belongs_to", "target": "categories", "foreign_key": "parent_id"}
      }
    },
    "brands": {
      "table": "brands",
      "relations": {
        "country": {
          "kind": "belongs_to",
          "target": "countries",
          "foreign_key": "country_code",
          "owner_key": "code"
        }
      }
    },
    "countries": {"table": "countries"},
    "reviews": {
      "table": "reviews",
      "casts": {"rating": "int"},
      "relations": {
        "author": {"kind": "belongs_to", "target": "users", "foreign_key": "user_id"}
      }
    },
    "users": {"table": "users"}
  }
}"#;

/// Parses the shop catalog.
pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_json(CATALOG_JSON).expect("Failed to parse fixture catalog"))
}

/// A SQLite query over `products`.
pub fn products_query() -> SqlQuery {
    SqlQuery::new(catalog(), "products", Dialect::Sqlite).expect("products model")
}

/// A PostgreSQL query over `products`.
pub fn products_query_pg() -> SqlQuery {
    SqlQuery::new(catalog(), "products", Dialect::Postgres).expect("products model")
}

/// A facade with the testing configuration.
pub fn query_filter() -> QueryFilter {
    query_filter_with(|_| {})
}

/// A facade with the testing configuration adjusted by `edit`.
pub fn query_filter_with(edit: impl FnOnce(&mut EngineConfig)) -> QueryFilter {
    let mut config = EngineConfig::for_testing();
    edit(&mut config);
    QueryFilter::new(config).expect("Failed to build fixture configuration")
}

/// Midday UTC on Wednesday 2024-03-13.
pub fn wednesday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
}

/// A clock stopped at `now`.
pub fn clock_at(now: DateTime<Utc>) -> Arc<FixedClock> {
    Arc::new(FixedClock(now))
}
