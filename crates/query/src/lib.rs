//! Helios Query
//!
//! This crate translates untyped, request-supplied filter, search and sort
//! parameters into safe, structured predicates against a relational data
//! source. Every field path is validated against an allow-list and an
//! identifier grammar before it can reach the store, and every value is
//! bound as a parameter.
//!
//! # Features
//!
//! - **Filter expressions**: literal equality and membership, operator maps,
//!   `and`/`or` groups nested to a configured depth
//! - **Relationships**: dotted paths (`author.company.name`) become existence
//!   subqueries, one per relation
//! - **Search**: normalized, diacritic-insensitive terms and quoted phrases
//!   matched across searchable fields
//! - **Sorting**: `-field`, `field,desc` and multi-key lists, validated
//!   against an allow-list, with relation-aware ordering
//! - **Runtime configuration**: lock-free snapshots, dotted-key get/set
//!
//! # Architecture
//!
//! - [`types`] - Filter specification, operands and sort directives
//! - [`error`] - Error types for all operations
//! - [`config`] - Engine configuration and the snapshot store
//! - [`schema`] - Models, relations and the catalog
//! - [`operators`] - Operator registry
//! - [`coercion`] - Value casting by field cast rules
//! - [`predicate`] - Predicate tree and the [`QueryBuilder`] capability
//! - [`filter`] - Filter expression evaluation
//! - [`search`] - Search term normalization and matching
//! - [`sort`] - Sort expression evaluation
//! - [`pagination`] - Page window resolution
//! - [`request`] - Query-string grammar
//! - [`sql`] - Reference SQL rendering of a [`QueryBuilder`]
//! - [`facade`] - The [`QueryFilter`] entry point
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_query::config::EngineConfig;
//! use helios_query::schema::{Catalog, Model, RelationDef};
//! use helios_query::sql::{Dialect, SqlQuery};
//! use helios_query::QueryFilter;
//! use serde_json::json;
//!
//! let catalog = Catalog::new()
//!     .with_model(
//!         Model::new("posts", "posts")
//!             .with_relation("author", RelationDef::belongs_to("users", "author_id")),
//!     )
//!     .with_model(Model::new("users", "users"));
//!
//! let filters = QueryFilter::new(EngineConfig::for_testing()).unwrap();
//! let mut query = SqlQuery::new(Arc::new(catalog), "posts", Dialect::Sqlite).unwrap();
//!
//! filters
//!     .filter(&mut query, &json!({"author.name": "John"}))
//!     .unwrap();
//! filters.sort(&mut query, "-created_at", None).unwrap();
//!
//! let sql = query.to_sql().unwrap();
//! assert_eq!(
//!     sql.sql,
//!     "SELECT posts.* FROM posts WHERE EXISTS (SELECT 1 FROM users author_1 \
//!      WHERE author_1.id = posts.author_id AND author_1.name = ?1) \
//!      ORDER BY posts.created_at DESC"
//! );
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod coercion;
pub mod config;
pub mod error;
pub mod facade;
pub mod filter;
pub mod operators;
pub mod pagination;
pub mod predicate;
pub mod request;
pub mod schema;
pub mod search;
pub mod sort;
pub mod sql;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ConfigStore, EngineConfig};
pub use error::{
    ConfigError, ErrorKind, FilterError, FilterResult, QueryError, QueryResult, SearchError,
    SortError,
};
pub use facade::QueryFilter;
pub use predicate::{OrderKey, Predicate, QueryBuilder};
pub use schema::{Catalog, Model, RelationDef, RelationKind};
pub use types::{Boolean, FilterSpec, SortDirection, SortDirective};

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("helios_query={}", level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
