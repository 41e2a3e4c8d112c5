//! Free-text search.
//!
//! A normalized term matches a row when any searchable field contains it
//! (`LIKE %term%`, wildcards in the term escaped). Terms are combined by
//! the search mode: `and` requires every term to match somewhere, `or`
//! requires at least one. Dotted searchable fields match through relations.

pub mod normalizer;

pub use normalizer::{normalize, transliterate};

use tracing::debug;

use crate::error::SearchError;
use crate::filter::RelationPath;
use crate::operators::StoreOperator;
use crate::predicate::{Predicate, QueryBuilder, escape_like};
use crate::schema::is_field_path;
use crate::types::Boolean;

/// Normalized search terms, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchTerms {
    terms: Vec<String>,
}

impl SearchTerms {
    /// Creates a new term list.
    pub fn new(terms: Vec<String>) -> Self {
        Self { terms }
    }

    /// Whether there are no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Iterates over the terms.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    /// Consumes the list, returning the terms.
    pub fn into_vec(self) -> Vec<String> {
        self.terms
    }

    /// Serializes back to a search string, quoting multi-word terms so the
    /// result normalizes to the same terms.
    pub fn to_query_string(&self) -> String {
        self.terms
            .iter()
            .map(|t| {
                if t.contains(' ') {
                    format!("\"{}\"", t)
                } else {
                    t.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parses a search mode, `and` or `or`.
pub fn parse_mode(mode: &str) -> Result<Boolean, SearchError> {
    Boolean::parse(mode).ok_or_else(|| SearchError::InvalidSearchMode {
        mode: mode.to_string(),
    })
}

/// Builds the search predicate for `terms` over `fields`.
///
/// Returns `None` when there are no terms or no fields.
pub fn build_predicate<Q: QueryBuilder + ?Sized>(
    query: &Q,
    terms: &SearchTerms,
    fields: &[String],
    mode: Boolean,
    case_sensitive: bool,
) -> Result<Option<Predicate>, SearchError> {
    if terms.is_empty() || fields.is_empty() {
        debug!(
            terms = terms.len(),
            fields = fields.len(),
            "Search has nothing to match"
        );
        return Ok(None);
    }

    let root = query.model();
    let mut resolved = Vec::with_capacity(fields.len());
    for field in fields {
        if !is_field_path(field) {
            return Err(SearchError::FieldNotSearchable {
                field: field.clone(),
                reason: "invalid field name".to_string(),
            });
        }
        resolved.push(RelationPath::resolve(query, root, field)?);
    }

    let (op, case_insensitive) = match (case_sensitive, query.supports_case_insensitive_like()) {
        (true, _) => (StoreOperator::Like, false),
        (false, true) => (StoreOperator::ILike, false),
        (false, false) => (StoreOperator::Like, true),
    };

    let mut term_predicates = Vec::with_capacity(terms.len());
    for term in terms.iter() {
        let pattern = format!("%{}%", escape_like(term));
        let matches: Vec<Predicate> = resolved
            .iter()
            .map(|path| {
                path.wrap(Predicate::Pattern {
                    column: path.column.to_string(),
                    op,
                    pattern: pattern.clone(),
                    case_insensitive,
                })
            })
            .collect();
        if let Some(predicate) = Predicate::join(Boolean::Or, matches) {
            term_predicates.push(predicate);
        }
    }

    Ok(Predicate::join(mode, term_predicates))
}
