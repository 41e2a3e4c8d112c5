//! Predicate tree and the query builder capability.
//!
//! Evaluators never touch a query directly while they work. They build a
//! complete [`Predicate`] tree and only append it through [`QueryBuilder`]
//! once the whole call has succeeded, so a failing call leaves the query
//! untouched.

use serde_json::Value;

use crate::operators::StoreOperator;
use crate::schema::Model;
use crate::types::{Boolean, SortDirection};

/// A condition to append to a query.
///
/// Column names are relative to the model in scope; [`Predicate::Exists`]
/// moves the scope to the related model.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`
    Compare {
        /// Column in the current scope.
        column: String,
        /// Comparison operator.
        op: StoreOperator,
        /// Bound operand.
        value: Value,
    },
    /// `column LIKE pattern`. With `case_insensitive` set and a plain `LIKE`
    /// operator, both sides are lowercased by the store.
    Pattern {
        /// Column in the current scope.
        column: String,
        /// A `LIKE` family operator.
        op: StoreOperator,
        /// Pattern with its wildcards already placed.
        pattern: String,
        /// Compare lowercased.
        case_insensitive: bool,
    },
    /// `column [NOT] IN (values)`
    In {
        /// Column in the current scope.
        column: String,
        /// Candidate values. Empty matches no row, or every row when negated.
        values: Vec<Value>,
        /// `NOT IN` when set.
        negated: bool,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        /// Column in the current scope.
        column: String,
        /// Inclusive lower bound.
        low: Value,
        /// Inclusive upper bound.
        high: Value,
        /// `NOT BETWEEN` when set.
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null {
        /// Column in the current scope.
        column: String,
        /// `IS NOT NULL` when set.
        negated: bool,
    },
    /// A related row satisfying `predicate` exists.
    Exists {
        /// Relation name on the current model.
        relation: String,
        /// Condition on the related model.
        predicate: Box<Predicate>,
    },
    /// Parenthesized sub-clause.
    Group {
        /// How the members are joined.
        boolean: Boolean,
        /// Members, in order.
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// Joins predicates with `boolean`, collapsing a single predicate.
    ///
    /// Returns `None` when there is nothing to join.
    pub fn join(boolean: Boolean, mut predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Predicate::Group {
                boolean,
                predicates,
            }),
        }
    }

    /// Wraps in an existence predicate over `relation`.
    pub fn exists(relation: impl Into<String>, predicate: Predicate) -> Self {
        Predicate::Exists {
            relation: relation.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Counts leaf conditions, not groups or existence wrappers.
    pub fn leaf_count(&self) -> usize {
        match self {
            Predicate::Exists { predicate, .. } => predicate.leaf_count(),
            Predicate::Group { predicates, .. } => predicates.iter().map(Self::leaf_count).sum(),
            _ => 1,
        }
    }
}

/// Escapes LIKE wildcards so `s` matches literally under `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// A single ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    /// Column on the query's model.
    pub column: String,
    /// Ordering direction.
    pub direction: SortDirection,
}

impl OrderKey {
    /// Creates a new order key.
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

/// The data-access capability the engine appends predicates to.
///
/// Implementors own execution; the engine only appends conditions,
/// orderings, eager loads and limits.
pub trait QueryBuilder {
    /// The model this query selects from.
    fn model(&self) -> &Model;

    /// Resolves `relation` declared on `model` to the related model.
    fn related_model(&self, model: &Model, relation: &str) -> Option<&Model>;

    /// Whether the store has a native case-insensitive LIKE.
    fn supports_case_insensitive_like(&self) -> bool;

    /// Appends `column op value`.
    fn where_compare(&mut self, boolean: Boolean, column: &str, op: StoreOperator, value: Value);

    /// Appends a pattern match. `pattern` is already escaped and wildcarded.
    fn where_pattern(
        &mut self,
        boolean: Boolean,
        column: &str,
        op: StoreOperator,
        pattern: String,
        case_insensitive: bool,
    );

    /// Appends a membership test.
    fn where_in(&mut self, boolean: Boolean, column: &str, values: Vec<Value>, negated: bool);

    /// Appends an inclusive range test.
    fn where_between(
        &mut self,
        boolean: Boolean,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
    );

    /// Appends a null check.
    fn where_null(&mut self, boolean: Boolean, column: &str, negated: bool);

    /// Appends `predicates` joined by `inner` as one parenthesized unit.
    fn where_nested(&mut self, boolean: Boolean, inner: Boolean, predicates: Vec<Predicate>);

    /// Appends an existence subquery over `relation`.
    fn where_has(&mut self, boolean: Boolean, relation: &str, predicate: Predicate);

    /// Appends an ORDER BY key after any existing ones.
    fn order_by(&mut self, column: &str, direction: SortDirection);

    /// Declares an eager load of `relation`, optionally ordered.
    fn with_relation(&mut self, relation: &str, order: Option<OrderKey>);

    /// Sets the row limit.
    fn limit(&mut self, limit: u64);

    /// Sets the row offset.
    fn offset(&mut self, offset: u64);

    /// Appends a predicate through the matching capability.
    fn push_predicate(&mut self, boolean: Boolean, predicate: Predicate) {
        match predicate {
            Predicate::Compare { column, op, value } => {
                self.where_compare(boolean, &column, op, value)
            }
            Predicate::Pattern {
                column,
                op,
                pattern,
                case_insensitive,
            } => self.where_pattern(boolean, &column, op, pattern, case_insensitive),
            Predicate::In {
                column,
                values,
                negated,
            } => self.where_in(boolean, &column, values, negated),
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => self.where_between(boolean, &column, low, high, negated),
            Predicate::Null { column, negated } => self.where_null(boolean, &column, negated),
            Predicate::Exists {
                relation,
                predicate,
            } => self.where_has(boolean, &relation, *predicate),
            Predicate::Group {
                boolean: inner,
                predicates,
            } => self.where_nested(boolean, inner, predicates),
        }
    }
}
