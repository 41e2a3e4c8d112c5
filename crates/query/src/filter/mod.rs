//! Filter expression evaluation.
//!
//! [`FilterEvaluator`] walks a [`FilterSpec`] and produces one predicate
//! tree for the whole call:
//!
//! 1. The top-level filter count is checked against `max_filters`.
//! 2. Every field path is validated as an identifier path and against the
//!    model's filterable list (or the global whitelist).
//! 3. Dotted paths are scoped through relations as existence predicates.
//! 4. Literal values imply `eq` (scalars) or `in` (lists); operator maps are
//!    resolved through the operator registry, shape-checked, coerced, and
//!    turned into predicates.
//! 5. Groups are evaluated recursively and joined by their connective.
//!
//! Nothing is appended to the query until the whole tree has been built.

pub mod custom;
pub mod dates;
mod operand;
pub mod relation;

pub use custom::{CustomFilter, CustomFilterRegistry};
pub use dates::{Clock, FixedClock, SystemClock};
pub use relation::{RelationPath, UnknownRelation};

use crate::config::Snapshot;
use crate::error::{FilterError, FilterResult};
use crate::predicate::{Predicate, QueryBuilder};
use crate::schema::{Model, is_field_path};
use crate::types::{Boolean, FilterEntry, FilterGroup, FilterNode, FilterSpec, GROUP_KEY};

/// Evaluates filter specifications against one query's model.
pub struct FilterEvaluator<'a, Q: QueryBuilder + ?Sized> {
    query: &'a Q,
    snapshot: &'a Snapshot,
    custom: &'a CustomFilterRegistry,
    clock: &'a dyn Clock,
}

impl<'a, Q: QueryBuilder + ?Sized> FilterEvaluator<'a, Q> {
    /// Creates a new evaluator.
    pub fn new(
        query: &'a Q,
        snapshot: &'a Snapshot,
        custom: &'a CustomFilterRegistry,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            query,
            snapshot,
            custom,
            clock,
        }
    }

    /// Builds the predicate for `spec`, or `None` if it filters nothing.
    pub fn evaluate(&self, spec: &FilterSpec) -> FilterResult<Option<Predicate>> {
        let max = self.snapshot.config().max_filters;
        if spec.len() > max {
            return Err(FilterError::TooManyFilters {
                count: spec.len(),
                max,
            });
        }

        let model = self.query.model();
        let mut predicates = Vec::with_capacity(spec.len());
        for node in &spec.nodes {
            if let Some(predicate) = self.eval_node(model, node, 0)? {
                predicates.push(predicate);
            }
        }
        Ok(Predicate::join(Boolean::And, predicates))
    }

    fn eval_node(
        &self,
        model: &Model,
        node: &FilterNode,
        depth: usize,
    ) -> FilterResult<Option<Predicate>> {
        match node {
            FilterNode::Field(entry) => self.eval_entry(model, entry, depth),
            FilterNode::Group(group) => self.eval_group(model, group, depth + 1),
        }
    }

    fn eval_group(
        &self,
        model: &Model,
        group: &FilterGroup,
        depth: usize,
    ) -> FilterResult<Option<Predicate>> {
        self.check_depth(GROUP_KEY, depth)?;

        let mut filters = Vec::with_capacity(group.filters.len());
        for node in &group.filters {
            if let Some(predicate) = self.eval_node(model, node, depth)? {
                filters.push(predicate);
            }
        }

        let mut clauses = Vec::with_capacity(group.nested.len() + 1);
        if let Some(predicate) = Predicate::join(group.boolean, filters) {
            clauses.push(predicate);
        }
        for nested in &group.nested {
            if let Some(predicate) = self.eval_group(model, nested, depth + 1)? {
                clauses.push(predicate);
            }
        }

        Ok(Predicate::join(group.boolean, clauses))
    }

    fn eval_entry(
        &self,
        model: &Model,
        entry: &FilterEntry,
        depth: usize,
    ) -> FilterResult<Option<Predicate>> {
        let path = entry.path.as_str();
        self.check_filterable(model, path)?;

        if path.contains('.') {
            return self.relation_predicate(model, path, &entry.condition, depth);
        }
        self.eval_condition(model, path, &entry.condition, path)
    }

    /// Fails unless `path` is a valid identifier path allowed on `model`.
    fn check_filterable(&self, model: &Model, path: &str) -> FilterResult<()> {
        if !is_field_path(path) {
            return Err(FilterError::FieldNotFilterable {
                field: path.to_string(),
                reason: "invalid field name".to_string(),
            });
        }

        let global = &self.snapshot.config().global_whitelist;
        let allowed = match &model.filterable {
            Some(fields) => Some(fields.as_slice()),
            None if !global.is_empty() => Some(global.as_slice()),
            None => None,
        };

        if let Some(fields) = allowed {
            if !fields.iter().any(|f| f == path) {
                return Err(FilterError::FieldNotFilterable {
                    field: path.to_string(),
                    reason: "not in whitelist".to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_depth(&self, path: &str, depth: usize) -> FilterResult<()> {
        let max = self.snapshot.config().max_nesting_level;
        if depth > max {
            return Err(FilterError::NestingTooDeep {
                path: path.to_string(),
                depth,
                max,
            });
        }
        Ok(())
    }
}
