//! Relationship-scoped predicates.
//!
//! A dotted path `author.company.name` peels one relation per segment:
//! `author` on the root model, then `company` on the author's model, and
//! finally the column `name`. The leaf condition is wrapped in one
//! existence predicate per relation, innermost first, so the result reads
//! "an author exists whose company exists whose name matches".

use thiserror::Error;
use tracing::debug;

use super::FilterEvaluator;
use crate::error::{FilterError, FilterResult, SearchError, SortError};
use crate::predicate::{Predicate, QueryBuilder};
use crate::schema::Model;
use crate::types::FilterCondition;

/// A relation name that is not declared on the model it was looked up on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown relationship '{relation}' on model '{model}'")]
pub struct UnknownRelation {
    /// Model the lookup ran on.
    pub model: String,
    /// The undeclared relation name.
    pub relation: String,
}

impl From<UnknownRelation> for FilterError {
    fn from(e: UnknownRelation) -> Self {
        FilterError::UnknownRelationship {
            model: e.model,
            relation: e.relation,
        }
    }
}

impl From<UnknownRelation> for SearchError {
    fn from(e: UnknownRelation) -> Self {
        SearchError::UnknownRelationship {
            model: e.model,
            relation: e.relation,
        }
    }
}

impl From<UnknownRelation> for SortError {
    fn from(e: UnknownRelation) -> Self {
        SortError::UnknownRelationship {
            model: e.model,
            relation: e.relation,
        }
    }
}

/// A field path resolved through its relations.
#[derive(Debug, Clone)]
pub struct RelationPath<'p, 'm> {
    /// Relation names from the root outward.
    pub relations: Vec<&'p str>,
    /// The model owning `column`.
    pub model: &'m Model,
    /// The final path segment.
    pub column: &'p str,
}

impl<'p, 'm> RelationPath<'p, 'm> {
    /// Resolves every relation segment of `path` starting at `root`.
    pub fn resolve<Q: QueryBuilder + ?Sized>(
        query: &'m Q,
        root: &'m Model,
        path: &'p str,
    ) -> Result<Self, UnknownRelation> {
        let (prefix, column) = match path.rsplit_once('.') {
            Some((prefix, column)) => (Some(prefix), column),
            None => (None, path),
        };

        let mut model = root;
        let mut relations = Vec::new();
        if let Some(prefix) = prefix {
            for relation in prefix.split('.') {
                model = query
                    .related_model(model, relation)
                    .ok_or_else(|| UnknownRelation {
                        model: model.name.clone(),
                        relation: relation.to_string(),
                    })?;
                relations.push(relation);
            }
        }

        Ok(Self {
            relations,
            model,
            column,
        })
    }

    /// Number of relations traversed.
    pub fn depth(&self) -> usize {
        self.relations.len()
    }

    /// Returns true if the path names a column on the root model.
    pub fn is_local(&self) -> bool {
        self.relations.is_empty()
    }

    /// Wraps `predicate` in one existence predicate per relation.
    pub fn wrap(&self, predicate: Predicate) -> Predicate {
        self.relations
            .iter()
            .rev()
            .fold(predicate, |inner, relation| Predicate::exists(*relation, inner))
    }
}

impl<Q: QueryBuilder + ?Sized> FilterEvaluator<'_, Q> {
    /// Builds the existence-scoped predicate for a dotted `path`.
    pub(super) fn relation_predicate(
        &self,
        root: &Model,
        path: &str,
        condition: &FilterCondition,
        depth: usize,
    ) -> FilterResult<Option<Predicate>> {
        let resolved = RelationPath::resolve(self.query, root, path)?;
        self.check_depth(path, depth + resolved.depth())?;

        let inner = self.eval_condition(resolved.model, resolved.column, condition, path)?;
        match inner {
            Some(predicate) => Ok(Some(resolved.wrap(predicate))),
            None => {
                debug!(field = %path, "Relation filter produced no condition");
                Ok(None)
            }
        }
    }
}
