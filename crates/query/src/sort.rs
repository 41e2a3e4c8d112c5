//! Sort expression evaluation.
//!
//! A directive is parsed in this order, first match wins:
//!
//! 1. a direction indicator at the start (`-created_at`)
//! 2. a direction indicator at the end (`created_at-`)
//! 3. `field,direction`, or just `field` with the configured default
//!
//! A single delimited string (`title,-created_at,views,desc`) is split on
//! commas first; a segment that is a bare direction word belongs to the
//! field before it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::Snapshot;
use crate::error::SortError;
use crate::filter::RelationPath;
use crate::predicate::{OrderKey, QueryBuilder};
use crate::schema::is_field_path;
use crate::types::{SortDirection, SortDirective};

/// Custom ordering for one sort key.
pub type SortHandler = Arc<dyn Fn(SortDirection) -> Vec<OrderKey> + Send + Sync>;

/// Fields a call may sort by.
#[derive(Clone)]
pub enum AllowedSorts {
    /// Plain column allow-list.
    List(Vec<String>),
    /// Sort keys mapped to custom orderings.
    Custom(HashMap<String, SortHandler>),
}

impl AllowedSorts {
    /// Creates a plain allow-list.
    pub fn list<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowedSorts::List(fields.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for AllowedSorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedSorts::List(fields) => f.debug_tuple("List").field(fields).finish(),
            AllowedSorts::Custom(handlers) => {
                let mut keys: Vec<&String> = handlers.keys().collect();
                keys.sort();
                f.debug_tuple("Custom").field(&keys).finish()
            }
        }
    }
}

/// Raw sort input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortInput {
    /// One comma-delimited string.
    Delimited(String),
    /// One directive per element.
    Sequence(Vec<String>),
}

impl SortInput {
    /// Reads sort input from JSON: a string, or an array of strings.
    ///
    /// Anything else is treated as no sort.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => SortInput::Delimited(s.clone()),
            Value::Array(items) => SortInput::Sequence(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => SortInput::Sequence(Vec::new()),
        }
    }

    /// Splits into one raw directive per sort key.
    ///
    /// In a delimited string, a plain segment that follows a plain field is
    /// that field's direction token, so `title,desc` is one key and
    /// `title,-views` is two.
    pub fn directives(&self, snapshot: &Snapshot) -> Vec<String> {
        match self {
            SortInput::Delimited(s) => split_delimited(s, snapshot),
            SortInput::Sequence(items) => items.iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    /// Returns true if there is nothing to sort by.
    pub fn is_empty(&self) -> bool {
        match self {
            SortInput::Delimited(s) => s.trim().is_empty(),
            SortInput::Sequence(items) => items.is_empty(),
        }
    }
}

impl From<&str> for SortInput {
    fn from(s: &str) -> Self {
        SortInput::Delimited(s.to_string())
    }
}

impl From<String> for SortInput {
    fn from(s: String) -> Self {
        SortInput::Delimited(s)
    }
}

impl From<Vec<String>> for SortInput {
    fn from(items: Vec<String>) -> Self {
        SortInput::Sequence(items)
    }
}

impl From<&[&str]> for SortInput {
    fn from(items: &[&str]) -> Self {
        SortInput::Sequence(items.iter().map(|s| s.to_string()).collect())
    }
}

fn split_delimited(input: &str, snapshot: &Snapshot) -> Vec<String> {
    let plain = |segment: &str| {
        let first = segment.chars().next();
        let last = segment.chars().next_back();
        !segment.is_empty()
            && !first.is_some_and(|c| snapshot.indicator(c).is_some())
            && !last.is_some_and(|c| snapshot.indicator(c).is_some())
    };

    let mut out: Vec<String> = Vec::new();
    for segment in input.split(',').map(str::trim) {
        if plain(segment) {
            if let Some(last) = out
                .last_mut()
                .filter(|last| !last.contains(',') && plain(last))
            {
                last.push(',');
                last.push_str(segment);
                continue;
            }
        }
        out.push(segment.to_string());
    }
    out
}

/// Parses one directive.
pub fn parse_directive(raw: &str, snapshot: &Snapshot) -> Result<SortDirective, SortError> {
    let directive = raw.trim();
    let empty = || SortError::EmptySortField {
        directive: raw.to_string(),
    };

    let first = directive.chars().next().ok_or_else(empty)?;
    let last = directive.chars().next_back().unwrap_or(first);

    let (field, direction) = if let Some(direction) = snapshot.indicator(first) {
        (&directive[first.len_utf8()..], direction)
    } else if let Some(direction) = snapshot.indicator(last) {
        (&directive[..directive.len() - last.len_utf8()], direction)
    } else if let Some((field, token)) = directive.split_once(',') {
        let direction =
            SortDirection::parse(token).ok_or_else(|| SortError::InvalidSortDirection {
                field: field.trim().to_string(),
                direction: token.trim().to_string(),
            })?;
        (field, direction)
    } else {
        (directive, snapshot.config().sort.default_direction)
    };

    let field = field.trim();
    if field.is_empty() {
        return Err(empty());
    }
    Ok(SortDirective::new(field, direction))
}

/// One step of an ordering plan.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SortStep {
    Order(OrderKey),
    EagerLoad { relation: String, order: OrderKey },
}

/// Validated orderings, ready to append to a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPlan {
    directives: Vec<SortDirective>,
    steps: Vec<SortStep>,
}

impl SortPlan {
    /// The parsed directives, in input order.
    pub fn directives(&self) -> &[SortDirective] {
        &self.directives
    }

    /// Whether applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Appends every ordering and eager load to `query`.
    pub fn apply<B: QueryBuilder + ?Sized>(self, query: &mut B) -> Vec<SortDirective> {
        for step in self.steps {
            match step {
                SortStep::Order(key) => query.order_by(&key.column, key.direction),
                SortStep::EagerLoad { relation, order } => {
                    query.with_relation(&relation, Some(order))
                }
            }
        }
        self.directives
    }
}

/// Evaluates sort input against one query's model.
pub struct SortEvaluator<'a, Q: QueryBuilder + ?Sized> {
    query: &'a Q,
    snapshot: &'a Snapshot,
}

impl<'a, Q: QueryBuilder + ?Sized> SortEvaluator<'a, Q> {
    /// Creates a new evaluator.
    pub fn new(query: &'a Q, snapshot: &'a Snapshot) -> Self {
        Self { query, snapshot }
    }

    /// Parses and validates every directive.
    pub fn parse(
        &self,
        input: &SortInput,
        allowed: Option<&AllowedSorts>,
    ) -> Result<Vec<SortDirective>, SortError> {
        let mut directives = Vec::new();
        for raw in input.directives(self.snapshot) {
            let directive = parse_directive(&raw, self.snapshot)?;
            self.check_allowed(&directive.field, allowed)?;
            directives.push(directive);
        }
        Ok(directives)
    }

    /// Builds the ordering plan for `input`.
    ///
    /// Fails without a plan if any directive is invalid, so a query is never
    /// left partially sorted.
    pub fn plan(
        &self,
        input: &SortInput,
        allowed: Option<&AllowedSorts>,
    ) -> Result<SortPlan, SortError> {
        if input.is_empty() {
            return Ok(SortPlan {
                directives: Vec::new(),
                steps: Vec::new(),
            });
        }
        let directives = self.parse(input, allowed)?;
        let mut steps = Vec::new();
        for directive in &directives {
            self.plan_directive(directive, allowed, &mut steps)?;
        }
        Ok(SortPlan { directives, steps })
    }

    fn plan_directive(
        &self,
        directive: &SortDirective,
        allowed: Option<&AllowedSorts>,
        steps: &mut Vec<SortStep>,
    ) -> Result<(), SortError> {
        if let Some(AllowedSorts::Custom(handlers)) = allowed {
            if let Some(handler) = handlers.get(&directive.field) {
                steps.extend(handler(directive.direction).into_iter().map(SortStep::Order));
                return Ok(());
            }
        }

        let root = self.query.model();
        let resolved = RelationPath::resolve(self.query, root, &directive.field)?;
        if resolved.is_local() {
            steps.push(SortStep::Order(OrderKey::new(
                resolved.column,
                directive.direction,
            )));
            return Ok(());
        }

        // The first relation is eager-loaded ordered by the rest of the path.
        let (relation, rest) = directive
            .field
            .split_once('.')
            .unwrap_or((directive.field.as_str(), ""));
        steps.push(SortStep::EagerLoad {
            relation: relation.to_string(),
            order: OrderKey::new(rest, directive.direction),
        });
        if let Some(def) = root.relation(relation) {
            steps.push(SortStep::Order(OrderKey::new(
                def.parent_column(),
                directive.direction,
            )));
        }
        Ok(())
    }

    fn check_allowed(&self, field: &str, allowed: Option<&AllowedSorts>) -> Result<(), SortError> {
        let not_allowed = || SortError::SortFieldNotAllowed {
            field: field.to_string(),
        };
        if !is_field_path(field) {
            return Err(not_allowed());
        }

        let permitted = match allowed {
            Some(AllowedSorts::List(fields)) => fields.iter().any(|f| f == field),
            Some(AllowedSorts::Custom(handlers)) => handlers.contains_key(field),
            None => match &self.query.model().sortable {
                Some(fields) => fields.iter().any(|f| f == field),
                None => self.snapshot.config().sort.allow_any_column,
            },
        };
        if permitted { Ok(()) } else { Err(not_allowed()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::filter::test_support::{posts_query, posts_query_with};
    use crate::sql::SqlQuery;

    fn snapshot() -> Snapshot {
        Snapshot::build(EngineConfig::for_testing()).unwrap()
    }

    fn parse(raw: &str) -> Result<SortDirective, SortError> {
        parse_directive(raw, &snapshot())
    }

    fn apply(
        query: &mut SqlQuery,
        input: impl Into<SortInput>,
        allowed: Option<&AllowedSorts>,
    ) -> Result<Vec<SortDirective>, SortError> {
        let snapshot = snapshot();
        let plan = SortEvaluator::new(&*query, &snapshot).plan(&input.into(), allowed)?;
        Ok(plan.apply(query))
    }

    #[test]
    fn test_parse_prefix() {
        assert_eq!(
            parse("-created_at").unwrap(),
            SortDirective::new("created_at", SortDirection::Descending)
        );
        assert_eq!(
            parse("+title").unwrap(),
            SortDirective::new("title", SortDirection::Ascending)
        );
    }

    #[test]
    fn test_parse_suffix() {
        assert_eq!(
            parse("created_at-").unwrap(),
            SortDirective::new("created_at", SortDirection::Descending)
        );
    }

    #[test]
    fn test_parse_explicit_and_default() {
        assert_eq!(
            parse("title,asc").unwrap(),
            SortDirective::new("title", SortDirection::Ascending)
        );
        assert_eq!(
            parse("title, DESC").unwrap(),
            SortDirective::new("title", SortDirection::Descending)
        );
        assert_eq!(
            parse("title").unwrap(),
            SortDirective::new("title", SortDirection::Ascending)
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(SortError::EmptySortField { .. })));
        assert!(matches!(parse("-"), Err(SortError::EmptySortField { .. })));
        assert_eq!(
            parse("title,sideways").unwrap_err(),
            SortError::InvalidSortDirection {
                field: "title".to_string(),
                direction: "sideways".to_string(),
            }
        );
    }

    #[test]
    fn test_custom_indicators() {
        let mut config = EngineConfig::for_testing();
        config.sort.direction_indicators.clear();
        config
            .sort
            .direction_indicators
            .insert("!".to_string(), SortDirection::Descending);
        let snapshot = Snapshot::build(config).unwrap();
        assert_eq!(
            parse_directive("!views", &snapshot).unwrap().direction,
            SortDirection::Descending
        );
        // '-' is no longer an indicator, so it stays part of the field.
        assert_eq!(parse_directive("-views", &snapshot).unwrap().field, "-views");
    }

    #[test]
    fn test_split_delimited() {
        assert_eq!(
            SortInput::from("title,-created_at,views,desc").directives(&snapshot()),
            vec!["title", "-created_at", "views,desc"]
        );
        assert_eq!(
            SortInput::from("title,asc").directives(&snapshot()),
            vec!["title,asc"]
        );
        assert_eq!(
            SortInput::from("views,desc,title").directives(&snapshot()),
            vec!["views,desc", "title"]
        );
    }

    #[test]
    fn test_unknown_direction_word_is_not_a_second_key() {
        assert_eq!(
            SortInput::from("title,sideways").directives(&snapshot()),
            vec!["title,sideways"]
        );

        let mut query = posts_query();
        let err = apply(&mut query, "title,sideways", None).unwrap_err();
        assert_eq!(
            err,
            SortError::InvalidSortDirection {
                field: "title".to_string(),
                direction: "sideways".to_string(),
            }
        );
        assert!(query.orders().is_empty());
    }

    #[test]
    fn test_apply_multi_key_in_order() {
        let mut query = posts_query();
        apply(&mut query, "-created_at,title", None).unwrap();
        assert_eq!(
            query.orders(),
            &[
                OrderKey::new("created_at", SortDirection::Descending),
                OrderKey::new("title", SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn test_allow_list() {
        let mut query = posts_query();
        let allowed = AllowedSorts::list(["title"]);
        let err = apply(&mut query, "-views", Some(&allowed)).unwrap_err();
        assert_eq!(
            err,
            SortError::SortFieldNotAllowed {
                field: "views".to_string()
            }
        );
        assert!(query.orders().is_empty());
    }

    #[test]
    fn test_no_partial_application() {
        let mut query = posts_query();
        let allowed = AllowedSorts::list(["title"]);
        assert!(apply(&mut query, "title,-views", Some(&allowed)).is_err());
        assert!(query.orders().is_empty());
    }

    #[test]
    fn test_model_sortable_restricts_without_call_list() {
        let mut query = posts_query_with(|posts| posts.sortable = Some(vec!["title".to_string()]));
        assert!(apply(&mut query, "title", None).is_ok());
        assert!(apply(&mut query, "views", None).is_err());
    }

    #[test]
    fn test_any_column_allowed_by_default() {
        let query = posts_query();
        let snapshot = Snapshot::build(EngineConfig::default()).unwrap();
        let directives = SortEvaluator::new(&query, &snapshot)
            .parse(&SortInput::from("title"), None)
            .unwrap();
        assert_eq!(
            directives,
            vec![SortDirective::new("title", SortDirection::Ascending)]
        );

        let mut config = EngineConfig::default();
        config.sort.allow_any_column = false;
        let snapshot = Snapshot::build(config).unwrap();
        let err = SortEvaluator::new(&query, &snapshot)
            .parse(&SortInput::from("views"), None)
            .unwrap_err();
        assert!(matches!(err, SortError::SortFieldNotAllowed { .. }));
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let mut query = posts_query();
        let err = apply(&mut query, "title; DROP TABLE posts", None).unwrap_err();
        assert!(matches!(err, SortError::SortFieldNotAllowed { .. }));
    }

    #[test]
    fn test_custom_handler() {
        let mut handlers: HashMap<String, SortHandler> = HashMap::new();
        handlers.insert(
            "popular".to_string(),
            Arc::new(|direction| {
                vec![
                    OrderKey::new("views", direction),
                    OrderKey::new("id", SortDirection::Ascending),
                ]
            }),
        );
        let allowed = AllowedSorts::Custom(handlers);

        let mut query = posts_query();
        apply(&mut query, "-popular", Some(&allowed)).unwrap();
        assert_eq!(
            query.orders(),
            &[
                OrderKey::new("views", SortDirection::Descending),
                OrderKey::new("id", SortDirection::Ascending),
            ]
        );
        assert!(apply(&mut query, "title", Some(&allowed)).is_err());
    }

    #[test]
    fn test_relation_sort_eager_loads() {
        let mut query = posts_query();
        apply(&mut query, "-author.name", None).unwrap();
        assert_eq!(
            query.eager_loads(),
            &[(
                "author".to_string(),
                Some(OrderKey::new("name", SortDirection::Descending))
            )]
        );
        assert_eq!(
            query.orders(),
            &[OrderKey::new("author_id", SortDirection::Descending)]
        );
    }

    #[test]
    fn test_relation_sort_unknown_relation() {
        let mut query = posts_query();
        let err = apply(&mut query, "ghost.name", None).unwrap_err();
        assert!(matches!(err, SortError::UnknownRelationship { .. }));
        assert!(query.eager_loads().is_empty());
    }

    #[test]
    fn test_sort_input_from_value() {
        let input = SortInput::from_value(&serde_json::json!(["-views", "title"]));
        assert_eq!(input.directives(&snapshot()), vec!["-views", "title"]);
        assert!(SortInput::from_value(&Value::Null).is_empty());
    }
}
