//! Reference SQL query builder.
//!
//! [`SqlQuery`] records everything the engine appends and renders it as a
//! single parameterised `SELECT` statement. Relationship predicates become
//! correlated `EXISTS (SELECT 1 ...)` subqueries; each subquery aliases its
//! table as `{relation}_{depth}` so self-referencing relations stay
//! unambiguous.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::filter::UnknownRelation;
use crate::operators::StoreOperator;
use crate::predicate::{OrderKey, Predicate, QueryBuilder};
use crate::schema::{Catalog, Model};
use crate::types::{Boolean, SortDirection};

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Integer(i),
                None => n.as_f64().map(SqlParam::Float).unwrap_or(SqlParam::Null),
            },
            Value::String(s) => SqlParam::String(s.clone()),
            other => SqlParam::String(other.to_string()),
        }
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            SqlParam::Integer(i) => write!(f, "{}", i),
            SqlParam::Float(x) => write!(f, "{}", x),
            SqlParam::Null => write!(f, "NULL"),
        }
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Creates a fragment with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Adds a parameter placeholder and returns the placeholder string.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// SQL dialect of the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// No native ILIKE; case-insensitive matches lower both sides.
    #[default]
    Sqlite,
    /// Native ILIKE.
    Postgres,
}

impl Dialect {
    /// Parses a dialect name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(Dialect::Postgres),
            _ => None,
        }
    }
}

/// A query over one catalog model that renders to SQL.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    catalog: Arc<Catalog>,
    model: Model,
    dialect: Dialect,
    conditions: Vec<(Boolean, Predicate)>,
    orders: Vec<OrderKey>,
    eager_loads: Vec<(String, Option<OrderKey>)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlQuery {
    /// Creates a query selecting from `model`, or `None` if the catalog has
    /// no such model.
    pub fn new(catalog: Arc<Catalog>, model: &str, dialect: Dialect) -> Option<Self> {
        let model = catalog.get(model)?.clone();
        Some(Self {
            catalog,
            model,
            dialect,
            conditions: Vec::new(),
            orders: Vec::new(),
            eager_loads: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    /// The rendering dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Appended conditions with the connective each was appended with.
    pub fn conditions(&self) -> &[(Boolean, Predicate)] {
        &self.conditions
    }

    /// Appended orderings.
    pub fn orders(&self) -> &[OrderKey] {
        &self.orders
    }

    /// Declared eager loads, in declaration order.
    pub fn eager_loads(&self) -> &[(String, Option<OrderKey>)] {
        &self.eager_loads
    }

    /// The row limit, if set.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// The row offset, if set.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// Renders only the WHERE condition, without the keyword.
    pub fn where_clause(&self) -> Result<SqlFragment, UnknownRelation> {
        let mut fragment = SqlFragment::new("");
        self.render_conditions(&mut fragment)?;
        Ok(fragment)
    }

    /// Renders the full statement.
    ///
    /// The connective of the first condition is ignored; later conditions
    /// are joined left to right with their own connective.
    pub fn to_sql(&self) -> Result<SqlFragment, UnknownRelation> {
        let table = &self.model.table;
        let mut fragment = SqlFragment::new("");
        self.render_conditions(&mut fragment)?;

        let mut sql = format!("SELECT {}.* FROM {}", table, table);
        if !fragment.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }
        if let Some(order_by) = self.build_order_by() {
            sql.push(' ');
            sql.push_str(&order_by);
        }
        if let Some(limit) = self.build_limit() {
            sql.push(' ');
            sql.push_str(&limit);
        }

        Ok(SqlFragment::with_params(sql, fragment.params))
    }

    fn render_conditions(&self, fragment: &mut SqlFragment) -> Result<(), UnknownRelation> {
        let table = self.model.table.clone();
        let mut sql = String::new();
        for (i, (boolean, predicate)) in self.conditions.iter().enumerate() {
            let rendered = self.render(&self.model, &table, 0, predicate, fragment)?;
            if i > 0 {
                sql.push(' ');
                sql.push_str(boolean.as_sql());
                sql.push(' ');
            }
            sql.push_str(&rendered);
        }
        fragment.sql = sql;
        Ok(())
    }

    fn render(
        &self,
        model: &Model,
        alias: &str,
        depth: usize,
        predicate: &Predicate,
        fragment: &mut SqlFragment,
    ) -> Result<String, UnknownRelation> {
        let sql = match predicate {
            Predicate::Compare { column, op, value } => {
                let placeholder = fragment.add_param(SqlParam::from(value));
                format!("{}.{} {} {}", alias, column, op.as_sql(), placeholder)
            }
            Predicate::Pattern {
                column,
                op,
                pattern,
                case_insensitive,
            } => {
                let placeholder = fragment.add_param(SqlParam::string(pattern.as_str()));
                let lowered = *case_insensitive
                    && matches!(op, StoreOperator::Like | StoreOperator::NotLike);
                if lowered {
                    format!(
                        "LOWER({}.{}) {} LOWER({}) ESCAPE '\\'",
                        alias,
                        column,
                        op.as_sql(),
                        placeholder
                    )
                } else {
                    format!(
                        "{}.{} {} {} ESCAPE '\\'",
                        alias,
                        column,
                        op.as_sql(),
                        placeholder
                    )
                }
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| fragment.add_param(SqlParam::from(v)))
                    .collect();
                let op = if *negated {
                    StoreOperator::NotIn
                } else {
                    StoreOperator::In
                };
                format!(
                    "{}.{} {} ({})",
                    alias,
                    column,
                    op.as_sql(),
                    placeholders.join(", ")
                )
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => {
                let low = fragment.add_param(SqlParam::from(low));
                let high = fragment.add_param(SqlParam::from(high));
                let op = if *negated {
                    StoreOperator::NotBetween
                } else {
                    StoreOperator::Between
                };
                format!("{}.{} {} {} AND {}", alias, column, op.as_sql(), low, high)
            }
            Predicate::Null { column, negated } => {
                let op = if *negated {
                    StoreOperator::IsNotNull
                } else {
                    StoreOperator::IsNull
                };
                format!("{}.{} {}", alias, column, op.as_sql())
            }
            Predicate::Exists {
                relation,
                predicate,
            } => {
                let (def, target) =
                    self.catalog
                        .related(model, relation)
                        .ok_or_else(|| UnknownRelation {
                            model: model.name.clone(),
                            relation: relation.clone(),
                        })?;
                let inner_alias = format!("{}_{}", relation, depth + 1);
                let inner = self.render(target, &inner_alias, depth + 1, predicate, fragment)?;
                format!(
                    "EXISTS (SELECT 1 FROM {} {} WHERE {}.{} = {}.{} AND {})",
                    target.table,
                    inner_alias,
                    inner_alias,
                    def.related_column(),
                    alias,
                    def.parent_column(),
                    inner
                )
            }
            Predicate::Group {
                boolean,
                predicates,
            } => {
                if predicates.is_empty() {
                    return Ok(match boolean {
                        Boolean::And => "1 = 1",
                        Boolean::Or => "1 = 0",
                    }
                    .to_string());
                }
                let mut parts = Vec::with_capacity(predicates.len());
                for p in predicates {
                    parts.push(self.render(model, alias, depth, p, fragment)?);
                }
                format!("({})", parts.join(&format!(" {} ", boolean.as_sql())))
            }
        };
        Ok(sql)
    }

    fn build_order_by(&self) -> Option<String> {
        if self.orders.is_empty() {
            return None;
        }
        let keys: Vec<String> = self
            .orders
            .iter()
            .map(|key| {
                format!(
                    "{}.{} {}",
                    self.model.table,
                    key.column,
                    key.direction.as_sql()
                )
            })
            .collect();
        Some(format!("ORDER BY {}", keys.join(", ")))
    }

    fn build_limit(&self) -> Option<String> {
        match (self.limit, self.offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (None, Some(offset)) => Some(match self.dialect {
                Dialect::Sqlite => format!("LIMIT -1 OFFSET {}", offset),
                Dialect::Postgres => format!("OFFSET {}", offset),
            }),
        }
    }
}

impl QueryBuilder for SqlQuery {
    fn model(&self) -> &Model {
        &self.model
    }

    fn related_model(&self, model: &Model, relation: &str) -> Option<&Model> {
        self.catalog.related(model, relation).map(|(_, target)| target)
    }

    fn supports_case_insensitive_like(&self) -> bool {
        self.dialect == Dialect::Postgres
    }

    fn where_compare(&mut self, boolean: Boolean, column: &str, op: StoreOperator, value: Value) {
        self.conditions.push((
            boolean,
            Predicate::Compare {
                column: column.to_string(),
                op,
                value,
            },
        ));
    }

    fn where_pattern(
        &mut self,
        boolean: Boolean,
        column: &str,
        op: StoreOperator,
        pattern: String,
        case_insensitive: bool,
    ) {
        self.conditions.push((
            boolean,
            Predicate::Pattern {
                column: column.to_string(),
                op,
                pattern,
                case_insensitive,
            },
        ));
    }

    fn where_in(&mut self, boolean: Boolean, column: &str, values: Vec<Value>, negated: bool) {
        self.conditions.push((
            boolean,
            Predicate::In {
                column: column.to_string(),
                values,
                negated,
            },
        ));
    }

    fn where_between(
        &mut self,
        boolean: Boolean,
        column: &str,
        low: Value,
        high: Value,
        negated: bool,
    ) {
        self.conditions.push((
            boolean,
            Predicate::Between {
                column: column.to_string(),
                low,
                high,
                negated,
            },
        ));
    }

    fn where_null(&mut self, boolean: Boolean, column: &str, negated: bool) {
        self.conditions.push((
            boolean,
            Predicate::Null {
                column: column.to_string(),
                negated,
            },
        ));
    }

    fn where_nested(&mut self, boolean: Boolean, inner: Boolean, predicates: Vec<Predicate>) {
        self.conditions.push((
            boolean,
            Predicate::Group {
                boolean: inner,
                predicates,
            },
        ));
    }

    fn where_has(&mut self, boolean: Boolean, relation: &str, predicate: Predicate) {
        self.conditions
            .push((boolean, Predicate::exists(relation, predicate)));
    }

    fn order_by(&mut self, column: &str, direction: SortDirection) {
        self.orders.push(OrderKey::new(column, direction));
    }

    fn with_relation(&mut self, relation: &str, order: Option<OrderKey>) {
        self.eager_loads.push((relation.to_string(), order));
    }

    fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    fn offset(&mut self, offset: u64) {
        self.offset = Some(offset);
    }
}
