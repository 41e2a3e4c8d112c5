//! Core input types for filter, search and sort translation.
//!
//! This module defines the parsed forms of caller-supplied input:
//! - [`FilterSpec`], [`FilterGroup`] and [`FilterEntry`]: the filter grammar
//! - [`Operand`] and [`ValueShape`]: operator operands as a tagged union
//! - [`CastType`]: per-field coercion rules
//! - [`SortDirection`] and [`SortDirective`]: ordered sort keys
//! - [`Boolean`]: the connective joining sibling predicates

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FilterError, FilterResult};

/// Key introducing an explicit boolean group in a filter map.
pub const GROUP_KEY: &str = "_group";

/// Key inside an operator map selecting the connective between its operators.
pub const OPERATOR_BOOLEAN_KEY: &str = "boolean";

/// Boolean connective between sibling predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boolean {
    /// All predicates must hold.
    #[default]
    And,
    /// At least one predicate must hold.
    Or,
}

impl Boolean {
    /// Parses a connective, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "and" => Some(Boolean::And),
            "or" => Some(Boolean::Or),
            _ => None,
        }
    }

    /// Returns the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

impl fmt::Display for Boolean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boolean::And => write!(f, "and"),
            Boolean::Or => write!(f, "or"),
        }
    }
}

/// Per-field cast rule applied to operands before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    /// Signed integer.
    #[serde(alias = "integer")]
    Int,
    /// Floating point number.
    #[serde(alias = "double", alias = "real")]
    Float,
    /// String, numbers and booleans are stringified.
    String,
    /// Lenient boolean, bound as 0/1.
    #[serde(alias = "boolean")]
    Bool,
    /// JSON array, the raw string is kept if it does not parse.
    Array,
    /// JSON document, the raw string is kept if it does not parse.
    Json,
    /// Date, passed through unchanged.
    Date,
    /// Date and time, passed through unchanged.
    Datetime,
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastType::Int => "int",
            CastType::Float => "float",
            CastType::String => "string",
            CastType::Bool => "bool",
            CastType::Array => "array",
            CastType::Json => "json",
            CastType::Date => "date",
            CastType::Datetime => "datetime",
        };
        f.write_str(name)
    }
}

impl FromStr for CastType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" | "integer" => Ok(CastType::Int),
            "float" | "double" | "real" => Ok(CastType::Float),
            "string" => Ok(CastType::String),
            "bool" | "boolean" => Ok(CastType::Bool),
            "array" => Ok(CastType::Array),
            "json" => Ok(CastType::Json),
            "date" => Ok(CastType::Date),
            "datetime" => Ok(CastType::Datetime),
            _ => Err(format!("unknown cast type: {}", s)),
        }
    }
}

/// Operand shape an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueShape {
    /// No operand (`null`, `today`).
    None,
    /// A single value.
    Scalar,
    /// One or more values.
    Array,
    /// Exactly two values.
    Pair,
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueShape::None => write!(f, "no value"),
            ValueShape::Scalar => write!(f, "a single value"),
            ValueShape::Array => write!(f, "a non-empty list"),
            ValueShape::Pair => write!(f, "exactly two values"),
        }
    }
}

/// Number of terms an operator relates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Arity {
    /// Column only.
    Unary,
    /// Column and one operand.
    Binary,
    /// Column and a list of operands.
    NAry,
    /// No column test of its own.
    None,
}

/// An operand after shape validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No value (null checks, fixed relative dates).
    None,
    /// A single value.
    Scalar(Value),
    /// A list for membership operators.
    List(Vec<Value>),
    /// Low and high bounds.
    Pair(Value, Value),
}

impl Operand {
    /// Short description of the operand shape for error messages.
    pub fn describe(value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(items) => format!("list of {}", items.len()),
            Value::Object(_) => "object".to_string(),
        }
    }
}

/// Calendar period computed by a relative-date operator.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePeriod {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
    /// The last N days up to and including today.
    LastDays,
    /// Today and the next N days.
    NextDays,
}

impl DatePeriod {
    /// Returns true if the period takes a day count operand.
    pub fn takes_day_count(&self) -> bool {
        matches!(self, DatePeriod::LastDays | DatePeriod::NextDays)
    }
}

/// Condition attached to a single field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// A literal scalar or list; implies `eq` or `in`.
    Literal(Value),
    /// Operator key to operand pairs, joined by `boolean`.
    Operators {
        /// How the operator conditions are joined.
        boolean: Boolean,
        /// Operator keys and raw operands, in input order.
        operators: Vec<(String, Value)>,
    },
}

/// A field path with its condition.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    /// Dot-separated field path.
    pub path: String,
    /// The condition on that path.
    pub condition: FilterCondition,
}

/// A boolean group of filters and nested groups.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGroup {
    /// Connective joining the group's members.
    pub boolean: Boolean,
    /// Field conditions and inline groups, in input order.
    pub filters: Vec<FilterNode>,
    /// Groups listed under the `nested` key.
    pub nested: Vec<FilterGroup>,
}

/// One element of a filter map.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// A condition on one field path.
    Field(FilterEntry),
    /// A boolean group.
    Group(FilterGroup),
}

/// A parsed filter specification.
///
/// Top-level nodes are combined conjunctively, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSpec {
    /// Top-level nodes.
    pub nodes: Vec<FilterNode>,
}

impl FilterSpec {
    /// Parses raw filter input.
    ///
    /// Accepts a map of field paths, or a list of group definitions. `null`
    /// parses to an empty spec.
    pub fn from_value(value: &Value) -> FilterResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self {
                nodes: parse_filter_map(map)?,
            }),
            Value::Array(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    nodes.push(FilterNode::Group(parse_group(item)?));
                }
                Ok(Self { nodes })
            }
            other => Err(FilterError::InvalidInputShape {
                expected: "a map of filters or a list of groups".to_string(),
                found: Operand::describe(other),
            }),
        }
    }

    /// Returns true if there are no filters.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of top-level filters.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn parse_filter_map(map: &Map<String, Value>) -> FilterResult<Vec<FilterNode>> {
    let mut nodes = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key == GROUP_KEY {
            match value {
                Value::Array(groups) => {
                    for group in groups {
                        nodes.push(FilterNode::Group(parse_group(group)?));
                    }
                }
                _ => nodes.push(FilterNode::Group(parse_group(value)?)),
            }
            continue;
        }

        if let Some(boolean) = Boolean::parse(key) {
            nodes.push(FilterNode::Group(parse_legacy_group(boolean, value)?));
            continue;
        }

        let condition = match value {
            Value::Object(ops) => parse_operator_map(ops)?,
            other => FilterCondition::Literal(other.clone()),
        };
        nodes.push(FilterNode::Field(FilterEntry {
            path: key.clone(),
            condition,
        }));
    }
    Ok(nodes)
}

fn parse_operator_map(ops: &Map<String, Value>) -> FilterResult<FilterCondition> {
    let mut boolean = Boolean::And;
    let mut operators = Vec::with_capacity(ops.len());
    for (key, operand) in ops {
        if key == OPERATOR_BOOLEAN_KEY {
            if let Some(b) = operand.as_str().and_then(Boolean::parse) {
                boolean = b;
                continue;
            }
            return Err(FilterError::InvalidInputShape {
                expected: "'and' or 'or'".to_string(),
                found: Operand::describe(operand),
            });
        }
        operators.push((key.clone(), operand.clone()));
    }
    Ok(FilterCondition::Operators { boolean, operators })
}

/// Parses `{boolean, filters, nested}`. A plain filter map is accepted as an
/// `and` group.
fn parse_group(value: &Value) -> FilterResult<FilterGroup> {
    let map = value
        .as_object()
        .ok_or_else(|| FilterError::InvalidInputShape {
            expected: "a group object".to_string(),
            found: Operand::describe(value),
        })?;

    let is_group_definition = !map.is_empty()
        && map
            .keys()
            .all(|k| matches!(k.as_str(), "boolean" | "filters" | "nested"));
    if !is_group_definition {
        return Ok(FilterGroup {
            boolean: Boolean::And,
            filters: parse_filter_map(map)?,
            nested: Vec::new(),
        });
    }

    let boolean = match map.get("boolean") {
        None | Some(Value::Null) => Boolean::And,
        Some(v) => v
            .as_str()
            .and_then(Boolean::parse)
            .ok_or_else(|| FilterError::InvalidInputShape {
                expected: "'and' or 'or'".to_string(),
                found: Operand::describe(v),
            })?,
    };

    let filters = match map.get("filters") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(filters)) => parse_filter_map(filters)?,
        Some(other) => {
            return Err(FilterError::InvalidInputShape {
                expected: "a map of filters".to_string(),
                found: Operand::describe(other),
            });
        }
    };

    let nested = match map.get("nested") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(parse_group).collect::<FilterResult<_>>()?,
        Some(single @ Value::Object(_)) => vec![parse_group(single)?],
        Some(other) => {
            return Err(FilterError::InvalidInputShape {
                expected: "a list of groups".to_string(),
                found: Operand::describe(other),
            });
        }
    };

    Ok(FilterGroup {
        boolean,
        filters,
        nested,
    })
}

/// Parses the `and: {...}` / `or: [{...}, {...}]` shorthand.
fn parse_legacy_group(boolean: Boolean, value: &Value) -> FilterResult<FilterGroup> {
    match value {
        Value::Object(map) => Ok(FilterGroup {
            boolean,
            filters: parse_filter_map(map)?,
            nested: Vec::new(),
        }),
        Value::Array(items) => Ok(FilterGroup {
            boolean,
            filters: Vec::new(),
            nested: items.iter().map(parse_group).collect::<FilterResult<_>>()?,
        }),
        other => Err(FilterError::InvalidInputShape {
            expected: format!("a map or list of filters under '{}'", boolean),
            found: Operand::describe(other),
        }),
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    /// Descending order.
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl SortDirection {
    /// Parses a direction word, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Ascending),
            "desc" | "descending" => Some(SortDirection::Descending),
            _ => None,
        }
    }

    /// Returns the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => write!(f, "asc"),
            SortDirection::Descending => write!(f, "desc"),
        }
    }
}

/// A parsed sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    /// Field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortDirective {
    /// Creates a new sort directive.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}
