//! Operator registry.
//!
//! Maps symbolic operator keys used in filter input (`eq`, `gt`, `in`,
//! `between`, `today`, ...) to the store-level operator they translate to,
//! together with the operand shape each one accepts. Configured operators
//! are merged over the built-ins; configured keys win on collision.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{ConfigError, FilterError, FilterResult};
use crate::types::{Arity, DatePeriod, ValueShape};

/// A store-level operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
}

/// Family a store operator belongs to; decides which predicate it builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorFamily {
    Comparison,
    Pattern,
    Membership,
    Range,
    NullCheck,
}

impl StoreOperator {
    /// Parses a store operator token, case- and whitespace-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "=" | "==" => Some(StoreOperator::Eq),
            "!=" | "<>" => Some(StoreOperator::Ne),
            ">" => Some(StoreOperator::Gt),
            ">=" => Some(StoreOperator::Gte),
            "<" => Some(StoreOperator::Lt),
            "<=" => Some(StoreOperator::Lte),
            "LIKE" => Some(StoreOperator::Like),
            "NOT LIKE" => Some(StoreOperator::NotLike),
            "ILIKE" => Some(StoreOperator::ILike),
            "NOT ILIKE" => Some(StoreOperator::NotILike),
            "IN" => Some(StoreOperator::In),
            "NOT IN" => Some(StoreOperator::NotIn),
            "BETWEEN" => Some(StoreOperator::Between),
            "NOT BETWEEN" => Some(StoreOperator::NotBetween),
            "IS NULL" => Some(StoreOperator::IsNull),
            "IS NOT NULL" => Some(StoreOperator::IsNotNull),
            _ => None,
        }
    }

    /// Returns the SQL token.
    pub fn as_sql(&self) -> &'static str {
        match self {
            StoreOperator::Eq => "=",
            StoreOperator::Ne => "!=",
            StoreOperator::Gt => ">",
            StoreOperator::Gte => ">=",
            StoreOperator::Lt => "<",
            StoreOperator::Lte => "<=",
            StoreOperator::Like => "LIKE",
            StoreOperator::NotLike => "NOT LIKE",
            StoreOperator::ILike => "ILIKE",
            StoreOperator::NotILike => "NOT ILIKE",
            StoreOperator::In => "IN",
            StoreOperator::NotIn => "NOT IN",
            StoreOperator::Between => "BETWEEN",
            StoreOperator::NotBetween => "NOT BETWEEN",
            StoreOperator::IsNull => "IS NULL",
            StoreOperator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Returns the family this operator belongs to.
    pub fn family(&self) -> OperatorFamily {
        match self {
            StoreOperator::Eq
            | StoreOperator::Ne
            | StoreOperator::Gt
            | StoreOperator::Gte
            | StoreOperator::Lt
            | StoreOperator::Lte => OperatorFamily::Comparison,
            StoreOperator::Like
            | StoreOperator::NotLike
            | StoreOperator::ILike
            | StoreOperator::NotILike => OperatorFamily::Pattern,
            StoreOperator::In | StoreOperator::NotIn => OperatorFamily::Membership,
            StoreOperator::Between | StoreOperator::NotBetween => OperatorFamily::Range,
            StoreOperator::IsNull | StoreOperator::IsNotNull => OperatorFamily::NullCheck,
        }
    }

    /// Returns true for the negated forms.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            StoreOperator::Ne
                | StoreOperator::NotLike
                | StoreOperator::NotILike
                | StoreOperator::NotIn
                | StoreOperator::NotBetween
                | StoreOperator::IsNotNull
        )
    }

    /// Returns true for the case-insensitive pattern operators.
    pub fn is_case_insensitive(&self) -> bool {
        matches!(self, StoreOperator::ILike | StoreOperator::NotILike)
    }
}

impl fmt::Display for StoreOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a pattern operator builds its pattern from the operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternStyle {
    /// Wrap in `%...%` unless the operand already has a `%` or `_` wildcard.
    Wrap,
    /// `value%`, with the value escaped.
    StartsWith,
    /// `%value`, with the value escaped.
    EndsWith,
    /// `%value%`, with the value escaped.
    Contains,
}

/// What evaluating an operator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Comparison,
    Pattern(PatternStyle),
    Membership,
    Range,
    NullCheck,
    RelativeDate(DatePeriod),
}

impl OperatorKind {
    /// The store operator family this kind expects.
    pub fn family(&self) -> OperatorFamily {
        match self {
            OperatorKind::Comparison => OperatorFamily::Comparison,
            OperatorKind::Pattern(_) => OperatorFamily::Pattern,
            OperatorKind::Membership => OperatorFamily::Membership,
            OperatorKind::Range | OperatorKind::RelativeDate(_) => OperatorFamily::Range,
            OperatorKind::NullCheck => OperatorFamily::NullCheck,
        }
    }

    fn inferred(op: StoreOperator) -> Self {
        match op.family() {
            OperatorFamily::Comparison => OperatorKind::Comparison,
            OperatorFamily::Pattern => OperatorKind::Pattern(PatternStyle::Wrap),
            OperatorFamily::Membership => OperatorKind::Membership,
            OperatorFamily::Range => OperatorKind::Range,
            OperatorFamily::NullCheck => OperatorKind::NullCheck,
        }
    }

    /// Operand shape accepted by this kind.
    pub fn shape(&self) -> ValueShape {
        match self {
            OperatorKind::Comparison | OperatorKind::Pattern(_) => ValueShape::Scalar,
            OperatorKind::Membership => ValueShape::Array,
            OperatorKind::Range => ValueShape::Pair,
            OperatorKind::NullCheck => ValueShape::None,
            OperatorKind::RelativeDate(period) if period.takes_day_count() => ValueShape::Scalar,
            OperatorKind::RelativeDate(_) => ValueShape::None,
        }
    }

    /// Number of terms related.
    pub fn arity(&self) -> Arity {
        match self.shape() {
            ValueShape::None => Arity::Unary,
            ValueShape::Scalar => Arity::Binary,
            ValueShape::Array | ValueShape::Pair => Arity::NAry,
        }
    }
}

/// A resolved operator definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDef {
    pub key: String,
    pub store_op: StoreOperator,
    pub kind: OperatorKind,
}

impl OperatorDef {
    fn new(key: &str, store_op: StoreOperator, kind: OperatorKind) -> Self {
        Self {
            key: key.to_string(),
            store_op,
            kind,
        }
    }

    /// Operand shape this operator accepts.
    pub fn shape(&self) -> ValueShape {
        self.kind.shape()
    }

    /// Arity of this operator.
    pub fn arity(&self) -> Arity {
        self.kind.arity()
    }
}

/// The active operator table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorRegistry {
    operators: HashMap<String, OperatorDef>,
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OperatorRegistry {
    /// Creates the registry of built-in operators.
    pub fn builtin() -> Self {
        use OperatorKind as K;
        use StoreOperator as S;

        let defs = [
            OperatorDef::new("eq", S::Eq, K::Comparison),
            OperatorDef::new("ne", S::Ne, K::Comparison),
            OperatorDef::new("neq", S::Ne, K::Comparison),
            OperatorDef::new("gt", S::Gt, K::Comparison),
            OperatorDef::new("gte", S::Gte, K::Comparison),
            OperatorDef::new("lt", S::Lt, K::Comparison),
            OperatorDef::new("lte", S::Lte, K::Comparison),
            OperatorDef::new("like", S::Like, K::Pattern(PatternStyle::Wrap)),
            OperatorDef::new("not_like", S::NotLike, K::Pattern(PatternStyle::Wrap)),
            OperatorDef::new("ilike", S::ILike, K::Pattern(PatternStyle::Wrap)),
            OperatorDef::new("not_ilike", S::NotILike, K::Pattern(PatternStyle::Wrap)),
            OperatorDef::new("starts_with", S::Like, K::Pattern(PatternStyle::StartsWith)),
            OperatorDef::new("ends_with", S::Like, K::Pattern(PatternStyle::EndsWith)),
            OperatorDef::new("contains", S::Like, K::Pattern(PatternStyle::Contains)),
            OperatorDef::new("in", S::In, K::Membership),
            OperatorDef::new("not_in", S::NotIn, K::Membership),
            OperatorDef::new("between", S::Between, K::Range),
            OperatorDef::new("not_between", S::NotBetween, K::Range),
            OperatorDef::new("null", S::IsNull, K::NullCheck),
            OperatorDef::new("not_null", S::IsNotNull, K::NullCheck),
            OperatorDef::new("today", S::Between, K::RelativeDate(DatePeriod::Today)),
            OperatorDef::new("yesterday", S::Between, K::RelativeDate(DatePeriod::Yesterday)),
            OperatorDef::new("this_week", S::Between, K::RelativeDate(DatePeriod::ThisWeek)),
            OperatorDef::new("last_week", S::Between, K::RelativeDate(DatePeriod::LastWeek)),
            OperatorDef::new("this_month", S::Between, K::RelativeDate(DatePeriod::ThisMonth)),
            OperatorDef::new("last_month", S::Between, K::RelativeDate(DatePeriod::LastMonth)),
            OperatorDef::new("this_year", S::Between, K::RelativeDate(DatePeriod::ThisYear)),
            OperatorDef::new("last_year", S::Between, K::RelativeDate(DatePeriod::LastYear)),
            OperatorDef::new("last_x_days", S::Between, K::RelativeDate(DatePeriod::LastDays)),
            OperatorDef::new("next_x_days", S::Between, K::RelativeDate(DatePeriod::NextDays)),
        ];

        Self {
            operators: defs.into_iter().map(|d| (d.key.clone(), d)).collect(),
        }
    }

    /// Builds the registry from built-ins plus configured overrides.
    ///
    /// An override of a built-in key keeps the built-in behavior when the
    /// new store operator is of the same family; otherwise the behavior is
    /// inferred from the store operator, as it is for new keys.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut registry = Self::builtin();
        for (key, token) in overrides {
            let store_op =
                StoreOperator::parse(token).ok_or_else(|| ConfigError::InvalidStoreOperator {
                    operator: key.clone(),
                    store_operator: token.clone(),
                })?;
            registry.register(key, store_op);
        }
        Ok(registry)
    }

    /// Registers or replaces an operator.
    pub fn register(&mut self, key: &str, store_op: StoreOperator) {
        let kind = match self.operators.get(key) {
            Some(existing) if existing.kind.family() == store_op.family() => existing.kind,
            _ => OperatorKind::inferred(store_op),
        };
        self.operators
            .insert(key.to_string(), OperatorDef::new(key, store_op, kind));
    }

    /// Returns true if the key is registered.
    pub fn exists(&self, key: &str) -> bool {
        self.operators.contains_key(key)
    }

    /// Looks up an operator definition.
    pub fn get(&self, key: &str) -> Option<&OperatorDef> {
        self.operators.get(key)
    }

    /// Resolves an operator key to its store operator.
    pub fn resolve(&self, key: &str) -> FilterResult<StoreOperator> {
        self.lookup(key, "").map(|def| def.store_op)
    }

    /// Looks up an operator definition, reporting `field` on failure.
    pub fn lookup(&self, key: &str, field: &str) -> FilterResult<&OperatorDef> {
        self.operators
            .get(key)
            .ok_or_else(|| FilterError::UnsupportedOperator {
                field: field.to_string(),
                operator: key.to_string(),
            })
    }

    /// Returns the key to store-operator table, sorted by key.
    pub fn table(&self) -> BTreeMap<String, String> {
        self.operators
            .values()
            .map(|d| (d.key.clone(), d.store_op.as_sql().to_string()))
            .collect()
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns true if no operators are registered.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolution() {
        let registry = OperatorRegistry::builtin();
        assert_eq!(registry.resolve("eq").unwrap(), StoreOperator::Eq);
        assert_eq!(registry.resolve("not_in").unwrap(), StoreOperator::NotIn);
        assert_eq!(registry.resolve("null").unwrap(), StoreOperator::IsNull);
        assert!(registry.exists("last_x_days"));
        assert!(!registry.exists("regex"));
    }

    #[test]
    fn test_unknown_operator() {
        let registry = OperatorRegistry::builtin();
        let err = registry.lookup("regex", "title").unwrap_err();
        assert_eq!(
            err,
            FilterError::UnsupportedOperator {
                field: "title".to_string(),
                operator: "regex".to_string(),
            }
        );
    }

    #[test]
    fn test_store_operator_parse() {
        assert_eq!(StoreOperator::parse("<>"), Some(StoreOperator::Ne));
        assert_eq!(StoreOperator::parse("not  like"), Some(StoreOperator::NotLike));
        assert_eq!(StoreOperator::parse("is not null"), Some(StoreOperator::IsNotNull));
        assert_eq!(StoreOperator::parse("; DROP"), None);
    }

    #[test]
    fn test_shapes() {
        let registry = OperatorRegistry::builtin();
        assert_eq!(registry.get("between").unwrap().shape(), ValueShape::Pair);
        assert_eq!(registry.get("in").unwrap().shape(), ValueShape::Array);
        assert_eq!(registry.get("null").unwrap().shape(), ValueShape::None);
        assert_eq!(registry.get("today").unwrap().shape(), ValueShape::None);
        assert_eq!(registry.get("last_x_days").unwrap().shape(), ValueShape::Scalar);
        assert_eq!(registry.get("in").unwrap().arity(), Arity::NAry);
    }

    #[test]
    fn test_override_builtin_same_family_keeps_kind() {
        let mut overrides = BTreeMap::new();
        overrides.insert("starts_with".to_string(), "ILIKE".to_string());
        let registry = OperatorRegistry::with_overrides(&overrides).unwrap();
        let def = registry.get("starts_with").unwrap();
        assert_eq!(def.store_op, StoreOperator::ILike);
        assert_eq!(def.kind, OperatorKind::Pattern(PatternStyle::StartsWith));
    }

    #[test]
    fn test_override_adds_new_key() {
        let mut overrides = BTreeMap::new();
        overrides.insert("is".to_string(), "=".to_string());
        overrides.insert("excludes".to_string(), "NOT IN".to_string());
        let registry = OperatorRegistry::with_overrides(&overrides).unwrap();
        assert_eq!(registry.get("is").unwrap().kind, OperatorKind::Comparison);
        assert_eq!(registry.get("excludes").unwrap().kind, OperatorKind::Membership);
    }

    #[test]
    fn test_override_rejects_unsafe_token() {
        let mut overrides = BTreeMap::new();
        overrides.insert("evil".to_string(), "= 1 OR 1 =".to_string());
        let err = OperatorRegistry::with_overrides(&overrides).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStoreOperator { .. }));
    }

    #[test]
    fn test_table_lists_store_tokens() {
        let table = OperatorRegistry::builtin().table();
        assert_eq!(table.get("gte").map(String::as_str), Some(">="));
        assert_eq!(table.get("today").map(String::as_str), Some("BETWEEN"));
    }
}
