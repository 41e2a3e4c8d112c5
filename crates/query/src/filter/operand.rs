//! Operand handling for single-field conditions.

use serde_json::Value;
use tracing::debug;

use super::FilterEvaluator;
use super::dates::date_range;
use crate::coercion::{CastFailure, cast_optional};
use crate::error::{FilterError, FilterResult};
use crate::operators::{OperatorDef, OperatorKind, PatternStyle, StoreOperator};
use crate::predicate::{Predicate, QueryBuilder, escape_like};
use crate::schema::Model;
use crate::types::{CastType, FilterCondition, Operand, ValueShape};

impl<Q: QueryBuilder + ?Sized> FilterEvaluator<'_, Q> {
    /// Evaluates the condition on `column` of `model`. `path` is the field
    /// path as the caller wrote it, used in errors.
    pub(super) fn eval_condition(
        &self,
        model: &Model,
        column: &str,
        condition: &FilterCondition,
        path: &str,
    ) -> FilterResult<Option<Predicate>> {
        match condition {
            FilterCondition::Literal(value) => self.eval_literal(model, column, value, path),
            FilterCondition::Operators { boolean, operators } => {
                if operators.is_empty() {
                    debug!(field = %path, "Skipping empty operator map");
                    return Ok(None);
                }
                let mut predicates = Vec::with_capacity(operators.len());
                for (key, operand) in operators {
                    if let Some(predicate) =
                        self.apply_operator(model, column, key, operand, path)?
                    {
                        predicates.push(predicate);
                    }
                }
                Ok(Predicate::join(*boolean, predicates))
            }
        }
    }

    fn eval_literal(
        &self,
        model: &Model,
        column: &str,
        value: &Value,
        path: &str,
    ) -> FilterResult<Option<Predicate>> {
        match value {
            Value::Null => Ok(Some(Predicate::Null {
                column: column.to_string(),
                negated: false,
            })),
            Value::Array(items) => {
                let items = drop_blank(items.iter().cloned());
                if items.is_empty() {
                    debug!(field = %path, "Skipping empty implied in list");
                    return Ok(None);
                }
                self.apply_operator(model, column, "in", &Value::Array(items), path)
            }
            scalar => self.apply_operator(model, column, "eq", scalar, path),
        }
    }

    fn apply_operator(
        &self,
        model: &Model,
        column: &str,
        key: &str,
        value: &Value,
        path: &str,
    ) -> FilterResult<Option<Predicate>> {
        let registry = self.snapshot.operators();
        if !registry.exists(key) {
            if let Some(handler) = self.snapshot.config().custom_filters.get(key) {
                return self.apply_custom(column, key, handler, value, path).map(Some);
            }
        }

        let def = registry.lookup(key, path)?;
        let operand = shape_operand(def, value, path)?;
        let cast = model.cast_for(column);
        let column = column.to_string();

        let predicate = match (def.kind, operand) {
            (OperatorKind::Comparison, Operand::Scalar(value)) => {
                if value.is_null() {
                    match def.store_op {
                        StoreOperator::Eq | StoreOperator::Ne => Predicate::Null {
                            column,
                            negated: def.store_op.is_negated(),
                        },
                        _ => {
                            return Err(type_mismatch(
                                path,
                                key,
                                "null",
                                "null cannot be ordered",
                            ));
                        }
                    }
                } else {
                    Predicate::Compare {
                        column,
                        op: def.store_op,
                        value: cast_operand(value, cast, path, key)?,
                    }
                }
            }
            (OperatorKind::Pattern(style), Operand::Scalar(value)) => {
                self.pattern(column, def.store_op, style, &value, path, key)?
            }
            (OperatorKind::Membership, Operand::List(values)) => {
                let mut cast_values = Vec::with_capacity(values.len());
                for value in values {
                    let value = cast_operand(value, cast, path, key)?;
                    if !self.snapshot.config().operands.dedupe_in || !cast_values.contains(&value) {
                        cast_values.push(value);
                    }
                }
                Predicate::In {
                    column,
                    values: cast_values,
                    negated: def.store_op.is_negated(),
                }
            }
            (OperatorKind::Range, Operand::Pair(low, high)) => {
                let low = cast_operand(low, cast, path, key)?;
                let high = cast_operand(high, cast, path, key)?;
                self.check_bounds(&low, &high, path, key)?;
                Predicate::Between {
                    column,
                    low,
                    high,
                    negated: def.store_op.is_negated(),
                }
            }
            (OperatorKind::NullCheck, Operand::None) => Predicate::Null {
                column,
                negated: def.store_op.is_negated(),
            },
            (OperatorKind::RelativeDate(period), operand) => {
                let days = match operand {
                    Operand::Scalar(value) => day_count(&value)
                        .ok_or_else(|| {
                            type_mismatch(
                                path,
                                key,
                                &Operand::describe(&value),
                                "expected a non-negative whole number of days",
                            )
                        })?,
                    _ => 0,
                };
                let config = self.snapshot.config();
                let (low, high) = date_range(
                    period,
                    days,
                    self.clock.now(),
                    self.snapshot.timezone(),
                    &config.dates.format,
                )
                .ok_or_else(|| type_mismatch(path, key, "number", "date range out of bounds"))?;
                Predicate::Between {
                    column,
                    low: Value::String(low),
                    high: Value::String(high),
                    negated: def.store_op.is_negated(),
                }
            }
            (kind, operand) => {
                return Err(FilterError::OperandArityMismatch {
                    field: path.to_string(),
                    operator: key.to_string(),
                    expected: kind.shape().to_string(),
                    found: format!("{:?}", operand),
                });
            }
        };

        Ok(Some(predicate))
    }

    fn pattern(
        &self,
        column: String,
        store_op: StoreOperator,
        style: PatternStyle,
        value: &Value,
        path: &str,
        key: &str,
    ) -> FilterResult<Predicate> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(type_mismatch(
                    path,
                    key,
                    &Operand::describe(other),
                    "expected text to match",
                ));
            }
        };

        let pattern = match style {
            PatternStyle::Wrap if text.contains(['%', '_']) => text,
            PatternStyle::Wrap => format!("%{}%", text),
            PatternStyle::StartsWith => format!("{}%", escape_like(&text)),
            PatternStyle::EndsWith => format!("%{}", escape_like(&text)),
            PatternStyle::Contains => format!("%{}%", escape_like(&text)),
        };

        let (op, case_insensitive) =
            if store_op.is_case_insensitive() && !self.query.supports_case_insensitive_like() {
                let op = if store_op.is_negated() {
                    StoreOperator::NotLike
                } else {
                    StoreOperator::Like
                };
                (op, true)
            } else {
                (store_op, false)
            };

        Ok(Predicate::Pattern {
            column,
            op,
            pattern,
            case_insensitive,
        })
    }

    fn check_bounds(&self, low: &Value, high: &Value, path: &str, key: &str) -> FilterResult<()> {
        match (numeric(low), numeric(high)) {
            (Some(l), Some(h)) if l > h => Err(type_mismatch(
                path,
                key,
                "number",
                "lower bound is greater than upper bound",
            )),
            (Some(_), Some(_)) => Ok(()),
            _ if self.snapshot.config().operands.strict_between => Err(type_mismatch(
                path,
                key,
                &format!("{} and {}", Operand::describe(low), Operand::describe(high)),
                "bounds must be numeric",
            )),
            _ => Ok(()),
        }
    }

    fn apply_custom(
        &self,
        column: &str,
        key: &str,
        handler_name: &str,
        value: &Value,
        path: &str,
    ) -> FilterResult<Predicate> {
        let handler =
            self.custom
                .get(handler_name)
                .ok_or_else(|| FilterError::UnsupportedOperator {
                    field: path.to_string(),
                    operator: key.to_string(),
                })?;
        handler
            .validate(value)
            .map_err(|message| FilterError::CustomFilterRejected {
                field: path.to_string(),
                handler: handler_name.to_string(),
                message,
            })?;
        Ok(handler.apply(column, value))
    }
}

/// Checks `value` against the operator's shape.
///
/// Strings are split on commas for list and pair operators, so
/// `views[between]=5,10` and `status[in]=a,b` work from query strings.
fn shape_operand(def: &OperatorDef, value: &Value, path: &str) -> FilterResult<Operand> {
    let mismatch = |found: String| FilterError::OperandArityMismatch {
        field: path.to_string(),
        operator: def.key.clone(),
        expected: def.shape().to_string(),
        found,
    };

    match def.shape() {
        ValueShape::None => match value {
            Value::Null | Value::Bool(true) => Ok(Operand::None),
            Value::String(s) if matches!(s.trim(), "" | "1" | "true") => Ok(Operand::None),
            other => Err(mismatch(Operand::describe(other))),
        },
        ValueShape::Scalar => match value {
            Value::Array(_) | Value::Object(_) => Err(mismatch(Operand::describe(value))),
            scalar => Ok(Operand::Scalar(scalar.clone())),
        },
        ValueShape::Array => {
            let items = drop_blank(split_list(value).ok_or_else(|| mismatch(Operand::describe(value)))?);
            if items.is_empty() {
                return Err(mismatch("an empty list".to_string()));
            }
            Ok(Operand::List(items))
        }
        ValueShape::Pair => {
            let items = split_list(value).ok_or_else(|| mismatch(Operand::describe(value)))?;
            match <[Value; 2]>::try_from(items) {
                Ok([low, high]) => Ok(Operand::Pair(low, high)),
                Err(items) => Err(mismatch(format!("{} values", items.len()))),
            }
        }
    }
}

fn split_list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => Some(
            s.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        ),
        Value::Null => Some(Vec::new()),
        Value::Number(_) | Value::Bool(_) => Some(vec![value.clone()]),
        Value::Object(_) => None,
    }
}

/// Drops `null` and empty-string entries.
fn drop_blank(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter(|v| !v.is_null() && v.as_str().is_none_or(|s| !s.is_empty()))
        .collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn day_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn cast_operand(
    value: Value,
    cast: Option<CastType>,
    path: &str,
    key: &str,
) -> FilterResult<Value> {
    cast_optional(value, cast).map_err(|CastFailure { value_type, message }| {
        FilterError::OperandTypeMismatch {
            field: path.to_string(),
            operator: key.to_string(),
            value_type,
            message,
        }
    })
}

fn type_mismatch(path: &str, key: &str, value_type: &str, message: &str) -> FilterError {
    FilterError::OperandTypeMismatch {
        field: path.to_string(),
        operator: key.to_string(),
        value_type: value_type.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::super::test_support::posts_query;
    use super::super::{CustomFilter, CustomFilterRegistry, FixedClock};
    use super::*;
    use crate::config::{EngineConfig, Snapshot};
    use crate::sql::SqlQuery;
    use crate::types::FilterSpec;

    fn run(config: EngineConfig, query: &SqlQuery, input: Value) -> FilterResult<Option<Predicate>> {
        run_with(config, query, &CustomFilterRegistry::new(), input)
    }

    fn run_with(
        config: EngineConfig,
        query: &SqlQuery,
        custom: &CustomFilterRegistry,
        input: Value,
    ) -> FilterResult<Option<Predicate>> {
        let snapshot = Snapshot::build(config).unwrap();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap());
        let spec = FilterSpec::from_value(&input)?;
        FilterEvaluator::new(query, &snapshot, custom, &clock).evaluate(&spec)
    }

    fn eval(input: Value) -> FilterResult<Option<Predicate>> {
        run(EngineConfig::default(), &posts_query(), input)
    }

    #[test]
    fn test_implied_in_equals_explicit_in() {
        let implied = eval(json!({"status": ["a", "b", "c"]})).unwrap();
        let explicit = eval(json!({"status": {"in": ["a", "b", "c"]}})).unwrap();
        assert_eq!(implied, explicit);
    }

    #[test]
    fn test_implied_in_drops_blanks_and_skips_empty() {
        assert_eq!(
            eval(json!({"status": ["a", null, ""]})).unwrap(),
            Some(Predicate::In {
                column: "status".to_string(),
                values: vec![json!("a")],
                negated: false,
            })
        );
        assert_eq!(eval(json!({"status": [null, ""]})).unwrap(), None);
    }

    #[test]
    fn test_explicit_empty_in_is_arity_error() {
        let err = eval(json!({"status": {"in": []}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandArityMismatch { .. }));
    }

    #[test]
    fn test_in_from_comma_string() {
        assert_eq!(
            eval(json!({"status": {"not_in": "a, b"}})).unwrap(),
            Some(Predicate::In {
                column: "status".to_string(),
                values: vec![json!("a"), json!("b")],
                negated: true,
            })
        );
    }

    #[test]
    fn test_dedupe_in_when_configured() {
        let mut config = EngineConfig::default();
        config.operands.dedupe_in = true;
        let predicate = run(config, &posts_query(), json!({"status": ["a", "a", "b"]})).unwrap();
        assert!(matches!(predicate, Some(Predicate::In { ref values, .. }) if values.len() == 2));

        let predicate = eval(json!({"status": ["a", "a", "b"]})).unwrap();
        assert!(matches!(predicate, Some(Predicate::In { ref values, .. }) if values.len() == 3));
    }

    #[test]
    fn test_between_bounds() {
        assert!(eval(json!({"views": {"between": [5, 10]}})).is_ok());

        let err = eval(json!({"views": {"between": [10, 5]}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandTypeMismatch { .. }));

        let err = eval(json!({"views": {"between": [5]}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandArityMismatch { .. }));

        let err = eval(json!({"views": {"between": "10,5"}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandTypeMismatch { .. }));
    }

    #[test]
    fn test_between_casts_string_bounds() {
        assert_eq!(
            eval(json!({"views": {"between": "5,10"}})).unwrap(),
            Some(Predicate::Between {
                column: "views".to_string(),
                low: json!(5),
                high: json!(10),
                negated: false,
            })
        );
    }

    #[test]
    fn test_strict_between_rejects_dates() {
        let input = json!({"published_at": {"between": ["2024-01-01", "2024-02-01"]}});
        assert!(eval(input.clone()).is_ok());

        let mut config = EngineConfig::default();
        config.operands.strict_between = true;
        let err = run(config, &posts_query(), input).unwrap_err();
        assert!(matches!(err, FilterError::OperandTypeMismatch { .. }));
    }

    #[test]
    fn test_cast_failure_is_type_mismatch() {
        let err = eval(json!({"views": {"gt": "many"}})).unwrap_err();
        match err {
            FilterError::OperandTypeMismatch {
                field,
                operator,
                value_type,
                ..
            } => {
                assert_eq!(field, "views");
                assert_eq!(operator, "gt");
                assert_eq!(value_type, "string");
            }
            other => panic!("Expected OperandTypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_null_operators() {
        assert_eq!(
            eval(json!({"deleted_at": {"null": true}})).unwrap(),
            Some(Predicate::Null {
                column: "deleted_at".to_string(),
                negated: false,
            })
        );
        assert_eq!(
            eval(json!({"deleted_at": {"not_null": ""}})).unwrap(),
            Some(Predicate::Null {
                column: "deleted_at".to_string(),
                negated: true,
            })
        );
        let err = eval(json!({"deleted_at": {"null": "yesterday"}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandArityMismatch { .. }));
    }

    #[test]
    fn test_literal_null_is_null_check() {
        assert_eq!(
            eval(json!({"deleted_at": null})).unwrap(),
            Some(Predicate::Null {
                column: "deleted_at".to_string(),
                negated: false,
            })
        );
    }

    #[test]
    fn test_like_wraps_only_without_wildcard() {
        let wrapped = eval(json!({"title": {"like": "rust"}})).unwrap();
        assert!(matches!(wrapped, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "%rust%"));

        let kept = eval(json!({"title": {"like": "rust%"}})).unwrap();
        assert!(matches!(kept, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "rust%"));

        let single = eval(json!({"title": {"like": "a_b"}})).unwrap();
        assert!(matches!(single, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "a_b"));
    }

    #[test]
    fn test_synthesized_patterns_escape_value() {
        let starts = eval(json!({"title": {"starts_with": "50%"}})).unwrap();
        assert!(matches!(starts, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "50\\%%"));

        let ends = eval(json!({"title": {"ends_with": "io"}})).unwrap();
        assert!(matches!(ends, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "%io"));

        let contains = eval(json!({"title": {"contains": "a_b"}})).unwrap();
        assert!(matches!(contains, Some(Predicate::Pattern { ref pattern, .. }) if pattern == "%a\\_b%"));
    }

    #[test]
    fn test_ilike_emulated_without_native_support() {
        let predicate = eval(json!({"title": {"ilike": "Rust"}})).unwrap();
        assert_eq!(
            predicate,
            Some(Predicate::Pattern {
                column: "title".to_string(),
                op: StoreOperator::Like,
                pattern: "%Rust%".to_string(),
                case_insensitive: true,
            })
        );
    }

    #[test]
    fn test_relative_date_today() {
        assert_eq!(
            eval(json!({"created_at": {"today": true}})).unwrap(),
            Some(Predicate::Between {
                column: "created_at".to_string(),
                low: json!("2024-03-13 00:00:00"),
                high: json!("2024-03-13 23:59:59"),
                negated: false,
            })
        );
    }

    #[test]
    fn test_relative_date_day_count() {
        let predicate = eval(json!({"created_at": {"last_x_days": "7"}})).unwrap();
        assert!(matches!(
            predicate,
            Some(Predicate::Between { ref low, .. }) if low == "2024-03-06 00:00:00"
        ));

        let err = eval(json!({"created_at": {"next_x_days": -3}})).unwrap_err();
        assert!(matches!(err, FilterError::OperandTypeMismatch { .. }));
    }

    #[test]
    fn test_operator_map_boolean_or() {
        let predicate = eval(json!({"views": {"lt": 10, "gt": 100, "boolean": "or"}})).unwrap();
        assert!(matches!(
            predicate,
            Some(Predicate::Group { boolean: crate::types::Boolean::Or, ref predicates }) if predicates.len() == 2
        ));
    }

    #[test]
    fn test_unsupported_operator() {
        let err = eval(json!({"title": {"regex": ".*"}})).unwrap_err();
        assert_eq!(
            err,
            FilterError::UnsupportedOperator {
                field: "title".to_string(),
                operator: "regex".to_string(),
            }
        );
    }

    #[test]
    fn test_config_operator_override() {
        let mut config = EngineConfig::default();
        config.operators.insert("is".to_string(), "=".to_string());
        let predicate = run(config, &posts_query(), json!({"status": {"is": "draft"}})).unwrap();
        assert!(matches!(predicate, Some(Predicate::Compare { op: StoreOperator::Eq, .. })));
    }

    struct EvenOnly;

    impl CustomFilter for EvenOnly {
        fn validate(&self, value: &Value) -> Result<(), String> {
            match value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err("must be even".to_string()),
            }
        }

        fn apply(&self, field: &str, value: &Value) -> Predicate {
            Predicate::Compare {
                column: field.to_string(),
                op: StoreOperator::Gte,
                value: value.clone(),
            }
        }
    }

    #[test]
    fn test_custom_filter_routing() {
        let mut config = EngineConfig::default();
        config
            .custom_filters
            .insert("at_least_even".to_string(), "even".to_string());
        let custom = CustomFilterRegistry::new();
        custom.register("even", Arc::new(EvenOnly));

        let predicate = run_with(
            config.clone(),
            &posts_query(),
            &custom,
            json!({"views": {"at_least_even": 4}}),
        )
        .unwrap();
        assert!(matches!(predicate, Some(Predicate::Compare { op: StoreOperator::Gte, .. })));

        let err = run_with(
            config.clone(),
            &posts_query(),
            &custom,
            json!({"views": {"at_least_even": 3}}),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::CustomFilterRejected { .. }));

        let err = run_with(
            config,
            &posts_query(),
            &CustomFilterRegistry::new(),
            json!({"views": {"at_least_even": 4}}),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator { .. }));
    }
}
