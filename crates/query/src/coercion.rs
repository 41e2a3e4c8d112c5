//! Value coercion.
//!
//! Casts raw operand values to the type a field's cast rule names before
//! they are bound. `null` is never cast. Boolean parsing is lenient: the
//! strings `true`, `1`, `yes`, `on` and `y` (any case) and non-zero numbers
//! are true, everything else is false.

use serde_json::{Number, Value};

use crate::types::CastType;

/// Reasons a value could not be cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastFailure {
    /// Description of the input value's type.
    pub value_type: String,
    /// What went wrong.
    pub message: String,
}

/// Casts a value according to an optional rule.
///
/// Without a rule the value is returned unchanged.
pub fn cast_optional(value: Value, cast: Option<CastType>) -> Result<Value, CastFailure> {
    match cast {
        Some(cast) => cast_value(value, cast),
        None => Ok(value),
    }
}

/// Casts a single value.
pub fn cast_value(value: Value, cast: CastType) -> Result<Value, CastFailure> {
    if value.is_null() {
        return Ok(value);
    }

    match cast {
        CastType::Int => to_int(value),
        CastType::Float => to_float(value),
        CastType::String => Ok(to_string(value)),
        CastType::Bool => Ok(Value::Bool(to_bool(&value))),
        CastType::Array | CastType::Json => Ok(to_json(value)),
        CastType::Date | CastType::Datetime => Ok(to_timestamp(value)),
    }
}

fn to_int(value: Value) -> Result<Value, CastFailure> {
    match &value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
        Value::Number(n) => n
            .as_f64()
            .and_then(truncate_to_i64)
            .map(Value::from)
            .ok_or_else(|| failure(&value, "not an integer in range")),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::from(i));
            }
            match trimmed.parse::<f64>() {
                Ok(f) => truncate_to_i64(f)
                    .map(Value::from)
                    .ok_or_else(|| failure(&value, "not an integer in range")),
                Err(_) => Err(failure(&value, "not an integer")),
            }
        }
        _ => Err(failure(&value, "not an integer")),
    }
}

fn to_float(value: Value) -> Result<Value, CastFailure> {
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| failure(&value, "not a number"))
}

fn to_string(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Lenient boolean parse.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on" | "y"
        ),
        _ => false,
    }
}

/// Strings are parsed as JSON; unparseable strings are returned unchanged.
fn to_json(value: Value) -> Value {
    match &value {
        Value::String(s) => serde_json::from_str(s).unwrap_or(value),
        _ => value,
    }
}

/// Numeric timestamps become integers; anything else passes through.
fn to_timestamp(value: Value) -> Value {
    match &value {
        Value::Number(n) if n.is_i64() => value,
        Value::Number(n) => n
            .as_f64()
            .and_then(truncate_to_i64)
            .map(Value::from)
            .unwrap_or(value),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(value),
        _ => value,
    }
}

/// Truncates toward zero; `None` for non-finite or out-of-range values.
fn truncate_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let t = f.trunc();
    (t.is_finite() && t >= -LIMIT && t < LIMIT).then_some(t as i64)
}

fn failure(value: &Value, message: &str) -> CastFailure {
    CastFailure {
        value_type: crate::types::Operand::describe(value),
        message: message.to_string(),
    }
}
