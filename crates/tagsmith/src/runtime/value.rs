//! Value semantics for the runtime.
//!
//! Runtime values are plain [`serde_json::Value`]s. This module defines how
//! they print, which of them count as false, and how the arithmetic and
//! comparison operators coerce them.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::RenderError;

/// Formats a value for output. Strings are written raw, null is empty, and
/// arrays and objects are written as JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Human-readable type name for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A numeric operand after coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn from_value(value: &Value) -> Result<Num, RenderError> {
        match value {
            Value::Null => Ok(Num::Int(0)),
            Value::Bool(b) => Ok(Num::Int(i64::from(*b))),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => Num::Int(i),
                None => Num::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Num::Int(i))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Ok(Num::Float(f))
                } else {
                    Err(RenderError::Runtime(format!(
                        "string '{s}' is not a number"
                    )))
                }
            }
            other => Err(RenderError::Runtime(format!(
                "cannot use {} as a number",
                type_name(other)
            ))),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Result<Value, RenderError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| RenderError::Runtime("arithmetic produced a non-finite number".to_string())),
        }
    }
}

/// Arithmetic operators over coerced numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Applies an arithmetic operator. Integer results that overflow fall back to
/// floating point; division stays integral only when it is exact.
pub fn arithmetic(op: Arith, left: &Value, right: &Value) -> Result<Value, RenderError> {
    let (a, b) = (Num::from_value(left)?, Num::from_value(right)?);

    if matches!(op, Arith::Div | Arith::Rem) && b.as_f64() == 0.0 {
        return Err(RenderError::Runtime("division by zero".to_string()));
    }

    let result = match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            let exact = match op {
                Arith::Add => x.checked_add(y),
                Arith::Sub => x.checked_sub(y),
                Arith::Mul => x.checked_mul(y),
                Arith::Div => x.checked_rem(y).filter(|r| *r == 0).and_then(|_| x.checked_div(y)),
                Arith::Rem => x.checked_rem(y),
            };
            exact.map_or_else(|| float_op(op, x as f64, y as f64), Num::Int)
        }
        _ => float_op(op, a.as_f64(), b.as_f64()),
    };
    result.into_value()
}

fn float_op(op: Arith, x: f64, y: f64) -> Num {
    Num::Float(match op {
        Arith::Add => x + y,
        Arith::Sub => x - y,
        Arith::Mul => x * y,
        Arith::Div => x / y,
        Arith::Rem => x % y,
    })
}

pub fn negate(value: &Value) -> Result<Value, RenderError> {
    match Num::from_value(value)? {
        Num::Int(i) => i
            .checked_neg()
            .map_or_else(|| Num::Float(-(i as f64)), Num::Int)
            .into_value(),
        Num::Float(f) => Num::Float(-f).into_value(),
    }
}

/// Equality used by `==` and `!=`. Numbers compare by value, so `1 == 1.0`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (Num::from_value(left), Num::from_value(right)) {
                (Ok(a), Ok(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            }
        }
        _ => left == right,
    }
}

/// Ordering used by `<`, `<=`, `>`, and `>=`. Only numbers against numbers
/// and strings against strings can be ordered.
pub fn compare(left: &Value, right: &Value) -> Result<Ordering, RenderError> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (a, b) = (Num::from_value(left)?, Num::from_value(right)?);
            let ordering = match (a, b) {
                (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
                _ => a.as_f64().partial_cmp(&b.as_f64()),
            };
            ordering.ok_or_else(|| RenderError::Runtime("cannot order NaN".to_string()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(RenderError::Runtime(format!(
            "cannot compare {} with {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

/// The (key, value) pairs a `foreach` visits. Arrays yield their indices,
/// objects their keys in insertion order, and null yields nothing.
pub fn iteration_pairs(value: &Value) -> Result<Vec<(Value, Value)>, RenderError> {
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(index, item)| (Value::from(index), item.clone()))
            .collect()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, item)| (Value::String(key.clone()), item.clone()))
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(RenderError::Runtime(format!(
            "cannot iterate over {}",
            type_name(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!("a<b")), "a<b");
        assert_eq!(format_value(&json!(null)), "");
        assert_eq!(format_value(&json!(true)), "true");
        assert_eq!(format_value(&json!(3)), "3");
        assert_eq!(format_value(&json!(1.5)), "1.5");
        assert_eq!(format_value(&json!([1, "x"])), r#"[1,"x"]"#);
        assert_eq!(format_value(&json!({"b": 1, "a": 2})), r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be false");
        }
        for truthy in [json!(true), json!(-1), json!("0"), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&truthy), "{truthy} should be true");
        }
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(arithmetic(Arith::Add, &json!(2), &json!(3)).unwrap(), json!(5));
        assert_eq!(arithmetic(Arith::Div, &json!(6), &json!(3)).unwrap(), json!(2));
        assert_eq!(arithmetic(Arith::Div, &json!(7), &json!(2)).unwrap(), json!(3.5));
        assert_eq!(arithmetic(Arith::Rem, &json!(7), &json!(4)).unwrap(), json!(3));
    }

    #[test]
    fn test_overflow_falls_back_to_float() {
        let result = arithmetic(Arith::Add, &json!(i64::MAX), &json!(1)).unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn test_coercions() {
        assert_eq!(arithmetic(Arith::Add, &json!(" 4 "), &json!(true)).unwrap(), json!(5));
        assert_eq!(arithmetic(Arith::Mul, &json!(null), &json!(9)).unwrap(), json!(0));
        assert!(arithmetic(Arith::Add, &json!("four"), &json!(1)).is_err());
        assert!(arithmetic(Arith::Add, &json!([1]), &json!(1)).is_err());
    }

    #[test]
    fn test_division_by_zero() {
        let err = arithmetic(Arith::Div, &json!(1), &json!(0)).unwrap_err();
        assert!(matches!(err, RenderError::Runtime(msg) if msg.contains("zero")));
        assert!(arithmetic(Arith::Rem, &json!(1.5), &json!(0.0)).is_err());
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate(&json!(3)).unwrap(), json!(-3));
        assert_eq!(negate(&json!("2.5")).unwrap(), json!(-2.5));
    }

    #[test]
    fn test_loose_equality() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(loose_eq(&json!("2"), &json!(2)));
        assert!(!loose_eq(&json!("two"), &json!(2)));
        assert!(loose_eq(&json!("a"), &json!("a")));
        assert!(!loose_eq(&json!(null), &json!(false)));
        assert!(loose_eq(&json!([1, 2]), &json!([1, 2])));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&json!(1), &json!(2.5)).unwrap(), Ordering::Less);
        assert_eq!(compare(&json!("b"), &json!("a")).unwrap(), Ordering::Greater);
        assert!(compare(&json!("1"), &json!(2)).is_err());
        assert!(compare(&json!(null), &json!(null)).is_err());
    }

    #[test]
    fn test_iteration_pairs() {
        let pairs = iteration_pairs(&json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(pairs, vec![(json!("a"), json!(1)), (json!("b"), json!(2))]);

        let pairs = iteration_pairs(&json!(["x"])).unwrap();
        assert_eq!(pairs, vec![(json!(0), json!("x"))]);

        assert!(iteration_pairs(&json!(null)).unwrap().is_empty());
        assert!(iteration_pairs(&json!("abc")).is_err());
    }
}
