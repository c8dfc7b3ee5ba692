//! Expression evaluation and built-in functions.

use serde_json::Value;

use super::parser::{BinaryOp, Expr};
use super::value::{self, Num};
use super::Scope;
use crate::error::RenderError;

/// Replaces `&`, then `<`, then `>` with their HTML entities.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, RenderError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(name) => Ok(scope.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Member(target, member) => {
            let target = evaluate(target, scope)?;
            Ok(member_of(&target, member))
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            Ok(index_of(&target, &index))
        }
        Expr::Not(inner) => Ok(Value::Bool(!value::is_truthy(&evaluate(inner, scope)?))),
        Expr::Neg(inner) => value::negate(&evaluate(inner, scope)?),
        Expr::Binary(op, left, right) => binary(*op, left, right, scope),
        Expr::Ternary(condition, then, otherwise) => {
            if value::is_truthy(&evaluate(condition, scope)?) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<Value, RenderError> {
    let left = evaluate(left, scope)?;
    // Deferred so `||` and `&&` can short-circuit.
    let right = || evaluate(right, scope);

    let result = match op {
        BinaryOp::Or => Value::Bool(value::is_truthy(&left) || value::is_truthy(&right()?)),
        BinaryOp::And => Value::Bool(value::is_truthy(&left) && value::is_truthy(&right()?)),
        BinaryOp::Eq => Value::Bool(value::loose_eq(&left, &right()?)),
        BinaryOp::Ne => Value::Bool(!value::loose_eq(&left, &right()?)),
        BinaryOp::Lt => Value::Bool(value::compare(&left, &right()?)?.is_lt()),
        BinaryOp::Le => Value::Bool(value::compare(&left, &right()?)?.is_le()),
        BinaryOp::Gt => Value::Bool(value::compare(&left, &right()?)?.is_gt()),
        BinaryOp::Ge => Value::Bool(value::compare(&left, &right()?)?.is_ge()),
        BinaryOp::Concat => {
            Value::String(value::format_value(&left) + &value::format_value(&right()?))
        }
        BinaryOp::Arith(arith) => value::arithmetic(arith, &left, &right()?)?,
    };
    Ok(result)
}

fn member_of(target: &Value, member: &str) -> Value {
    match target {
        Value::Object(map) => map.get(member).cloned().unwrap_or(Value::Null),
        Value::Array(items) => member
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index_of(target: &Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Object(_), Value::String(key)) => member_of(target, key),
        (Value::Object(_), Value::Number(n)) => member_of(target, &n.to_string()),
        (Value::Array(items), _) => match Num::from_value(index) {
            Ok(Num::Int(i)) => usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RenderError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("{min}")
    } else {
        format!("{min} to {max}")
    };
    Err(RenderError::Runtime(format!(
        "{name}() expects {expected} argument(s), got {}",
        args.len()
    )))
}

/// Calls a built-in function.
pub fn call(name: &str, args: Vec<Value>) -> Result<Value, RenderError> {
    match name {
        "escape" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(escape_html(&value::format_value(&args[0]))))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let count = match &args[0] {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                Value::Null => 0,
                other => {
                    return Err(RenderError::Runtime(format!(
                        "count() cannot measure {}",
                        value::type_name(other)
                    )))
                }
            };
            Ok(Value::from(count))
        }
        "upper" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(value::format_value(&args[0]).to_uppercase()))
        }
        "lower" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(value::format_value(&args[0]).to_lowercase()))
        }
        "trim" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(value::format_value(&args[0]).trim().to_string()))
        }
        "join" => {
            arity(name, &args, 1, 2)?;
            let separator = args.get(1).map(value::format_value).unwrap_or_default();
            let parts: Vec<String> = match &args[0] {
                Value::Array(items) => items.iter().map(value::format_value).collect(),
                Value::Object(map) => map.values().map(value::format_value).collect(),
                Value::Null => Vec::new(),
                other => vec![value::format_value(other)],
            };
            Ok(Value::String(parts.join(&separator)))
        }
        "json" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(serde_json::to_string(&args[0])?))
        }
        "default" => {
            arity(name, &args, 2, 2)?;
            let mut args = args.into_iter();
            Ok(match (args.next(), args.next()) {
                (Some(first), _) if value::is_truthy(&first) => first,
                (_, Some(fallback)) => fallback,
                _ => Value::Null,
            })
        }
        _ => Err(RenderError::UnknownFunction(name.to_string())),
    }
}
