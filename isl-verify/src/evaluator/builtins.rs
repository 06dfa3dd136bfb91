//! Functions reachable through `Call` nodes
//!
//! Method calls the compiler could not lower to a dedicated node arrive here
//! with the receiver as the first argument.

use crate::errors::EvaluationError;
use isl_core::value::{Value, ValueError};
use std::cmp::Ordering;

type CallResult = Result<Value, EvaluationError>;

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvaluationError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvaluationError::Arity {
            name: name.to_string(),
            expected,
            actual: args.len(),
        })
    }
}

fn mismatch(op: &'static str, value: &Value) -> EvaluationError {
    EvaluationError::TypeMismatch {
        op,
        actual: value.type_name(),
    }
}

pub(super) fn call(name: &str, args: &[Value]) -> CallResult {
    match name {
        "includes" | "contains" => {
            arity(name, args, 2)?;
            match (&args[0], &args[1]) {
                (Value::String(s), Value::String(n)) => Ok(Value::Boolean(s.contains(n.as_str()))),
                (Value::List(items), needle) => Ok(Value::Boolean(items.contains(needle))),
                (Value::Map(map), Value::String(key)) => Ok(Value::Boolean(map.contains_key(key))),
                (other, _) => Err(mismatch("includes", other)),
            }
        }
        "length" | "size" | "len" | "count" => {
            arity(name, args, 1)?;
            match &args[0] {
                Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Integer(items.len() as i64)),
                Value::Map(map) => Ok(Value::Integer(map.len() as i64)),
                other => Err(mismatch("length", other)),
            }
        }
        "isEmpty" | "is_empty" => {
            arity(name, args, 1)?;
            match &args[0] {
                Value::Nil => Ok(Value::Boolean(true)),
                Value::String(s) => Ok(Value::Boolean(s.is_empty())),
                Value::List(items) => Ok(Value::Boolean(items.is_empty())),
                Value::Map(map) => Ok(Value::Boolean(map.is_empty())),
                other => Err(mismatch("isEmpty", other)),
            }
        }
        "startsWith" | "starts_with" => {
            arity(name, args, 2)?;
            let s = args[0].as_str()?;
            Ok(Value::Boolean(s.starts_with(args[1].as_str()?)))
        }
        "endsWith" | "ends_with" => {
            arity(name, args, 2)?;
            let s = args[0].as_str()?;
            Ok(Value::Boolean(s.ends_with(args[1].as_str()?)))
        }
        "lower" | "toLowerCase" => {
            arity(name, args, 1)?;
            Ok(Value::String(args[0].as_str()?.to_lowercase()))
        }
        "upper" | "toUpperCase" => {
            arity(name, args, 1)?;
            Ok(Value::String(args[0].as_str()?.to_uppercase()))
        }
        "trim" => {
            arity(name, args, 1)?;
            Ok(Value::String(args[0].as_str()?.trim().to_string()))
        }
        "abs" => {
            arity(name, args, 1)?;
            match &args[0] {
                Value::Integer(n) => n
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or(EvaluationError::Value(ValueError::Overflow("abs"))),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                other => Err(mismatch("abs", other)),
            }
        }
        "min" | "max" => {
            let items = match args {
                [Value::List(items)] => items.as_slice(),
                _ => args,
            };
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for item in items {
                best = match best {
                    Some(current) if item.compare(current)? != wanted => Some(current),
                    _ => Some(item),
                };
            }
            Ok(best.cloned().unwrap_or(Value::Nil))
        }
        "sum" => {
            arity(name, args, 1)?;
            let items = args[0].as_list()?;
            let mut int_total: i64 = 0;
            let mut float_total: Option<f64> = None;
            for item in items {
                if let (Value::Integer(n), None) = (item, float_total) {
                    int_total = int_total
                        .checked_add(*n)
                        .ok_or(ValueError::Overflow("sum"))?;
                } else {
                    let base = float_total.unwrap_or(int_total as f64);
                    float_total = Some(base + item.as_number()?);
                }
            }
            Ok(float_total.map(Value::Float).unwrap_or(Value::Integer(int_total)))
        }
        "keys" => {
            arity(name, args, 1)?;
            let map = args[0].as_map()?;
            Ok(Value::List(map.keys().cloned().map(Value::String).collect()))
        }
        "values" => {
            arity(name, args, 1)?;
            let map = args[0].as_map()?;
            Ok(Value::List(map.values().cloned().collect()))
        }
        _ => Err(EvaluationError::UnknownFunction(name.to_string())),
    }
}
