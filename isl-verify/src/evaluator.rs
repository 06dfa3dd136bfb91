//! IR evaluator
//!
//! Walks normalized IR against an [`EvaluationContext`]. Evaluation only
//! reads the context, so independent behaviors can be evaluated
//! concurrently.

mod builtins;

use crate::context::{EntityStore, EvaluationContext};
use crate::errors::EvaluationError;
use isl_core::ast::QuantifierKind;
use isl_core::ir::{ArithmeticOp, ComparisonOp, IrKind, IrLiteral, IrNode};
use isl_core::value::{Value, ValueError, ValueMap};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use tracing::trace;

pub type EvalResult<T> = Result<T, EvaluationError>;

/// Evaluate an expression to a value
pub fn evaluate(ir: &IrNode, ctx: &EvaluationContext) -> EvalResult<Value> {
    ConditionEvaluator::new(ctx).evaluate(ir)
}

/// Evaluate an expression that must produce a boolean
pub fn evaluate_condition(ir: &IrNode, ctx: &EvaluationContext) -> EvalResult<bool> {
    ConditionEvaluator::new(ctx).evaluate_condition(ir)
}

fn expect_bool(value: Value, context: &'static str) -> EvalResult<bool> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(EvaluationError::NotBoolean {
            context,
            actual: other.type_name(),
        }),
    }
}

/// Convert a regex literal into pattern syntax with inline flags
fn regex_source(pattern: &str, flags: &str) -> String {
    let inline: String = flags
        .chars()
        .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'U'))
        .collect();
    if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", inline, pattern)
    }
}

/// Evaluates IR for one context
pub struct ConditionEvaluator<'c> {
    ctx: &'c EvaluationContext,
    /// Names bound by quantifiers and array lambdas, innermost last
    scope: Vec<(String, Value)>,
    /// Set while evaluating inside `old(...)`
    in_old: bool,
    regexes: FxHashMap<String, Regex>,
}

impl<'c> ConditionEvaluator<'c> {
    pub fn new(ctx: &'c EvaluationContext) -> Self {
        Self {
            ctx,
            scope: Vec::new(),
            in_old: false,
            regexes: FxHashMap::default(),
        }
    }

    pub fn evaluate_condition(&mut self, ir: &IrNode) -> EvalResult<bool> {
        let value = self.evaluate(ir)?;
        expect_bool(value, "condition")
    }

    /// The state that variable fallback and entity queries read from
    fn store(&self) -> EvalResult<&dyn EntityStore> {
        if self.in_old {
            match self.ctx.old() {
                Some(snapshot) => {
                    let store: &dyn EntityStore = &**snapshot;
                    Ok(store)
                }
                None => Err(EvaluationError::OldNotBound),
            }
        } else {
            Ok(self.ctx.state())
        }
    }

    fn with_binding<T>(
        &mut self,
        name: &str,
        value: Value,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        self.scope.push((name.to_string(), value));
        let out = f(self);
        self.scope.pop();
        out
    }

    pub fn evaluate(&mut self, ir: &IrNode) -> EvalResult<Value> {
        trace!(node = %ir.id, "evaluating");
        match &ir.kind {
            IrKind::Literal { value } => Ok(match value {
                IrLiteral::String(s) => Value::String(s.clone()),
                IrLiteral::Integer(n) => Value::Integer(*n),
                IrLiteral::Float(x) => Value::Float(*x),
                IrLiteral::Boolean(b) => Value::Boolean(*b),
                IrLiteral::Null => Value::Nil,
                IrLiteral::Regex { pattern, flags } => Value::String(regex_source(pattern, flags)),
            }),
            IrKind::Variable { name } => self.variable(name),
            IrKind::PropertyAccess { object, property } => {
                Ok(self.evaluate(object)?.property(property))
            }
            IrKind::InputValue { property } => Ok(self
                .ctx
                .input()
                .get(property)
                .cloned()
                .unwrap_or(Value::Nil)),
            IrKind::ResultValue { property } => {
                let result = self.ctx.result().ok_or(EvaluationError::ResultNotBound)?;
                Ok(match property {
                    Some(p) => result.property(p),
                    None => result.clone(),
                })
            }
            IrKind::Old { inner } => {
                if self.ctx.old().is_none() {
                    return Err(EvaluationError::OldNotBound);
                }
                let saved = std::mem::replace(&mut self.in_old, true);
                let out = self.evaluate(inner);
                self.in_old = saved;
                out
            }
            IrKind::LogicalAnd { operands } => self.junction(operands, false),
            IrKind::LogicalOr { operands } => self.junction(operands, true),
            IrKind::Not { operand } => {
                let value = self.evaluate(operand)?;
                Ok(Value::Boolean(!expect_bool(value, "not")?))
            }
            IrKind::Equality {
                left,
                right,
                negated,
            } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                Ok(Value::Boolean((l == r) != *negated))
            }
            IrKind::Comparison { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                let ord = l.compare(&r)?;
                Ok(Value::Boolean(match op {
                    ComparisonOp::Lt => ord == Ordering::Less,
                    ComparisonOp::Le => ord != Ordering::Greater,
                    ComparisonOp::Gt => ord == Ordering::Greater,
                    ComparisonOp::Ge => ord != Ordering::Less,
                }))
            }
            IrKind::Arithmetic { op, left, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                Ok(arithmetic(*op, &l, &r)?)
            }
            IrKind::Negate { operand } => match self.evaluate(operand)? {
                Value::Integer(n) => n
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or(EvaluationError::Value(ValueError::Overflow("-"))),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(EvaluationError::TypeMismatch {
                    op: "-",
                    actual: other.type_name(),
                }),
            },
            IrKind::Exists { target, expected } => {
                let present = match self.evaluate(target) {
                    Ok(value) => value.is_present(),
                    // A name bound nowhere is absent
                    Err(EvaluationError::UnboundVariable(_)) => false,
                    Err(e) => return Err(e),
                };
                Ok(Value::Boolean(present == *expected))
            }
            IrKind::InSet {
                value,
                set,
                negated,
            } => {
                let value = self.evaluate(value)?;
                let member = match self.evaluate(set)? {
                    Value::List(items) => items.contains(&value),
                    Value::Map(map) => match &value {
                        Value::String(key) => map.contains_key(key),
                        _ => false,
                    },
                    other => {
                        return Err(EvaluationError::TypeMismatch {
                            op: "in",
                            actual: other.type_name(),
                        })
                    }
                };
                Ok(Value::Boolean(member != *negated))
            }
            IrKind::StringIncludes { string, needle } => {
                let (s, n) = self.string_pair(string, needle)?;
                Ok(Value::Boolean(s.contains(n.as_str())))
            }
            IrKind::StringStartsWith { string, prefix } => {
                let (s, p) = self.string_pair(string, prefix)?;
                Ok(Value::Boolean(s.starts_with(p.as_str())))
            }
            IrKind::StringEndsWith { string, suffix } => {
                let (s, p) = self.string_pair(string, suffix)?;
                Ok(Value::Boolean(s.ends_with(p.as_str())))
            }
            IrKind::StringMatches { string, pattern } => {
                let (s, p) = self.string_pair(string, pattern)?;
                let re = self.regex(&p)?;
                Ok(Value::Boolean(re.is_match(&s)))
            }
            IrKind::StringLength { string } => {
                let s = self.evaluate(string)?;
                Ok(Value::Integer(s.as_str()?.chars().count() as i64))
            }
            IrKind::ArrayIncludes { array, element } => {
                let items = self.list(array)?;
                let element = self.evaluate(element)?;
                Ok(Value::Boolean(items.contains(&element)))
            }
            IrKind::ArrayEvery {
                array,
                param,
                predicate,
            } => {
                let items = self.list(array)?;
                for item in items {
                    if !self.predicate(param, item, predicate, "every")? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            IrKind::ArraySome {
                array,
                param,
                predicate,
            } => {
                let items = self.list(array)?;
                for item in items {
                    if self.predicate(param, item, predicate, "some")? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            IrKind::ArrayFilter {
                array,
                param,
                predicate,
            } => {
                let items = self.list(array)?;
                let mut kept = Vec::new();
                for item in items {
                    if self.predicate(param, item.clone(), predicate, "filter")? {
                        kept.push(item);
                    }
                }
                Ok(Value::List(kept))
            }
            IrKind::ArrayMap {
                array,
                param,
                mapper,
            } => {
                let items = self.list(array)?;
                items
                    .into_iter()
                    .map(|item| self.with_binding(param, item, |ev| ev.evaluate(mapper)))
                    .collect::<EvalResult<Vec<_>>>()
                    .map(Value::List)
            }
            IrKind::ArrayLength { array } => Ok(Value::Integer(self.list(array)?.len() as i64)),
            IrKind::Quantifier {
                kind,
                collection,
                bound_var,
                predicate,
            } => self.quantifier(*kind, collection, bound_var, predicate),
            IrKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.evaluate(condition)?;
                if expect_bool(cond, "conditional")? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            IrKind::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.evaluate(a))
                    .collect::<EvalResult<Vec<_>>>()?;
                builtins::call(name, &args)
            }
            IrKind::EntityExists { entity, key } => {
                let key = self.entity_key(key)?;
                let store = self.entity_store(entity)?;
                Ok(Value::Boolean(store.exists(entity, key.as_ref())))
            }
            IrKind::EntityLookup { entity, key } => {
                let key = self.entity_key(key)?;
                let store = self.entity_store(entity)?;
                Ok(store.lookup(entity, key.as_ref()))
            }
            IrKind::EntityCount { entity, key } => {
                let key = self.entity_key(key)?;
                let store = self.entity_store(entity)?;
                Ok(Value::Integer(store.count(entity, key.as_ref()) as i64))
            }
            IrKind::Index { object, index } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                Ok(object.index(&index)?)
            }
            IrKind::List { elements } => elements
                .iter()
                .map(|e| self.evaluate(e))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            IrKind::Map { entries } => entries
                .iter()
                .map(|(k, v)| self.evaluate(v).map(|v| (k.clone(), v)))
                .collect::<EvalResult<ValueMap>>()
                .map(Value::Map),
        }
    }

    /// Resolution order: quantifier/lambda bindings, context variables,
    /// input fields, then state fields (the pre-state inside `old`).
    fn variable(&self, name: &str) -> EvalResult<Value> {
        if let Some((_, value)) = self.scope.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.ctx.variable(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.ctx.input().get(name) {
            return Ok(value.clone());
        }
        self.store()?
            .field(name)
            .ok_or_else(|| EvaluationError::UnboundVariable(name.to_string()))
    }

    /// N-ary and/or, left to right. `dominant` is the value that decides the
    /// chain (false for and, true for or). An operand error is held back and
    /// only reported if no later operand decides the chain.
    fn junction(&mut self, operands: &[IrNode], dominant: bool) -> EvalResult<Value> {
        let context = if dominant { "or" } else { "and" };
        let mut deferred = None;
        for operand in operands {
            match self.evaluate(operand).and_then(|v| expect_bool(v, context)) {
                Ok(b) if b == dominant => return Ok(Value::Boolean(dominant)),
                Ok(_) => {}
                Err(e) => {
                    deferred.get_or_insert(e);
                }
            }
        }
        match deferred {
            Some(e) => Err(e),
            None => Ok(Value::Boolean(!dominant)),
        }
    }

    fn predicate(
        &mut self,
        param: &str,
        item: Value,
        predicate: &IrNode,
        context: &'static str,
    ) -> EvalResult<bool> {
        let value = self.with_binding(param, item, |ev| ev.evaluate(predicate))?;
        expect_bool(value, context)
    }

    fn quantifier(
        &mut self,
        kind: QuantifierKind,
        collection: &IrNode,
        bound_var: &str,
        predicate: &IrNode,
    ) -> EvalResult<Value> {
        let items = self.list(collection)?;
        let context = kind.keyword();
        match kind {
            QuantifierKind::All => {
                for item in items {
                    if !self.predicate(bound_var, item, predicate, context)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            QuantifierKind::Any => {
                for item in items {
                    if self.predicate(bound_var, item, predicate, context)? {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            QuantifierKind::None => {
                for item in items {
                    if self.predicate(bound_var, item, predicate, context)? {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            QuantifierKind::Count => {
                let mut count = 0i64;
                for item in items {
                    if self.predicate(bound_var, item, predicate, context)? {
                        count += 1;
                    }
                }
                Ok(Value::Integer(count))
            }
        }
    }

    fn list(&mut self, node: &IrNode) -> EvalResult<Vec<Value>> {
        match self.evaluate(node)? {
            Value::List(items) => Ok(items),
            other => Err(EvaluationError::TypeMismatch {
                op: "iterate",
                actual: other.type_name(),
            }),
        }
    }

    fn string_pair(&mut self, a: &IrNode, b: &IrNode) -> EvalResult<(String, String)> {
        let a = self.evaluate(a)?;
        let b = self.evaluate(b)?;
        Ok((a.as_str()?.to_string(), b.as_str()?.to_string()))
    }

    fn regex(&mut self, pattern: &str) -> EvalResult<Regex> {
        if let Some(re) = self.regexes.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| EvaluationError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.regexes.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    fn entity_key(&mut self, key: &Option<Box<IrNode>>) -> EvalResult<Option<Value>> {
        key.as_ref().map(|k| self.evaluate(k)).transpose()
    }

    fn entity_store(&self, entity: &str) -> EvalResult<&dyn EntityStore> {
        let store = self.store()?;
        if !store.knows_entity(entity) {
            return Err(EvaluationError::UnknownEntity(entity.to_string()));
        }
        Ok(store)
    }
}

fn arithmetic(op: ArithmeticOp, l: &Value, r: &Value) -> Result<Value, ValueError> {
    let mismatch = || ValueError::IncompatibleOperands {
        op: op.symbol(),
        left: l.type_name(),
        right: r.type_name(),
    };
    match (op, l, r) {
        (ArithmeticOp::Add, Value::String(a), Value::String(b)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (ArithmeticOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (_, Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            let checked = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Sub => a.checked_sub(b),
                ArithmeticOp::Mul => a.checked_mul(b),
                ArithmeticOp::Div | ArithmeticOp::Mod if b == 0 => {
                    return Err(ValueError::DivisionByZero)
                }
                // Inexact integer division yields a float
                ArithmeticOp::Div => match a.checked_rem(b) {
                    Some(0) => a.checked_div(b),
                    Some(_) => return Ok(Value::Float(a as f64 / b as f64)),
                    None => None,
                },
                ArithmeticOp::Mod => a.checked_rem(b),
            };
            checked
                .map(Value::Integer)
                .ok_or(ValueError::Overflow(op.symbol()))
        }
        (_, a, b) if a.is_number() && b.is_number() => {
            let (x, y) = (a.as_number()?, b.as_number()?);
            match op {
                ArithmeticOp::Add => Ok(Value::Float(x + y)),
                ArithmeticOp::Sub => Ok(Value::Float(x - y)),
                ArithmeticOp::Mul => Ok(Value::Float(x * y)),
                ArithmeticOp::Div if y == 0.0 => Err(ValueError::DivisionByZero),
                ArithmeticOp::Div => Ok(Value::Float(x / y)),
                ArithmeticOp::Mod if y == 0.0 => Err(ValueError::DivisionByZero),
                ArithmeticOp::Mod => Ok(Value::Float(x % y)),
            }
        }
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
#[path = "evaluator/evaluator_tests.rs"]
mod tests;
