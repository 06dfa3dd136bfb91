//! Expression compiler: surface AST to IR
//!
//! Lowering is a single recursive pass over the surface tree. Node ids come
//! from an [`IdGenerator`] created fresh for every call to [`compile`], so
//! compiling the same expression twice yields identical ids.

use crate::context::CompilationContext;
use crate::error::{CompilerError, Result};
use isl_core::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use isl_core::ir::{
    ArithmeticOp, ComparisonOp, IdGenerator, IrBuilder, IrKind, IrLiteral, IrNode,
};
use tracing::trace;

/// Compile one surface expression to (un-normalized) IR.
pub fn compile(expr: &Expr, ctx: &CompilationContext) -> Result<IrNode> {
    let mut ids = IdGenerator::new();
    let node = ExprCompiler::new(&mut ids).compile(expr, ctx)?;
    trace!(nodes = ids.issued(), "compiled expression");
    Ok(node)
}

/// Syntactic shape of a method receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    String,
    Array,
    Unknown,
}

/// Methods that take a single-parameter lambda
#[derive(Debug, Clone, Copy)]
enum LambdaMethod {
    Every,
    Some,
    Filter,
    Map,
}

fn shape_of(expr: &Expr) -> Shape {
    match &expr.kind {
        ExprKind::StringLiteral { .. } => Shape::String,
        ExprKind::List { .. } => Shape::Array,
        ExprKind::Call { callee, .. } => match &callee.kind {
            ExprKind::Member { property, .. } if matches!(property.as_str(), "filter" | "map") => {
                Shape::Array
            }
            _ => Shape::Unknown,
        },
        ExprKind::Conditional {
            then_branch,
            else_branch,
            ..
        } => {
            let then_shape = shape_of(then_branch);
            if then_shape == shape_of(else_branch) {
                then_shape
            } else {
                Shape::Unknown
            }
        }
        _ => Shape::Unknown,
    }
}

fn boxed(expr: &Expr) -> Box<Expr> {
    Box::new(expr.clone())
}

/// Negate a compiled boolean, folding into nodes that carry their own
/// polarity where the rewrite is purely structural.
pub(crate) fn negate(b: &mut IrBuilder<'_>, node: IrNode) -> IrNode {
    let location = node.location.clone();
    match node.kind {
        IrKind::InSet {
            value,
            set,
            negated,
        } => IrNode {
            kind: IrKind::InSet {
                value,
                set,
                negated: !negated,
            },
            ..node
        },
        IrKind::Not { operand } => *operand,
        kind => b.not(IrNode { kind, ..node }).with_location(location),
    }
}

pub struct ExprCompiler<'a> {
    b: IrBuilder<'a>,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(ids: &'a mut IdGenerator) -> Self {
        Self {
            b: IrBuilder::new(ids),
        }
    }

    pub fn compile(&mut self, expr: &Expr, ctx: &CompilationContext) -> Result<IrNode> {
        let node = self.lower(expr, ctx)?;
        Ok(node.with_location(expr.location.clone()))
    }

    fn lower(&mut self, expr: &Expr, ctx: &CompilationContext) -> Result<IrNode> {
        match &expr.kind {
            ExprKind::Identifier { name } => self.identifier(expr, name, ctx),
            ExprKind::StringLiteral { value } => {
                Ok(self.b.literal(IrLiteral::String(value.clone())))
            }
            ExprKind::IntegerLiteral { value } => Ok(self.b.literal(IrLiteral::Integer(*value))),
            ExprKind::FloatLiteral { value } => Ok(self.b.literal(IrLiteral::Float(*value))),
            ExprKind::BooleanLiteral { value } => Ok(self.b.boolean(*value)),
            ExprKind::NullLiteral => Ok(self.b.literal(IrLiteral::Null)),
            ExprKind::RegexLiteral { pattern, flags } => Ok(self.b.literal(IrLiteral::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            })),
            ExprKind::DurationLiteral { value, unit } => {
                let millis = unit.to_millis(*value).ok_or_else(|| {
                    CompilerError::LiteralOverflow { node: boxed(expr) }
                })?;
                Ok(self.b.literal(IrLiteral::Integer(millis)))
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, ctx),
            ExprKind::Unary { op, operand } => self.unary(expr, *op, operand, ctx),
            ExprKind::Member { object, property } => self.member(expr, object, property, ctx),
            ExprKind::Call { callee, args } => self.call(expr, callee, args, ctx),
            ExprKind::Index { object, index } => {
                let object = self.compile(object, ctx)?;
                let index = self.compile(index, ctx)?;
                Ok(self.b.node(IrKind::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                }))
            }
            ExprKind::Quantifier {
                quantifier,
                variable,
                collection,
                predicate,
            } => {
                let collection = self.compile(collection, ctx)?;
                let predicate = self.compile(predicate, &ctx.with_variable(variable.clone()))?;
                Ok(self.b.node(IrKind::Quantifier {
                    kind: *quantifier,
                    collection: Box::new(collection),
                    bound_var: variable.clone(),
                    predicate: Box::new(predicate),
                }))
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.compile(condition, ctx)?;
                let then_branch = self.compile(then_branch, ctx)?;
                let else_branch = self.compile(else_branch, ctx)?;
                Ok(self.b.node(IrKind::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                }))
            }
            ExprKind::Old { expression } => self.old(expr, expression, ctx),
            ExprKind::List { elements } => {
                let elements = elements
                    .iter()
                    .map(|e| self.compile(e, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.b.node(IrKind::List { elements }))
            }
            ExprKind::Map { entries } => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.compile(v, ctx)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.b.node(IrKind::Map { entries }))
            }
            ExprKind::Lambda { .. } | ExprKind::Assign { .. } => {
                Err(CompilerError::Unsupported { node: boxed(expr) })
            }
        }
    }

    fn identifier(&mut self, expr: &Expr, name: &str, ctx: &CompilationContext) -> Result<IrNode> {
        if ctx.is_variable(name) {
            return Ok(self.b.variable(name));
        }
        match name {
            "result" => {
                self.check_result(expr, ctx)?;
                Ok(self.b.node(IrKind::ResultValue { property: None }))
            }
            "input" => Err(CompilerError::BareInput { node: boxed(expr) }),
            _ if ctx.is_entity(name) => Err(CompilerError::EntityAsValue {
                entity: name.to_string(),
                node: boxed(expr),
            }),
            _ => Ok(self.b.variable(name)),
        }
    }

    fn check_result(&self, expr: &Expr, ctx: &CompilationContext) -> Result<()> {
        if !ctx.in_postcondition() {
            return Err(CompilerError::ResultOutsidePostcondition { node: boxed(expr) });
        }
        if ctx.in_old() {
            return Err(CompilerError::ResultInsideOld { node: boxed(expr) });
        }
        Ok(())
    }

    fn old(&mut self, expr: &Expr, inner: &Expr, ctx: &CompilationContext) -> Result<IrNode> {
        if !ctx.in_postcondition() {
            return Err(CompilerError::OldOutsidePostcondition { node: boxed(expr) });
        }
        let inner = self.compile(inner, &ctx.entering_old())?;
        Ok(self.b.node(IrKind::Old {
            inner: Box::new(inner),
        }))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let mut operands = Vec::new();
                for side in [left, right] {
                    let node = self.compile(side, ctx)?;
                    match (op, node.kind) {
                        (BinaryOp::And, IrKind::LogicalAnd { operands: nested })
                        | (BinaryOp::Or, IrKind::LogicalOr { operands: nested }) => {
                            operands.extend(nested)
                        }
                        (_, kind) => operands.push(IrNode { kind, ..node }),
                    }
                }
                Ok(if op == BinaryOp::And {
                    self.b.and(operands)
                } else {
                    self.b.or(operands)
                })
            }
            BinaryOp::Implies => {
                let antecedent = self.compile(left, ctx)?;
                let antecedent = negate(&mut self.b, antecedent);
                let consequent = self.compile(right, ctx)?;
                let mut operands = vec![antecedent];
                match consequent.kind {
                    IrKind::LogicalOr { operands: nested } => operands.extend(nested),
                    kind => operands.push(IrNode {
                        kind,
                        ..consequent
                    }),
                }
                Ok(self.b.or(operands))
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let negated = op == BinaryOp::NotEq;
                let left = self.compile(left, ctx)?;
                let right = self.compile(right, ctx)?;
                // `x == null` means "x does not exist"
                if right.is_null_literal() {
                    return Ok(self.b.exists(left, negated));
                }
                if left.is_null_literal() {
                    return Ok(self.b.exists(right, negated));
                }
                Ok(self.b.equality(left, right, negated))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let cmp = match op {
                    BinaryOp::Lt => ComparisonOp::Lt,
                    BinaryOp::Le => ComparisonOp::Le,
                    BinaryOp::Gt => ComparisonOp::Gt,
                    _ => ComparisonOp::Ge,
                };
                let left = self.compile(left, ctx)?;
                let right = self.compile(right, ctx)?;
                Ok(self.b.comparison(cmp, left, right))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let arith = match op {
                    BinaryOp::Add => ArithmeticOp::Add,
                    BinaryOp::Sub => ArithmeticOp::Sub,
                    BinaryOp::Mul => ArithmeticOp::Mul,
                    BinaryOp::Div => ArithmeticOp::Div,
                    _ => ArithmeticOp::Mod,
                };
                let left = self.compile(left, ctx)?;
                let right = self.compile(right, ctx)?;
                Ok(self.b.arithmetic(arith, left, right))
            }
            BinaryOp::In => {
                let value = self.compile(left, ctx)?;
                let set = self.compile(right, ctx)?;
                Ok(self.b.in_set(value, set, false))
            }
        }
    }

    fn unary(
        &mut self,
        expr: &Expr,
        op: UnaryOp,
        operand: &Expr,
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        match op {
            UnaryOp::Not => {
                let operand = self.compile(operand, ctx)?;
                Ok(negate(&mut self.b, operand))
            }
            UnaryOp::Neg => match &operand.kind {
                ExprKind::IntegerLiteral { value } => {
                    let negated = value
                        .checked_neg()
                        .ok_or_else(|| CompilerError::LiteralOverflow { node: boxed(expr) })?;
                    Ok(self.b.literal(IrLiteral::Integer(negated)))
                }
                ExprKind::FloatLiteral { value } => Ok(self.b.literal(IrLiteral::Float(-value))),
                _ => {
                    let operand = self.compile(operand, ctx)?;
                    Ok(self.b.node(IrKind::Negate {
                        operand: Box::new(operand),
                    }))
                }
            },
        }
    }

    fn member(
        &mut self,
        expr: &Expr,
        object: &Expr,
        property: &str,
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        if let ExprKind::Identifier { name } = &object.kind {
            if !ctx.is_variable(name) {
                match name.as_str() {
                    "input" => {
                        return Ok(self.b.node(IrKind::InputValue {
                            property: property.to_string(),
                        }))
                    }
                    "result" => {
                        self.check_result(object, ctx)?;
                        return Ok(self.b.node(IrKind::ResultValue {
                            property: Some(property.to_string()),
                        }));
                    }
                    entity if ctx.is_entity(entity) => {
                        return match property {
                            "count" => Ok(self.b.node(IrKind::EntityCount {
                                entity: entity.to_string(),
                                key: None,
                            })),
                            _ => Err(CompilerError::EntityAsValue {
                                entity: entity.to_string(),
                                node: boxed(expr),
                            }),
                        };
                    }
                    _ => {}
                }
            }
        }

        let shape = shape_of(object);
        let compiled = self.compile(object, ctx)?;
        Ok(match (shape, property) {
            (Shape::String, "length") => self.b.node(IrKind::StringLength {
                string: Box::new(compiled),
            }),
            (Shape::Array, "length") => self.b.node(IrKind::ArrayLength {
                array: Box::new(compiled),
            }),
            _ => self.b.node(IrKind::PropertyAccess {
                object: Box::new(compiled),
                property: property.to_string(),
            }),
        })
    }

    fn call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        match &callee.kind {
            ExprKind::Member { object, property } => {
                if let ExprKind::Identifier { name } = &object.kind {
                    if ctx.is_entity(name) && !ctx.is_variable(name) {
                        return self.entity_call(expr, name, property, args, ctx);
                    }
                }
                self.method_call(expr, object, property, args, ctx)
            }
            ExprKind::Identifier { name } if name == "old" && args.len() == 1 => {
                self.old(expr, &args[0], ctx)
            }
            ExprKind::Identifier { name } => {
                let args = self.compile_args(args, ctx)?;
                Ok(self.b.call(name.clone(), args))
            }
            _ => Err(CompilerError::Unsupported { node: boxed(expr) }),
        }
    }

    fn compile_args(&mut self, args: &[Expr], ctx: &CompilationContext) -> Result<Vec<IrNode>> {
        args.iter().map(|a| self.compile(a, ctx)).collect()
    }

    fn entity_call(
        &mut self,
        expr: &Expr,
        entity: &str,
        method: &str,
        args: &[Expr],
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        let make: fn(String, Option<Box<IrNode>>) -> IrKind = match method {
            "exists" => |entity, key| IrKind::EntityExists { entity, key },
            "lookup" | "find" | "get" => |entity, key| IrKind::EntityLookup { entity, key },
            "count" => |entity, key| IrKind::EntityCount { entity, key },
            _ => {
                let args = self.compile_args(args, ctx)?;
                return Ok(self.b.call(format!("{}.{}", entity, method), args));
            }
        };
        if args.len() > 1 {
            return Err(CompilerError::Arity {
                method: format!("{}.{}", entity, method),
                expected: 1,
                actual: args.len(),
                node: boxed(expr),
            });
        }
        let key = match args.first() {
            Some(arg) => Some(Box::new(self.compile(arg, ctx)?)),
            None => None,
        };
        Ok(self.b.node(make(entity.to_string(), key)))
    }

    fn method_call(
        &mut self,
        expr: &Expr,
        receiver: &Expr,
        method: &str,
        args: &[Expr],
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        let shape = shape_of(receiver);

        let lambda_method = match method {
            "every" | "all" => Some(LambdaMethod::Every),
            "some" | "any" => Some(LambdaMethod::Some),
            "filter" => Some(LambdaMethod::Filter),
            "map" => Some(LambdaMethod::Map),
            _ => None,
        };
        if let Some(kind) = lambda_method {
            if shape != Shape::String && args.len() == 1 {
                if let ExprKind::Lambda { .. } = args[0].kind {
                    return self.lambda_call(expr, kind, method, receiver, &args[0], ctx);
                }
            }
        }

        let string_pred = match method {
            "startsWith" | "starts_with" => Some(StringPred::StartsWith),
            "endsWith" | "ends_with" => Some(StringPred::EndsWith),
            "matches" => Some(StringPred::Matches),
            "includes" | "contains" if shape == Shape::String => Some(StringPred::Includes),
            "length" if shape == Shape::String => Some(StringPred::Length),
            _ => None,
        };
        if let Some(pred) = string_pred {
            let expected = if matches!(pred, StringPred::Length) { 0 } else { 1 };
            self.check_arity(expr, method, expected, args)?;
            let string = Box::new(self.compile(receiver, ctx)?);
            let arg = match args.first() {
                Some(arg) => Some(Box::new(self.compile(arg, ctx)?)),
                None => None,
            };
            let kind = match (pred, arg) {
                (StringPred::Length, _) => IrKind::StringLength { string },
                (StringPred::Includes, Some(needle)) => IrKind::StringIncludes { string, needle },
                (StringPred::StartsWith, Some(prefix)) => {
                    IrKind::StringStartsWith { string, prefix }
                }
                (StringPred::EndsWith, Some(suffix)) => IrKind::StringEndsWith { string, suffix },
                (StringPred::Matches, Some(pattern)) => IrKind::StringMatches { string, pattern },
                (_, None) => return Err(CompilerError::Unsupported { node: boxed(expr) }),
            };
            return Ok(self.b.node(kind));
        }

        if shape == Shape::Array {
            match method {
                "includes" | "contains" => {
                    self.check_arity(expr, method, 1, args)?;
                    let array = self.compile(receiver, ctx)?;
                    let element = self.compile(&args[0], ctx)?;
                    return Ok(self.b.node(IrKind::ArrayIncludes {
                        array: Box::new(array),
                        element: Box::new(element),
                    }));
                }
                "length" | "count" if args.is_empty() => {
                    let array = self.compile(receiver, ctx)?;
                    return Ok(self.b.node(IrKind::ArrayLength {
                        array: Box::new(array),
                    }));
                }
                _ => {}
            }
        }

        if lambda_method.is_some() && shape != Shape::String {
            return Err(CompilerError::InvalidLambda {
                method: method.to_string(),
                node: boxed(expr),
            });
        }

        // Unknown receiver shape or unrecognised method: the evaluator
        // dispatches on the runtime value.
        let mut compiled = Vec::with_capacity(args.len() + 1);
        compiled.push(self.compile(receiver, ctx)?);
        compiled.extend(self.compile_args(args, ctx)?);
        Ok(self.b.call(method, compiled))
    }

    fn lambda_call(
        &mut self,
        expr: &Expr,
        kind: LambdaMethod,
        method: &str,
        receiver: &Expr,
        lambda: &Expr,
        ctx: &CompilationContext,
    ) -> Result<IrNode> {
        let (param, body) = match &lambda.kind {
            ExprKind::Lambda { params, body } if params.len() == 1 => (params[0].clone(), body),
            _ => {
                return Err(CompilerError::InvalidLambda {
                    method: method.to_string(),
                    node: boxed(expr),
                })
            }
        };
        let array = Box::new(self.compile(receiver, ctx)?);
        let body = Box::new(self.compile(body, &ctx.with_variable(param.clone()))?);
        let kind = match kind {
            LambdaMethod::Every => IrKind::ArrayEvery {
                array,
                param,
                predicate: body,
            },
            LambdaMethod::Some => IrKind::ArraySome {
                array,
                param,
                predicate: body,
            },
            LambdaMethod::Filter => IrKind::ArrayFilter {
                array,
                param,
                predicate: body,
            },
            LambdaMethod::Map => IrKind::ArrayMap {
                array,
                param,
                mapper: body,
            },
        };
        Ok(self.b.node(kind))
    }

    fn check_arity(&self, expr: &Expr, method: &str, expected: usize, args: &[Expr]) -> Result<()> {
        if args.len() != expected {
            return Err(CompilerError::Arity {
                method: method.to_string(),
                expected,
                actual: args.len(),
                node: boxed(expr),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum StringPred {
    Includes,
    StartsWith,
    EndsWith,
    Matches,
    Length,
}

#[cfg(test)]
#[path = "compiler/compiler_tests.rs"]
mod tests;
