//! Human-readable rendering of IR
//!
//! The rendering is also the canonical key used by the normalizer to order
//! operands and by [`crate::hash::contract_hash`], so it must be a pure
//! function of node structure.

use isl_core::ir::{IrKind, IrLiteral, IrNode};
use std::fmt::Write;

pub fn render(node: &IrNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node);
    out
}

fn write_list(out: &mut String, nodes: &[IrNode], sep: &str) {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        write_node(out, node);
    }
}

fn write_literal(out: &mut String, literal: &IrLiteral) {
    let _ = match literal {
        IrLiteral::String(s) => write!(out, "{:?}", s),
        IrLiteral::Integer(n) => write!(out, "{}", n),
        IrLiteral::Float(x) => write!(out, "{:?}", x),
        IrLiteral::Boolean(b) => write!(out, "{}", b),
        IrLiteral::Null => write!(out, "null"),
        IrLiteral::Regex { pattern, flags } => write!(out, "/{}/{}", pattern, flags),
    };
}

fn is_atomic(node: &IrNode) -> bool {
    matches!(
        node.kind,
        IrKind::Literal { .. }
            | IrKind::Variable { .. }
            | IrKind::PropertyAccess { .. }
            | IrKind::InputValue { .. }
            | IrKind::ResultValue { .. }
            | IrKind::Old { .. }
            | IrKind::LogicalAnd { .. }
            | IrKind::LogicalOr { .. }
            | IrKind::Call { .. }
            | IrKind::Index { .. }
            | IrKind::List { .. }
            | IrKind::Map { .. }
            | IrKind::Arithmetic { .. }
    )
}

fn write_operand(out: &mut String, node: &IrNode) {
    if is_atomic(node) {
        write_node(out, node);
    } else {
        out.push('(');
        write_node(out, node);
        out.push(')');
    }
}

fn write_lambda(out: &mut String, array: &IrNode, method: &str, param: &str, body: &IrNode) {
    write_operand(out, array);
    let _ = write!(out, ".{}({} => ", method, param);
    write_node(out, body);
    out.push(')');
}

fn write_entity(out: &mut String, entity: &str, method: &str, key: &Option<Box<IrNode>>) {
    let _ = write!(out, "{}.{}(", entity, method);
    if let Some(key) = key {
        write_node(out, key);
    }
    out.push(')');
}

fn write_node(out: &mut String, node: &IrNode) {
    match &node.kind {
        IrKind::Literal { value } => write_literal(out, value),
        IrKind::Variable { name } => out.push_str(name),
        IrKind::PropertyAccess { object, property } => {
            write_operand(out, object);
            let _ = write!(out, ".{}", property);
        }
        IrKind::InputValue { property } => {
            let _ = write!(out, "input.{}", property);
        }
        IrKind::ResultValue { property: None } => out.push_str("result"),
        IrKind::ResultValue {
            property: Some(property),
        } => {
            let _ = write!(out, "result.{}", property);
        }
        IrKind::Old { inner } => {
            out.push_str("old(");
            write_node(out, inner);
            out.push(')');
        }
        IrKind::LogicalAnd { operands } => {
            out.push('(');
            write_list(out, operands, " and ");
            out.push(')');
        }
        IrKind::LogicalOr { operands } => {
            out.push('(');
            write_list(out, operands, " or ");
            out.push(')');
        }
        IrKind::Not { operand } => {
            out.push_str("not ");
            write_operand(out, operand);
        }
        IrKind::Equality {
            left,
            right,
            negated,
        } => {
            write_operand(out, left);
            out.push_str(if *negated { " != " } else { " == " });
            write_operand(out, right);
        }
        IrKind::Comparison { op, left, right } => {
            write_operand(out, left);
            let _ = write!(out, " {} ", op.symbol());
            write_operand(out, right);
        }
        IrKind::Arithmetic { op, left, right } => {
            out.push('(');
            write_operand(out, left);
            let _ = write!(out, " {} ", op.symbol());
            write_operand(out, right);
            out.push(')');
        }
        IrKind::Negate { operand } => {
            out.push('-');
            write_operand(out, operand);
        }
        IrKind::Exists { target, expected } => {
            if !expected {
                out.push_str("not ");
            }
            out.push_str("exists(");
            write_node(out, target);
            out.push(')');
        }
        IrKind::InSet {
            value,
            set,
            negated,
        } => {
            write_operand(out, value);
            out.push_str(if *negated { " not in " } else { " in " });
            write_operand(out, set);
        }
        IrKind::StringIncludes { string, needle } => {
            write_operand(out, string);
            out.push_str(".includes(");
            write_node(out, needle);
            out.push(')');
        }
        IrKind::StringStartsWith { string, prefix } => {
            write_operand(out, string);
            out.push_str(".startsWith(");
            write_node(out, prefix);
            out.push(')');
        }
        IrKind::StringEndsWith { string, suffix } => {
            write_operand(out, string);
            out.push_str(".endsWith(");
            write_node(out, suffix);
            out.push(')');
        }
        IrKind::StringMatches { string, pattern } => {
            write_operand(out, string);
            out.push_str(".matches(");
            write_node(out, pattern);
            out.push(')');
        }
        IrKind::StringLength { string } => {
            write_operand(out, string);
            out.push_str(".length");
        }
        IrKind::ArrayIncludes { array, element } => {
            write_operand(out, array);
            out.push_str(".includes(");
            write_node(out, element);
            out.push(')');
        }
        IrKind::ArrayEvery {
            array,
            param,
            predicate,
        } => write_lambda(out, array, "every", param, predicate),
        IrKind::ArraySome {
            array,
            param,
            predicate,
        } => write_lambda(out, array, "some", param, predicate),
        IrKind::ArrayFilter {
            array,
            param,
            predicate,
        } => write_lambda(out, array, "filter", param, predicate),
        IrKind::ArrayMap {
            array,
            param,
            mapper,
        } => write_lambda(out, array, "map", param, mapper),
        IrKind::ArrayLength { array } => {
            write_operand(out, array);
            out.push_str(".length");
        }
        IrKind::Quantifier {
            kind,
            collection,
            bound_var,
            predicate,
        } => {
            let _ = write!(out, "{}({} in ", kind.keyword(), bound_var);
            write_node(out, collection);
            out.push_str(", ");
            write_node(out, predicate);
            out.push(')');
        }
        IrKind::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push_str("(if ");
            write_node(out, condition);
            out.push_str(" then ");
            write_node(out, then_branch);
            out.push_str(" else ");
            write_node(out, else_branch);
            out.push(')');
        }
        IrKind::Call { name, args } => {
            let _ = write!(out, "{}(", name);
            write_list(out, args, ", ");
            out.push(')');
        }
        IrKind::EntityExists { entity, key } => write_entity(out, entity, "exists", key),
        IrKind::EntityLookup { entity, key } => write_entity(out, entity, "lookup", key),
        IrKind::EntityCount { entity, key } => write_entity(out, entity, "count", key),
        IrKind::Index { object, index } => {
            write_operand(out, object);
            out.push('[');
            write_node(out, index);
            out.push(']');
        }
        IrKind::List { elements } => {
            out.push('[');
            write_list(out, elements, ", ");
            out.push(']');
        }
        IrKind::Map { entries } => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{:?}: ", key);
                write_node(out, value);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::context::CompilationContext;
    use isl_core::ast::{BinaryOp, Expr};

    fn rendered(expr: &Expr) -> String {
        let ctx = CompilationContext::new(["Account"]).for_postcondition();
        render(&compile(expr, &ctx).unwrap())
    }

    #[test]
    fn test_render_postcondition() {
        let expr = Expr::eq(
            Expr::member(Expr::ident("result"), "balance"),
            Expr::binary(
                BinaryOp::Sub,
                Expr::old(Expr::ident("balance")),
                Expr::member(Expr::ident("input"), "amount"),
            ),
        );
        assert_eq!(
            rendered(&expr),
            "result.balance == (old(balance) - input.amount)"
        );
    }

    #[test]
    fn test_render_distinguishes_literal_kinds() {
        assert_eq!(rendered(&Expr::string("1")), "\"1\"");
        assert_eq!(rendered(&Expr::int(1)), "1");
        assert_eq!(rendered(&Expr::float(1.0)), "1.0");
    }

    #[test]
    fn test_render_entities_and_sets() {
        let expr = Expr::and(
            Expr::method(Expr::ident("Account"), "exists", vec![Expr::ident("id")]),
            Expr::not(Expr::binary(
                BinaryOp::In,
                Expr::ident("status"),
                Expr::list(vec![Expr::string("closed")]),
            )),
        );
        assert_eq!(
            rendered(&expr),
            "(Account.exists(id) and status not in [\"closed\"])"
        );
    }
}
