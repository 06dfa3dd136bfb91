use super::*;
use crate::state::CapturedState;
use isl_compiler::{CompilationContext, Compiler};
use isl_core::ast::{BinaryOp, Expr};
use std::sync::Arc;

fn compile(expr: &Expr) -> IrNode {
    let ctx = CompilationContext::new(["Account"]).for_postcondition();
    Compiler::new().compile_expr(expr, &ctx).unwrap()
}

fn accounts() -> CapturedState {
    CapturedState::new()
        .with_record(
            "Account",
            "a1",
            Value::record([("id", "a1".into()), ("balance", Value::Integer(100))]),
        )
        .with_record(
            "Account",
            "a2",
            Value::record([("id", "a2".into()), ("balance", Value::Integer(5))]),
        )
}

fn input(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn eval(expr: &Expr, ctx: &EvaluationContext) -> EvalResult<Value> {
    evaluate(&compile(expr), ctx)
}

#[test]
fn test_balance_postcondition() {
    // result.balance == old(balance) - input.amount
    let expr = Expr::eq(
        Expr::member(Expr::ident("result"), "balance"),
        Expr::binary(
            BinaryOp::Sub,
            Expr::old(Expr::ident("balance")),
            Expr::member(Expr::ident("input"), "amount"),
        ),
    );
    let before = Arc::new(CapturedState::new().with_field("balance", Value::Integer(100)));
    let ctx = EvaluationContext::empty()
        .with_input(input(&[("amount", Value::Integer(30))]))
        .with_old(before);

    let good = ctx
        .clone()
        .with_result(Value::record([("balance", Value::Integer(70))]));
    assert_eq!(eval(&expr, &good), Ok(Value::Boolean(true)));

    let bad = ctx.with_result(Value::record([("balance", Value::Integer(100))]));
    assert_eq!(eval(&expr, &bad), Ok(Value::Boolean(false)));
}

#[test]
fn test_old_without_snapshot_fails() {
    let expr = Expr::old(Expr::ident("balance"));
    assert_eq!(
        eval(&expr, &EvaluationContext::empty()),
        Err(EvaluationError::OldNotBound)
    );
}

#[test]
fn test_result_without_binding_fails() {
    let expr = Expr::eq(Expr::ident("result"), Expr::int(1));
    assert_eq!(
        eval(&expr, &EvaluationContext::empty()),
        Err(EvaluationError::ResultNotBound)
    );
}

#[test]
fn test_missing_input_field_is_nil() {
    let expr = Expr::member(Expr::ident("input"), "nickname");
    assert_eq!(eval(&expr, &EvaluationContext::empty()), Ok(Value::Nil));
}

#[test]
fn test_exists_checks() {
    let ctx = EvaluationContext::empty().with_input(input(&[
        ("email", "".into()),
        ("count", Value::Integer(0)),
        ("flag", Value::Boolean(false)),
        ("gone", Value::Nil),
    ]));
    for field in ["email", "count", "flag"] {
        let expr = Expr::binary(
            BinaryOp::NotEq,
            Expr::member(Expr::ident("input"), field),
            Expr::null(),
        );
        assert_eq!(eval(&expr, &ctx), Ok(Value::Boolean(true)), "{}", field);
    }
    let gone = Expr::binary(
        BinaryOp::Eq,
        Expr::member(Expr::ident("input"), "gone"),
        Expr::null(),
    );
    assert_eq!(eval(&gone, &ctx), Ok(Value::Boolean(true)));

    let unbound = Expr::binary(BinaryOp::Eq, Expr::ident("nowhere"), Expr::null());
    assert_eq!(eval(&unbound, &ctx), Ok(Value::Boolean(true)));
}

#[test]
fn test_quantifiers_on_empty_collections() {
    let empty = Expr::list(vec![]);
    let pred = Expr::binary(BinaryOp::Gt, Expr::ident("x"), Expr::int(0));
    let ctx = EvaluationContext::empty();
    let expected = [
        (QuantifierKind::All, Value::Boolean(true)),
        (QuantifierKind::Any, Value::Boolean(false)),
        (QuantifierKind::None, Value::Boolean(true)),
        (QuantifierKind::Count, Value::Integer(0)),
    ];
    for (kind, value) in expected {
        let expr = Expr::quantifier(kind, "x", empty.clone(), pred.clone());
        assert_eq!(eval(&expr, &ctx), Ok(value), "{:?}", kind);
    }
}

#[test]
fn test_quantifier_binds_variable() {
    let items = Expr::list(vec![Expr::int(1), Expr::int(5), Expr::int(7)]);
    let pred = Expr::binary(BinaryOp::Gt, Expr::ident("x"), Expr::int(3));
    let ctx = EvaluationContext::empty();
    let count = Expr::quantifier(QuantifierKind::Count, "x", items.clone(), pred.clone());
    assert_eq!(eval(&count, &ctx), Ok(Value::Integer(2)));
    let all = Expr::quantifier(QuantifierKind::All, "x", items, pred);
    assert_eq!(eval(&all, &ctx), Ok(Value::Boolean(false)));
}

#[test]
fn test_junction_tolerates_errors_when_decided() {
    // `x` is unbound: an error on its own, but a false operand decides an and
    let decided = Expr::and(
        Expr::binary(BinaryOp::Gt, Expr::ident("x"), Expr::int(1)),
        Expr::boolean(false),
    );
    let ctx = EvaluationContext::empty();
    assert_eq!(eval(&decided, &ctx), Ok(Value::Boolean(false)));

    let undecided = Expr::and(
        Expr::binary(BinaryOp::Gt, Expr::ident("x"), Expr::int(1)),
        Expr::ident("flag"),
    );
    let ctx = ctx.with_variable("flag", Value::Boolean(true));
    assert_eq!(
        eval(&undecided, &ctx),
        Err(EvaluationError::UnboundVariable("x".into()))
    );
}

#[test]
fn test_entity_queries() {
    let ctx = EvaluationContext::empty().with_state(Arc::new(accounts()));
    let exists = Expr::method(Expr::ident("Account"), "exists", vec![Expr::string("a1")]);
    assert_eq!(eval(&exists, &ctx), Ok(Value::Boolean(true)));

    let missing = Expr::method(Expr::ident("Account"), "exists", vec![Expr::string("zz")]);
    assert_eq!(eval(&missing, &ctx), Ok(Value::Boolean(false)));

    let count = Expr::member(Expr::ident("Account"), "count");
    assert_eq!(eval(&count, &ctx), Ok(Value::Integer(2)));

    let balance = Expr::member(
        Expr::method(Expr::ident("Account"), "lookup", vec![Expr::string("a2")]),
        "balance",
    );
    assert_eq!(eval(&balance, &ctx), Ok(Value::Integer(5)));
}

#[test]
fn test_unknown_entity() {
    let exists = Expr::method(Expr::ident("Account"), "exists", vec![Expr::string("a1")]);
    assert_eq!(
        eval(&exists, &EvaluationContext::empty()),
        Err(EvaluationError::UnknownEntity("Account".into()))
    );
}

#[test]
fn test_old_reads_snapshot_entities() {
    let before = Arc::new(accounts());
    let after = accounts().with_record("Account", "a3", Value::record([("id", "a3".into())]));
    let ctx = EvaluationContext::empty()
        .with_old(before)
        .with_state(Arc::new(after));
    // Account.count == old(Account.count) + 1
    let expr = Expr::eq(
        Expr::member(Expr::ident("Account"), "count"),
        Expr::binary(
            BinaryOp::Add,
            Expr::old(Expr::member(Expr::ident("Account"), "count")),
            Expr::int(1),
        ),
    );
    assert_eq!(eval(&expr, &ctx), Ok(Value::Boolean(true)));
}

#[test]
fn test_string_predicates() {
    let ctx = EvaluationContext::empty().with_input(input(&[("email", "ann@example.com".into())]));
    let email = || Expr::member(Expr::ident("input"), "email");
    let cases = [
        Expr::method(email(), "includes", vec![Expr::string("@")]),
        Expr::method(email(), "endsWith", vec![Expr::string(".com")]),
        Expr::method(email(), "startsWith", vec![Expr::string("ann")]),
        Expr::method(email(), "matches", vec![Expr::regex("^[a-z]+@", "")]),
    ];
    for expr in &cases {
        assert_eq!(eval(expr, &ctx), Ok(Value::Boolean(true)));
    }
}

#[test]
fn test_regex_flags_and_errors() {
    let ctx = EvaluationContext::empty().with_input(input(&[("code", "ABC".into())]));
    let code = || Expr::member(Expr::ident("input"), "code");
    let insensitive = Expr::method(code(), "matches", vec![Expr::regex("^abc$", "i")]);
    assert_eq!(eval(&insensitive, &ctx), Ok(Value::Boolean(true)));

    let broken = Expr::method(code(), "matches", vec![Expr::regex("(", "")]);
    assert!(matches!(
        eval(&broken, &ctx),
        Err(EvaluationError::InvalidRegex { .. })
    ));
}

#[test]
fn test_array_lambdas() {
    let items = Expr::list(vec![Expr::int(1), Expr::int(2), Expr::int(3)]);
    let ctx = EvaluationContext::empty();
    let doubled = Expr::method(
        items.clone(),
        "map",
        vec![Expr::lambda(
            "n",
            Expr::binary(BinaryOp::Mul, Expr::ident("n"), Expr::int(2)),
        )],
    );
    assert_eq!(
        eval(&doubled, &ctx),
        Ok(Value::List(vec![
            Value::Integer(2),
            Value::Integer(4),
            Value::Integer(6)
        ]))
    );
    let odd = Expr::method(
        items,
        "filter",
        vec![Expr::lambda(
            "n",
            Expr::eq(
                Expr::binary(BinaryOp::Mod, Expr::ident("n"), Expr::int(2)),
                Expr::int(1),
            ),
        )],
    );
    assert_eq!(eval(&Expr::member(odd, "length"), &ctx), Ok(Value::Integer(2)));
}

#[test]
fn test_in_set() {
    let ctx = EvaluationContext::empty().with_input(input(&[("status", "active".into())]));
    let expr = Expr::binary(
        BinaryOp::In,
        Expr::member(Expr::ident("input"), "status"),
        Expr::list(vec![Expr::string("active"), Expr::string("pending")]),
    );
    assert_eq!(eval(&expr, &ctx), Ok(Value::Boolean(true)));
    assert_eq!(eval(&Expr::not(expr), &ctx), Ok(Value::Boolean(false)));
}

#[test]
fn test_arithmetic() {
    let ctx = EvaluationContext::empty();
    let div = |a, b| Expr::binary(BinaryOp::Div, Expr::int(a), Expr::int(b));
    assert_eq!(eval(&div(6, 3), &ctx), Ok(Value::Integer(2)));
    assert_eq!(eval(&div(7, 2), &ctx), Ok(Value::Float(3.5)));
    assert_eq!(
        eval(&div(1, 0), &ctx),
        Err(EvaluationError::Value(ValueError::DivisionByZero))
    );
    let overflow = Expr::binary(BinaryOp::Add, Expr::int(i64::MAX), Expr::int(1));
    assert!(matches!(
        eval(&overflow, &ctx),
        Err(EvaluationError::Value(ValueError::Overflow(_)))
    ));
}

#[test]
fn test_min_divided_by_minus_one_overflows() {
    let ctx = EvaluationContext::empty().with_input(input(&[
        ("a", Value::Integer(i64::MIN)),
        ("b", Value::Integer(-1)),
    ]));
    let operand = |name| Expr::member(Expr::ident("input"), name);
    for op in [BinaryOp::Div, BinaryOp::Mod] {
        let expr = Expr::binary(op, operand("a"), operand("b"));
        assert_eq!(
            evaluate(&isl_compiler::normalize(compile(&expr)), &ctx),
            Err(EvaluationError::Value(ValueError::Overflow(
                if op == BinaryOp::Div { "/" } else { "%" }
            )))
        );
    }
}

#[test]
fn test_condition_must_be_boolean() {
    let ir = compile(&Expr::int(3));
    assert_eq!(
        evaluate_condition(&ir, &EvaluationContext::empty()),
        Err(EvaluationError::NotBoolean {
            context: "condition",
            actual: "integer"
        })
    );
}

#[test]
fn test_variable_resolution_order() {
    let state = Arc::new(CapturedState::new().with_field("limit", Value::Integer(1)));
    let ctx = EvaluationContext::empty()
        .with_state(state)
        .with_input(input(&[("limit", Value::Integer(2))]));
    let limit = Expr::ident("limit");
    assert_eq!(eval(&limit, &ctx), Ok(Value::Integer(2)));
    let ctx = ctx.with_variable("limit", Value::Integer(3));
    assert_eq!(eval(&limit, &ctx), Ok(Value::Integer(3)));
}
