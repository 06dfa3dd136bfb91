//! Tests for expression lowering

use super::*;
use isl_core::ast::{DurationUnit, QuantifierKind};

// ===== Helpers =====

fn ctx() -> CompilationContext {
    CompilationContext::new(["Account", "User"])
}

fn post() -> CompilationContext {
    ctx().for_postcondition()
}

fn ok(expr: &Expr, ctx: &CompilationContext) -> IrNode {
    compile(expr, ctx).unwrap_or_else(|e| panic!("compile failed: {}", e))
}

fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    Expr::binary(op, l, r)
}

// ===== Identifiers =====

#[test]
fn test_result_and_input_references() {
    let node = ok(&Expr::ident("result"), &post());
    assert_eq!(node.kind, IrKind::ResultValue { property: None });

    let node = ok(&Expr::member(Expr::ident("result"), "balance"), &post());
    assert_eq!(
        node.kind,
        IrKind::ResultValue {
            property: Some("balance".into())
        }
    );

    let node = ok(&Expr::member(Expr::ident("input"), "amount"), &ctx());
    assert_eq!(
        node.kind,
        IrKind::InputValue {
            property: "amount".into()
        }
    );
}

#[test]
fn test_result_outside_postcondition_is_rejected() {
    let err = compile(&Expr::ident("result"), &ctx()).unwrap_err();
    assert!(matches!(err, CompilerError::ResultOutsidePostcondition { .. }));
}

#[test]
fn test_result_inside_old_is_rejected() {
    let expr = Expr::old(Expr::member(Expr::ident("result"), "x"));
    let err = compile(&expr, &post()).unwrap_err();
    assert!(matches!(err, CompilerError::ResultInsideOld { .. }));
}

#[test]
fn test_old_outside_postcondition_is_rejected() {
    let err = compile(&Expr::old(Expr::ident("balance")), &ctx()).unwrap_err();
    assert!(matches!(err, CompilerError::OldOutsidePostcondition { .. }));
}

#[test]
fn test_nested_old_compiles_through() {
    let node = ok(&Expr::old(Expr::old(Expr::ident("balance"))), &post());
    match node.kind {
        IrKind::Old { inner } => assert!(matches!(inner.kind, IrKind::Old { .. })),
        other => panic!("expected Old, got {:?}", other),
    }
}

#[test]
fn test_bare_input_and_entity_values_are_rejected() {
    assert!(matches!(
        compile(&Expr::ident("input"), &ctx()),
        Err(CompilerError::BareInput { .. })
    ));
    assert!(matches!(
        compile(&Expr::ident("Account"), &ctx()),
        Err(CompilerError::EntityAsValue { .. })
    ));
}

#[test]
fn test_scoped_variable_shadows_keywords() {
    let expr = Expr::quantifier(
        QuantifierKind::All,
        "input",
        Expr::ident("items"),
        Expr::member(Expr::ident("input"), "ok"),
    );
    let node = ok(&expr, &ctx());
    match node.kind {
        IrKind::Quantifier { predicate, .. } => {
            assert!(matches!(predicate.kind, IrKind::PropertyAccess { .. }))
        }
        other => panic!("expected quantifier, got {:?}", other),
    }
}

// ===== Boolean structure =====

#[test]
fn test_and_chains_flatten_regardless_of_grouping() {
    let (a, b, c) = (Expr::ident("a"), Expr::ident("b"), Expr::ident("c"));
    let right = Expr::and(a.clone(), Expr::and(b.clone(), c.clone()));
    let left = Expr::and(Expr::and(a, b), c);

    let l = ok(&left, &ctx());
    let r = ok(&right, &ctx());
    assert_eq!(l, r);
    match l.kind {
        IrKind::LogicalAnd { operands } => assert_eq!(operands.len(), 3),
        other => panic!("expected And, got {:?}", other),
    }
}

#[test]
fn test_or_does_not_absorb_and() {
    let expr = Expr::or(Expr::and(Expr::ident("a"), Expr::ident("b")), Expr::ident("c"));
    match ok(&expr, &ctx()).kind {
        IrKind::LogicalOr { operands } => {
            assert_eq!(operands.len(), 2);
            assert!(matches!(operands[0].kind, IrKind::LogicalAnd { .. }));
        }
        other => panic!("expected Or, got {:?}", other),
    }
}

#[test]
fn test_null_equality_becomes_exists() {
    let eq = ok(&Expr::eq(Expr::ident("x"), Expr::null()), &ctx());
    assert!(matches!(eq.kind, IrKind::Exists { expected: false, .. }));

    let ne = ok(&bin(BinaryOp::NotEq, Expr::null(), Expr::ident("x")), &ctx());
    match ne.kind {
        IrKind::Exists { target, expected } => {
            assert!(expected);
            assert_eq!(target.kind, IrKind::Variable { name: "x".into() });
        }
        other => panic!("expected Exists, got {:?}", other),
    }
}

#[test]
fn test_not_in_becomes_negated_in_set() {
    let set = Expr::list(vec![Expr::string("a"), Expr::string("b")]);
    let expr = Expr::not(bin(BinaryOp::In, Expr::ident("status"), set));
    match ok(&expr, &ctx()).kind {
        IrKind::InSet { negated, .. } => assert!(negated),
        other => panic!("expected InSet, got {:?}", other),
    }
}

#[test]
fn test_implies_becomes_or_of_negation() {
    let expr = bin(BinaryOp::Implies, Expr::ident("a"), Expr::ident("b"));
    match ok(&expr, &ctx()).kind {
        IrKind::LogicalOr { operands } => {
            assert!(matches!(operands[0].kind, IrKind::Not { .. }));
            assert_eq!(operands[1].kind, IrKind::Variable { name: "b".into() });
        }
        other => panic!("expected Or, got {:?}", other),
    }
}

// ===== Literals =====

#[test]
fn test_duration_literals_compile_to_millis() {
    let node = ok(&Expr::duration(2, DurationUnit::Seconds), &ctx());
    assert_eq!(
        node.kind,
        IrKind::Literal {
            value: IrLiteral::Integer(2_000)
        }
    );
    assert!(matches!(
        compile(&Expr::duration(i64::MAX, DurationUnit::Days), &ctx()),
        Err(CompilerError::LiteralOverflow { .. })
    ));
}

#[test]
fn test_negative_literal_folds() {
    let node = ok(&Expr::neg(Expr::int(5)), &ctx());
    assert_eq!(
        node.kind,
        IrKind::Literal {
            value: IrLiteral::Integer(-5)
        }
    );
}

// ===== Method dispatch =====

#[test]
fn test_entity_methods() {
    let exists = Expr::method(
        Expr::ident("User"),
        "exists",
        vec![Expr::member(Expr::ident("input"), "id")],
    );
    assert!(matches!(
        ok(&exists, &ctx()).kind,
        IrKind::EntityExists { ref entity, key: Some(_) } if entity == "User"
    ));

    let lookup = Expr::method(Expr::ident("Account"), "find", vec![Expr::ident("id")]);
    assert!(matches!(ok(&lookup, &ctx()).kind, IrKind::EntityLookup { .. }));

    let count = Expr::method(Expr::ident("Account"), "count", vec![]);
    assert!(matches!(
        ok(&count, &ctx()).kind,
        IrKind::EntityCount { key: None, .. }
    ));

    let other = Expr::method(Expr::ident("Account"), "archive", vec![Expr::ident("id")]);
    assert!(matches!(
        ok(&other, &ctx()).kind,
        IrKind::Call { ref name, .. } if name == "Account.archive"
    ));
}

#[test]
fn test_entity_method_arity() {
    let expr = Expr::method(
        Expr::ident("User"),
        "exists",
        vec![Expr::ident("a"), Expr::ident("b")],
    );
    assert!(matches!(
        compile(&expr, &ctx()),
        Err(CompilerError::Arity { expected: 1, actual: 2, .. })
    ));
}

#[test]
fn test_string_methods_dispatch_by_receiver() {
    let starts = Expr::method(
        Expr::member(Expr::ident("input"), "email"),
        "startsWith",
        vec![Expr::string("admin")],
    );
    assert!(matches!(ok(&starts, &ctx()).kind, IrKind::StringStartsWith { .. }));

    let includes = Expr::method(Expr::string("hello"), "includes", vec![Expr::string("ell")]);
    assert!(matches!(ok(&includes, &ctx()).kind, IrKind::StringIncludes { .. }));

    let matches_re = Expr::method(
        Expr::ident("email"),
        "matches",
        vec![Expr::regex("^[a-z]+@", "i")],
    );
    assert!(matches!(ok(&matches_re, &ctx()).kind, IrKind::StringMatches { .. }));
}

#[test]
fn test_array_methods_dispatch_by_receiver() {
    let list = Expr::list(vec![Expr::int(1), Expr::int(2)]);
    let includes = Expr::method(list.clone(), "includes", vec![Expr::int(1)]);
    assert!(matches!(ok(&includes, &ctx()).kind, IrKind::ArrayIncludes { .. }));

    let len = Expr::member(list, "length");
    assert!(matches!(ok(&len, &ctx()).kind, IrKind::ArrayLength { .. }));

    let every = Expr::method(
        Expr::ident("items"),
        "every",
        vec![Expr::lambda(
            "i",
            bin(BinaryOp::Gt, Expr::member(Expr::ident("i"), "qty"), Expr::int(0)),
        )],
    );
    match ok(&every, &ctx()).kind {
        IrKind::ArrayEvery { param, .. } => assert_eq!(param, "i"),
        other => panic!("expected ArrayEvery, got {:?}", other),
    }

    let mapped = Expr::method(
        Expr::method(
            Expr::ident("items"),
            "filter",
            vec![Expr::lambda("i", Expr::member(Expr::ident("i"), "active"))],
        ),
        "includes",
        vec![Expr::ident("x")],
    );
    assert!(matches!(ok(&mapped, &ctx()).kind, IrKind::ArrayIncludes { .. }));
}

#[test]
fn test_ambiguous_methods_fall_back_to_generic_call() {
    let expr = Expr::method(Expr::ident("tags"), "includes", vec![Expr::string("vip")]);
    match ok(&expr, &ctx()).kind {
        IrKind::Call { name, args } => {
            assert_eq!(name, "includes");
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected Call, got {:?}", other),
    }
}

#[test]
fn test_lambda_methods_require_lambda() {
    let expr = Expr::method(Expr::ident("items"), "every", vec![Expr::ident("f")]);
    assert!(matches!(
        compile(&expr, &ctx()),
        Err(CompilerError::InvalidLambda { .. })
    ));
}

#[test]
fn test_lambda_scope_does_not_leak() {
    // `i` is bound inside the lambda only; outside it is a free variable
    let expr = Expr::and(
        Expr::method(
            Expr::ident("items"),
            "some",
            vec![Expr::lambda("i", Expr::ident("i"))],
        ),
        Expr::ident("i"),
    );
    let node = ok(&expr, &ctx());
    assert!(matches!(node.kind, IrKind::LogicalAnd { .. }));
}

// ===== Errors =====

#[test]
fn test_unmappable_nodes_raise() {
    let assign = Expr::new(ExprKind::Assign {
        target: Box::new(Expr::ident("x")),
        value: Box::new(Expr::int(1)),
    });
    let err = compile(&assign, &ctx()).unwrap_err();
    assert!(matches!(err, CompilerError::Unsupported { .. }));
    assert_eq!(err.node().map(|n| n.kind.name()), Some("assignment"));

    let lambda = Expr::lambda("x", Expr::ident("x"));
    assert!(matches!(
        compile(&lambda, &ctx()),
        Err(CompilerError::Unsupported { .. })
    ));
}

// ===== Determinism =====

#[test]
fn test_ids_restart_for_each_compilation() {
    let expr = Expr::and(Expr::ident("a"), Expr::ident("b"));
    let first = ok(&expr, &ctx());
    let second = ok(&expr, &ctx());
    let ids = |n: &IrNode| {
        let mut v = Vec::new();
        n.walk(&mut |x| v.push(x.id.get()));
        v
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
