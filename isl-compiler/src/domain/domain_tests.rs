use super::*;
use isl_core::ast::{BinaryOp, DurationUnit, EntityDecl, PostconditionBlock, TemporalDecl, TypeRef};

fn withdraw() -> BehaviorDecl {
    let mut b = BehaviorDecl::new("Withdraw");
    b.inputs = vec![FieldDecl::required("amount", TypeRef::Int)];
    b.preconditions = vec![Expr::binary(
        BinaryOp::Gt,
        Expr::member(Expr::ident("input"), "amount"),
        Expr::int(0),
    )];
    b.postconditions = vec![PostconditionBlock {
        guard: PostconditionGuard::Success,
        predicates: vec![Expr::eq(
            Expr::member(Expr::ident("result"), "balance"),
            Expr::binary(
                BinaryOp::Sub,
                Expr::old(Expr::ident("balance")),
                Expr::member(Expr::ident("input"), "amount"),
            ),
        )],
    }];
    b.temporal = vec![TemporalDecl {
        within: Expr::duration(200, DurationUnit::Milliseconds),
        description: None,
    }];
    b.effects = vec![EffectKind::Database];
    b
}

fn domain() -> Domain {
    Domain {
        name: "Bank".into(),
        entities: vec![EntityDecl {
            name: "Account".into(),
            fields: vec![FieldDecl::required("balance", TypeRef::Int)],
            invariants: vec![Expr::binary(
                BinaryOp::Ge,
                Expr::ident("balance"),
                Expr::int(0),
            )],
        }],
        behaviors: vec![withdraw(), BehaviorDecl::new("Noop")],
        scenarios: vec![ScenarioDecl {
            name: "withdraw twice".into(),
            steps: vec![
                ScenarioStepDecl::Invoke {
                    behavior: "Withdraw".into(),
                    args: vec![("amount".into(), Expr::int(10))],
                    bind: Some("first".into()),
                    expect_failure: false,
                },
                ScenarioStepDecl::Assert {
                    condition: Expr::eq(Expr::member(Expr::ident("first"), "balance"), Expr::int(90)),
                },
            ],
        }],
    }
}

#[test]
fn test_compile_domain_keeps_declaration_order() {
    let compiled = Compiler::new().compile_domain(&domain()).unwrap();
    let names: Vec<_> = compiled.behaviors.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Withdraw", "Noop"]);
    assert_eq!(compiled.entities, vec!["Account".to_string()]);
}

#[test]
fn test_behavior_contents() {
    let compiled = Compiler::new().compile_domain(&domain()).unwrap();
    let withdraw = compiled.behavior("Withdraw").unwrap();

    assert_eq!(withdraw.preconditions[0].expression, "0 < input.amount");
    let post = &withdraw.postconditions[0].conditions[0];
    assert!(post.references_result());
    assert_eq!(post.hash.len(), 64);

    // entity invariants are attached to every behavior
    assert_eq!(withdraw.entity_invariants.len(), 1);
    assert_eq!(withdraw.entity_invariants[0].entity, "Account");
    assert_eq!(withdraw.entity_invariants[0].condition.expression, "0 <= balance");
    assert_eq!(compiled.behavior("Noop").unwrap().entity_invariants.len(), 1);

    assert_eq!(withdraw.temporal[0].within_ms, 200);
    assert!(withdraw.effects.contains(&EffectKind::Database));
    assert_eq!(withdraw.condition_count(), 3);
}

#[test]
fn test_scenario_binds_names_for_later_steps() {
    let compiled = Compiler::new().compile_domain(&domain()).unwrap();
    let steps = &compiled.scenarios[0].steps;
    assert_eq!(steps.len(), 2);
    match &steps[1] {
        CompiledStep::Assert { condition } => {
            assert_eq!(condition.expression, "90 == first.balance")
        }
        other => panic!("expected assert, got {:?}", other),
    }
}

#[test]
fn test_unknown_scenario_behavior_is_an_error() {
    let mut d = domain();
    d.scenarios[0].steps.push(ScenarioStepDecl::Invoke {
        behavior: "Deposit".into(),
        args: vec![],
        bind: None,
        expect_failure: false,
    });
    assert!(matches!(
        Compiler::new().compile_domain(&d),
        Err(CompilerError::UnknownBehavior { .. })
    ));
}

#[test]
fn test_result_in_precondition_fails_the_domain() {
    let mut d = domain();
    d.behaviors[1]
        .preconditions
        .push(Expr::member(Expr::ident("result"), "ok"));
    assert!(matches!(
        Compiler::new().compile_domain(&d),
        Err(CompilerError::ResultOutsidePostcondition { .. })
    ));
}

#[test]
fn test_non_constant_temporal_bound_is_rejected() {
    let mut d = domain();
    d.behaviors[0].temporal[0].within = Expr::ident("limit");
    assert!(matches!(
        Compiler::new().compile_domain(&d),
        Err(CompilerError::InvalidTemporalBound { .. })
    ));
}

#[test]
fn test_repeated_compilation_uses_cache() {
    let compiler = Compiler::new();
    compiler.compile_domain(&domain()).unwrap();
    let first = compiler.cache_stats();
    compiler.compile_domain(&domain()).unwrap();
    let second = compiler.cache_stats();
    assert!(second.hits > first.hits);
    assert_eq!(second.misses, first.misses);
}
