//! Normalizing compiled IR never changes a successful evaluation

use isl_compiler::{compile, normalize, CompilationContext};
use isl_core::ast::{BinaryOp, Expr};
use isl_core::value::{Value, ValueMap};
use isl_verify::{evaluate, EvaluationContext};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        prop::sample::select(vec!["a", "b", "c"]).prop_map(Expr::ident),
        prop::sample::select(vec!["x", "y", "missing"])
            .prop_map(|p| Expr::member(Expr::ident("input"), p)),
        (-3i64..3).prop_map(Expr::int),
        any::<bool>().prop_map(Expr::boolean),
        Just(Expr::null()),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::and(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::or(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::eq(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::binary(BinaryOp::Gt, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::binary(BinaryOp::Ge, l, r)),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Expr::binary(BinaryOp::Implies, l, r)),
            inner.clone().prop_map(Expr::not),
            (inner.clone(), prop::collection::vec(leaf(), 0..3))
                .prop_map(|(v, set)| Expr::binary(BinaryOp::In, v, Expr::list(set))),
            (inner.clone(), inner.clone(), inner)
                .prop_map(|(c, t, e)| Expr::conditional(c, t, e)),
        ]
    })
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Boolean),
        (-3i64..3).prop_map(Value::Integer),
        Just(Value::Nil),
    ]
}

fn context(values: &[Value]) -> EvaluationContext {
    let vars: ValueMap = ["a", "b", "c"]
        .iter()
        .zip(values)
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let input: ValueMap = ["x", "y"]
        .iter()
        .zip(&values[3..])
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    EvaluationContext::empty().with_variables(vars).with_input(input)
}

proptest! {
    #[test]
    fn normalization_preserves_values(
        e in expr(),
        values in prop::collection::vec(scalar(), 5),
    ) {
        let ctx = context(&values);
        let ir = compile(&e, &CompilationContext::new(Vec::<String>::new())).unwrap();
        if let Ok(before) = evaluate(&ir, &ctx) {
            let after = evaluate(&normalize(ir), &ctx);
            prop_assert_eq!(after, Ok(before));
        }
    }
}
