use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use isl_compiler::{compile, contract_hash, normalize, CompilationContext, Compiler};
use isl_core::ast::{BinaryOp, Expr, QuantifierKind};

fn create_test_contracts() -> Vec<(&'static str, Expr)> {
    let amount = || Expr::member(Expr::ident("input"), "amount");
    vec![
        (
            "comparison",
            Expr::binary(BinaryOp::Gt, amount(), Expr::int(0)),
        ),
        (
            "balance",
            Expr::eq(
                Expr::member(Expr::ident("result"), "balance"),
                Expr::binary(BinaryOp::Sub, Expr::old(Expr::ident("balance")), amount()),
            ),
        ),
        (
            "wide_and",
            (0..32)
                .map(|i| Expr::ident(format!("flag{}", 31 - i)))
                .reduce(Expr::and)
                .unwrap_or_else(|| Expr::boolean(true)),
        ),
        (
            "quantifier",
            Expr::quantifier(
                QuantifierKind::All,
                "item",
                Expr::member(Expr::ident("input"), "items"),
                Expr::and(
                    Expr::binary(
                        BinaryOp::Ge,
                        Expr::member(Expr::ident("item"), "qty"),
                        Expr::int(1),
                    ),
                    Expr::not(Expr::eq(Expr::member(Expr::ident("item"), "sku"), Expr::null())),
                ),
            ),
        ),
    ]
}

fn benchmark_compile_and_normalize(c: &mut Criterion) {
    let ctx = CompilationContext::new(["Account"]).for_postcondition();
    let mut group = c.benchmark_group("compile_normalize");

    for (name, expr) in create_test_contracts() {
        group.bench_with_input(BenchmarkId::new("uncached", name), &expr, |b, expr| {
            b.iter(|| {
                let ir = normalize(compile(black_box(expr), &ctx).expect("compiles"));
                black_box(contract_hash(&ir));
            });
        });

        let compiler = Compiler::new();
        group.bench_with_input(BenchmarkId::new("cached", name), &expr, |b, expr| {
            b.iter(|| black_box(compiler.compile_expr(black_box(expr), &ctx).expect("compiles")));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_compile_and_normalize);
criterion_main!(benches);
