use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hmgcp_core::{infer_with, SolverConfig};

const PROGRAMS: &[(&str, &str)] = &[
    ("arith", "(+ (* 3 4) (dec 7))"),
    ("poly", "id = { x -> x }; (pair (id 3) (id \"abc\"))"),
    (
        "fact",
        "fact = { n -> (if (eq0 n) 1 (* n (fact (dec n)))) }; (fact 5)",
    ),
    (
        "records",
        "mk = { a b -> @{ x = a, y = b } }; p = (mk 1 \"s\"); q = (mk 2.5 p); (pair p.x q.y.y)",
    ),
    ("lift", "p = { x y -> (pair x y) }; (pair (p 3 \"abc\") (p 1.5 5))"),
];

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    for (name, src) in PROGRAMS {
        group.bench_with_input(BenchmarkId::new("combined", name), src, |b, src| {
            b.iter(|| infer_with(black_box(src), SolverConfig::default().with_invariants(false)))
        });
        group.bench_with_input(BenchmarkId::new("hm_only", name), src, |b, src| {
            let config = SolverConfig::default().with_invariants(false).with_gcp(false);
            b.iter(|| infer_with(black_box(src), config.clone()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
