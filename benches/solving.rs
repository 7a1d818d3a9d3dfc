//! Benchmarks for solving and grounding operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lazyground::{parse_clause, parse_literal, Clause, GroundSolver, GroundState, TheorySolver};

fn symmetry_theory(n: usize) -> Vec<Clause> {
    let mut rules = vec![parse_clause("!bond(X,Y), bond(Y,X)").unwrap()];
    for i in 0..n {
        rules.push(parse_clause(&format!("bond(id{},id{})", i, (i + 1) % n)).unwrap());
    }
    rules
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("clause", |b| {
        b.iter(|| black_box(parse_clause("!bond(X,Y), @alldiff(X,Y), bond(Y,X)").unwrap()));
    });

    group.bench_function("cardinality", |b| {
        b.iter(|| black_box(parse_clause("@atleast(2, a(x), b(x), c(x))").unwrap()));
    });

    group.finish();
}

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");

    for n in [4usize, 8, 16] {
        let rules = symmetry_theory(n);
        group.bench_with_input(BenchmarkId::new("symmetry", n), &rules, |b, rules| {
            b.iter(|| {
                let mut solver = TheorySolver::new();
                black_box(solver.solve_rules(black_box(rules)).unwrap())
            });
        });
    }

    group.finish();
}

fn ground_solver_benchmark(c: &mut Criterion) {
    let hard: Vec<Clause> = vec![
        parse_clause("@atleast(2, a, b, c, d)").unwrap(),
        parse_clause("@atmost(3, a, b, c, d)").unwrap(),
        parse_clause("a, b").unwrap(),
    ];

    c.bench_function("ground_solve_all", |b| {
        b.iter(|| {
            let mut solver = GroundSolver::new(black_box(hard.clone())).unwrap();
            black_box(solver.solve_all(None))
        });
    });
}

fn violation_search_benchmark(c: &mut Criterion) {
    let rules = vec![parse_clause("!bond(X,Y), bond(Y,X)").unwrap()];
    let state: GroundState = (0..12)
        .map(|i| parse_literal(&format!("bond(id{},id{})", i, i + 1)).unwrap())
        .collect();

    c.bench_function("find_violated_rules", |b| {
        let mut solver = TheorySolver::new();
        b.iter(|| black_box(solver.find_violated_rules(black_box(&rules), &state)));
    });
}

criterion_group!(
    benches,
    parse_benchmark,
    solve_benchmark,
    ground_solver_benchmark,
    violation_search_benchmark
);
criterion_main!(benches);
