//! Benchmarks for aggregation and uncertainty estimation.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use frank::alist::{Alist, Attr, State, Value, VarRef};
use frank::graph::InferenceGraph;
use frank::reduce::gp::GaussianProcess;
use frank::reduce::{ReduceOp, ReduceRegistry, ReduceScope};
use frank::uncertainty;

fn series(n: i32) -> Vec<Alist> {
    (0..n)
        .map(|i| {
            let mut c = Alist::new()
                .with(Attr::Time, Value::from(i64::from(2000 + i)))
                .with(Attr::Object, "?x")
                .with_opvar("?x")
                .with(VarRef::projection("x"), Value::from(100.0 + 2.5 * f64::from(i) + f64::from(i % 3)))
                .with_cov(0.05);
            c.state = State::Reducible;
            c
        })
        .collect()
}

fn parent(op: &str) -> Alist {
    Alist::new()
        .with_op(op)
        .with(Attr::Time, "2030")
        .with(Attr::Object, "?x")
        .with_opvar("?x")
}

fn bench_reducer(c: &mut Criterion, op: ReduceOp, n: i32) {
    let registry = ReduceRegistry::builtin();
    let Some(reducer) = registry.get(op) else {
        return;
    };
    let children = series(n);
    c.bench_function(&format!("{op}_{n}"), |bench| {
        bench.iter(|| {
            let mut graph = InferenceGraph::new();
            let mut scope = ReduceScope {
                graph: &mut graph,
                expected_children: children.len(),
            };
            let mut p = parent(op.code());
            black_box(reducer(&mut p, black_box(&children), &mut scope))
        })
    });
}

fn bench_arith(c: &mut Criterion) {
    bench_reducer(c, ReduceOp::Sum, 100);
    bench_reducer(c, ReduceOp::Value, 100);
}

fn bench_regress(c: &mut Criterion) {
    bench_reducer(c, ReduceOp::Regress, 20);
}

fn bench_gpregress(c: &mut Criterion) {
    bench_reducer(c, ReduceOp::GpRegress, 20);

    let xs: Vec<f64> = (0..30).map(f64::from).collect();
    let ys: Vec<f64> = xs.iter().map(|x| (x * 0.3).sin() * 10.0 + x).collect();
    c.bench_function("gp_fit_best_30", |bench| {
        bench.iter(|| black_box(GaussianProcess::fit_best(black_box(&xs), black_box(&ys))))
    });
}

fn bench_estimate(c: &mut Criterion) {
    let children = series(100);
    c.bench_function("estimate_100", |bench| {
        bench.iter(|| black_box(uncertainty::estimate(black_box(&children), true, "sum", 120)))
    });
}

criterion_group!(benches, bench_arith, bench_regress, bench_gpregress, bench_estimate);
criterion_main!(benches);
