//! Criterion benchmarks for cone analytics.
//!
//! Run with: `cargo bench -p conelab-runner`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;

use conelab_runner::{compute_bayes_cone, compute_consistency_score};

/// Deterministic S × T return matrix.
fn generate_preds(draws: usize, steps: usize) -> Array2<f64> {
    Array2::from_shape_fn((draws, steps), |(i, j)| {
        0.01 * (((i * 31 + j * 17) % 97) as f64 / 48.0 - 1.0)
    })
}

fn bench_bayes_cone(c: &mut Criterion) {
    let mut group = c.benchmark_group("bayes_cone");
    for steps in [10, 60, 250] {
        let preds = generate_preds(500, steps);
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
            b.iter(|| compute_bayes_cone(black_box(preds.view()), 1.0));
        });
    }
    group.finish();
}

fn bench_consistency_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("consistency_score");
    for steps in [10, 60, 250] {
        let preds = generate_preds(500, steps);
        let realized = vec![0.0005; steps];
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
            b.iter(|| compute_consistency_score(black_box(&realized), black_box(preds.view())));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bayes_cone, bench_consistency_score);
criterion_main!(benches);
