//! Ridge fitting benchmarks
//!
//! Compares leave-one-out and chunked-bootstrap strength selection as the
//! number of voxels grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use std::time::Duration;
use voxreg_core::ridge::default_alphas;
use voxreg_core::{BootstrapRidge, LooRidge, PearsonScorer, RidgeFitter};

/// Deterministic design matrix and noisy linear responses
fn generate_problem(rows: usize, features: usize, voxels: usize) -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_fn((rows, features), |(i, j)| ((i * 7 + j * 13) as f64 * 0.37).sin());
    let w = Array2::from_shape_fn((features, voxels), |(j, v)| ((j + 3 * v) as f64 * 0.11).cos());
    let noise = Array2::from_shape_fn((rows, voxels), |(i, v)| ((i * 31 + v * 17) as f64 * 0.73).sin() * 0.3);
    let y = x.dot(&w) + noise;
    (x, y)
}

fn bench_strength_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("strength_selection");
    group.measurement_time(Duration::from_secs(5));

    let alphas = default_alphas();
    let loo = LooRidge::new();
    let bootstrap = BootstrapRidge::with_seed(0);

    for voxels in [16, 128, 512].iter() {
        let (x, y) = generate_problem(400, 40, *voxels);

        group.bench_with_input(BenchmarkId::new("ridge-cv", voxels), &(&x, &y), |b, (x, y)| {
            b.iter(|| loo.fit(black_box(x.view()), black_box(y.view()), &alphas, &PearsonScorer));
        });

        group.bench_with_input(BenchmarkId::new("ridge-huth", voxels), &(&x, &y), |b, (x, y)| {
            b.iter(|| bootstrap.fit(black_box(x.view()), black_box(y.view()), &alphas, &PearsonScorer));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strength_selection);
criterion_main!(benches);
