use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use xcmetrics::propensity::{estimate_inverse_propensity, PropensityParams};

const N_LABELS: usize = 10_000;
const N_EXAMPLES: usize = 1_000;

/// Random truth sets and rankings over a large label space.
fn synthetic(seed: u64) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut truth = Vec::with_capacity(N_EXAMPLES);
    let mut pred = Vec::with_capacity(N_EXAMPLES);
    for _ in 0..N_EXAMPLES {
        let n_true = rng.gen_range(1..8);
        truth.push(sample(&mut rng, N_LABELS, n_true).iter().map(|i| i as u32).collect());
        pred.push(sample(&mut rng, N_LABELS, 10).iter().map(|i| i as u32).collect());
    }
    (truth, pred)
}

fn bench_rank_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_metrics");
    let (truth, pred) = synthetic(7);

    for &k in &[1usize, 5, 10] {
        group.bench_with_input(BenchmarkId::new("precision_at_k", k), &k, |b, &k| {
            b.iter(|| xcmetrics::precision_at_k(black_box(&truth), black_box(&pred), k))
        });
        group.bench_with_input(BenchmarkId::new("ndcg_at_k", k), &k, |b, &k| {
            b.iter(|| xcmetrics::ndcg_at_k(black_box(&truth), black_box(&pred), k))
        });
    }

    group.bench_function("coverage_at_10", |b| {
        b.iter(|| xcmetrics::coverage_at_k(black_box(&truth), black_box(&pred), 10))
    });

    group.finish();
}

fn bench_propensity(c: &mut Criterion) {
    let mut group = c.benchmark_group("propensity");
    let (truth, pred) = synthetic(11);
    let inv_ps = estimate_inverse_propensity(&truth, PropensityParams::default())
        .expect("non-empty corpus");

    group.bench_function("estimate_inverse_propensity", |b| {
        b.iter(|| estimate_inverse_propensity(black_box(&truth), PropensityParams::default()))
    });
    group.bench_function("ps_precision_at_10", |b| {
        b.iter(|| xcmetrics::ps_precision_at_k(black_box(&truth), black_box(&pred), &inv_ps, 10, true))
    });

    group.finish();
}

fn bench_set_and_macro(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_and_macro");
    let (truth, pred) = synthetic(13);

    group.bench_function("f1_macro", |b| {
        b.iter(|| {
            xcmetrics::f1_measure(
                black_box(&truth),
                black_box(&pred),
                xcmetrics::Average::Macro,
                0.0,
            )
        })
    });
    group.bench_function("macro_f1_at_5", |b| {
        b.iter(|| xcmetrics::macro_f1_at_k(black_box(&truth), black_box(&pred), 5, 0.0))
    });

    group.finish();
}

criterion_group!(benches, bench_rank_metrics, bench_propensity, bench_set_and_macro);
criterion_main!(benches);
