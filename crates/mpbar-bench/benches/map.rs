use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mpbar_bench::bench_settings;
use mpbar_core::{Granularity, ProgressError, SessionOptions, Sequential, SilentRenderer, map};

fn square(i: u64) -> Result<u64, ProgressError> {
    Ok(i.wrapping_mul(i))
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map");
    group.sample_size(20);
    let pool = mpbar_core::thread_pool(Some(4)).unwrap();

    for n in [100u64, 1_000] {
        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |b, &n| {
            b.iter(|| {
                map(
                    &Sequential,
                    (0..n).collect(),
                    SessionOptions::new("bench"),
                    bench_settings(None),
                    Granularity::PerItem,
                    Box::new(SilentRenderer),
                    |i, _| square(i),
                )
                .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("pool_4", n), &n, |b, &n| {
            b.iter(|| {
                map(
                    &pool,
                    (0..n).collect(),
                    SessionOptions::new("bench"),
                    bench_settings(None),
                    Granularity::PerItem,
                    Box::new(SilentRenderer),
                    |i, _| square(i),
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_map);
criterion_main!(benches);
