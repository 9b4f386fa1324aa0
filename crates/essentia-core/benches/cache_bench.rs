//! Essentia cache Criterion benchmarks.
//!
//! Measures point mutation, batched push application, diffing resync, and
//! fan-out to registered receivers.
//!
//! Run with: cargo bench --bench cache_bench

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use essentia_core::{
    CapabilityToken, ChangeBatch, ChangeNotifier, EssentiaReceiver, EssentiaStack,
    QuantityCache,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct NullReceiver;

impl EssentiaReceiver<u32> for NullReceiver {
    fn is_valid(&self, _token: &CapabilityToken) -> bool {
        true
    }

    fn post_change(&self, changes: &ChangeBatch<u32>) {
        black_box(changes.len());
    }
}

fn snapshot(aspects: u32, scale: i64) -> Vec<EssentiaStack<u32>> {
    (0..aspects)
        .map(|aspect| EssentiaStack::new(aspect, i64::from(aspect + 1) * scale))
        .collect()
}

fn filled_cache(aspects: u32) -> QuantityCache<u32> {
    let mut cache = QuantityCache::new();
    cache.resync_from(snapshot(aspects, 10), false);
    cache
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_point_mutate(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_mutate");
    group.throughput(Throughput::Elements(1));

    group.bench_function("add_then_remove", |b| {
        let mut cache = filled_cache(64);
        b.iter(|| {
            black_box(cache.point_mutate(&7, 5));
            black_box(cache.point_mutate(&7, -5));
        });
    });

    group.bench_function("clamp_to_zero", |b| {
        let mut cache = filled_cache(64);
        b.iter(|| {
            black_box(cache.point_mutate(&99, 10));
            black_box(cache.point_mutate(&99, -1_000));
        });
    });

    group.finish();
}

fn bench_apply_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_deltas");
    for size in [8_u32, 64, 512] {
        let up = snapshot(size, 1);
        let down: Vec<_> = up
            .iter()
            .map(|s| EssentiaStack::new(s.aspect, -s.amount))
            .collect();
        group.throughput(Throughput::Elements(u64::from(size) * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut cache = filled_cache(size);
            b.iter(|| {
                black_box(cache.apply_deltas(up.iter().cloned()));
                black_box(cache.apply_deltas(down.iter().cloned()));
            });
        });
    }
    group.finish();
}

fn bench_resync(c: &mut Criterion) {
    let mut group = c.benchmark_group("resync");
    for size in [8_u32, 64, 512] {
        let a = snapshot(size, 10);
        let b_snap = snapshot(size, 11);
        group.throughput(Throughput::Elements(u64::from(size)));

        group.bench_with_input(BenchmarkId::new("rebuild", size), &size, |b, &size| {
            let mut cache = filled_cache(size);
            b.iter(|| black_box(cache.resync_from(a.iter().cloned(), false)));
        });

        group.bench_with_input(BenchmarkId::new("diff", size), &size, |b, &size| {
            let mut cache = filled_cache(size);
            b.iter(|| {
                black_box(cache.resync_from(a.iter().cloned(), true));
                black_box(cache.resync_from(b_snap.iter().cloned(), true));
            });
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let batch = snapshot(16, 1);
    for receivers in [1_usize, 16, 128] {
        let notifier: ChangeNotifier<u32> = ChangeNotifier::new();
        let handles: Vec<Arc<dyn EssentiaReceiver<u32>>> = (0..receivers)
            .map(|_| Arc::new(NullReceiver) as Arc<dyn EssentiaReceiver<u32>>)
            .collect();
        for handle in &handles {
            notifier.subscribe(Arc::clone(handle), CapabilityToken::new(1));
        }
        group.throughput(Throughput::Elements(receivers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(receivers),
            &receivers,
            |b, _| {
                b.iter(|| black_box(notifier.dispatch(batch.clone())));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_point_mutate,
    bench_apply_deltas,
    bench_resync,
    bench_dispatch
);
criterion_main!(benches);
