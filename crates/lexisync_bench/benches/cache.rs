//! Definition cache benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lexisync_bench::seeded_store;
use lexisync_core::{CacheConfig, ChangeNotifier, DefinitionCache};
use lexisync_protocol::{Checkpoint, LanguagePair};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn pair() -> LanguagePair {
    LanguagePair::new("zh-Hans", "en")
}

fn loaded_cache(rt: &Runtime, count: usize) -> DefinitionCache<lexisync_store::InMemoryStore> {
    let cache = DefinitionCache::new(
        Arc::new(seeded_store(&pair(), count)),
        Arc::new(ChangeNotifier::default()),
        CacheConfig::default(),
    );
    rt.block_on(cache.ensure_loaded(&pair())).unwrap();
    cache
}

/// Benchmark the initial load of a pair.
fn bench_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_load");
    group.sample_size(20);

    for count in [1_000, 20_000] {
        let store = Arc::new(seeded_store(&pair(), count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &store, |b, store| {
            b.iter(|| {
                let cache = DefinitionCache::new(
                    Arc::clone(store),
                    Arc::new(ChangeNotifier::default()),
                    CacheConfig::default(),
                );
                rt.block_on(cache.ensure_loaded(&pair())).unwrap();
                black_box(cache.len(&pair()));
            });
        });
    }

    group.finish();
}

/// Benchmark lookups against a loaded pair.
fn bench_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = loaded_cache(&rt, 20_000);
    let pair = pair();

    c.bench_function("cache_get_hit", |b| {
        b.iter(|| black_box(cache.get(&pair, black_box("word12345"))));
    });

    c.bench_function("cache_get_miss", |b| {
        b.iter(|| black_box(cache.get(&pair, black_box("absent"))));
    });

    c.bench_function("cache_refresh_noop", |b| {
        b.iter(|| black_box(rt.block_on(cache.refresh(&pair)).unwrap()));
    });
}

/// Benchmark serving definition pages from the cache.
fn bench_page_after(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = loaded_cache(&rt, 20_000);
    let pair = pair();
    let checkpoint = Checkpoint::new("10000", 10_000.0);

    c.bench_function("cache_page_after", |b| {
        b.iter(|| {
            let page = cache
                .page_after(&pair, Some(black_box(&checkpoint)), Some(100))
                .unwrap();
            black_box(page);
        });
    });
}

criterion_group!(benches, bench_load, bench_lookup, bench_page_after);
criterion_main!(benches);
