//! Benchmarks for hostname decision throughput.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hostblock::{BlockedIndex, Decision, IndexBuilder, IndexReader};

/// Build an in-memory index with `count` synthetic entries.
fn build_index(count: usize) -> BlockedIndex {
    let mut builder = IndexBuilder::new();
    builder.final_prepare_with(count);
    for i in 0..count {
        builder.add(&format!("blocked{}.example.com", i));
    }
    let reader = IndexReader::from_bytes(builder.to_bytes()).expect("valid index");
    let index = BlockedIndex::empty(10_000, 10_000);
    index.migrate_to(reader);
    index
}

fn bench_decide_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide_blocked");
    for size in [1_000, 100_000, 1_000_000] {
        let index = build_index(size);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % size;
                let host = format!("blocked{}.example.com", i);
                assert_eq!(index.decide(black_box(&host)), Decision::Blocked);
            });
        });
    }
    group.finish();
}

fn bench_decide_miss_suffix_walk(c: &mut Criterion) {
    let index = build_index(100_000);
    c.bench_function("decide_allowed_deep_subdomain", |b| {
        b.iter(|| {
            // four labels, so a full suffix walk on every miss
            let decision = index.decide(black_box("a.b.c.not-blocked.example.net"));
            assert_eq!(decision, Decision::Allowed);
        });
    });
}

fn bench_decide_cached(c: &mut Criterion) {
    let index = build_index(100_000);
    index.decide("blocked0.example.com");
    c.bench_function("decide_cached_verdict", |b| {
        b.iter(|| {
            assert_eq!(
                index.decide(black_box("blocked0.example.com")),
                Decision::Blocked
            );
        });
    });
}

fn bench_overrule_lookup(c: &mut Criterion) {
    let index = build_index(100_000);
    index.add_overrule("cdn.example.com", Decision::Allowed, true);
    c.bench_function("decide_wildcard_overrule", |b| {
        b.iter(|| {
            assert_eq!(
                index.decide(black_box("edge7.cdn.example.com")),
                Decision::Allowed
            );
        });
    });
}

criterion_group!(
    benches,
    bench_decide_hit,
    bench_decide_miss_suffix_walk,
    bench_decide_cached,
    bench_overrule_lookup
);
criterion_main!(benches);
