//! Benchmarks for the bucketed nearest-neighbor lookup.
//!
//! Benchmark targets:
//! - Exact lookup: O(1) amortized bucket probe
//! - Near lookup at threshold 8 over a full-season corpus: sub-linear in
//!   stored frames

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use skipfuse::models::{EpisodeId, Fingerprint};
use skipfuse::storage::{HashStore, SqliteHashStore};

/// Pseudo-random 64-bit fingerprints, deterministic across runs.
fn fingerprint(seed: u64) -> Fingerprint {
    // splitmix64
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    Fingerprint::new(z ^ (z >> 31))
}

/// Builds a store holding `episodes` episodes of `frames_per_episode`
/// frames each (one frame per second of runtime).
fn build_store(episodes: i64, frames_per_episode: u64) -> SqliteHashStore {
    let store = SqliteHashStore::in_memory(16).expect("in-memory store");
    for episode in 1..=episodes {
        let frames: Vec<(u64, Fingerprint)> = (0..frames_per_episode)
            .map(|i| (i * 1000, fingerprint((episode as u64) << 32 | i)))
            .collect();
        store
            .add_batch(EpisodeId::new(episode), &frames)
            .expect("batch insert");
    }
    store
}

fn bench_near_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("near_lookup");
    for &episodes in &[5i64, 20, 50] {
        let store = build_store(episodes, 2400);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{episodes}x2400")),
            &store,
            |b, store| {
                let mut i = 0u64;
                b.iter(|| {
                    i = i.wrapping_add(1);
                    let query = fingerprint(1 << 32 | (i % 2400));
                    black_box(
                        store
                            .near_lookup(black_box(query), 8, EpisodeId::new(1))
                            .expect("lookup"),
                    )
                });
            },
        );
    }
    group.finish();
}

fn bench_exact_lookup(c: &mut Criterion) {
    let store = build_store(20, 2400);
    c.bench_function("exact_lookup/20x2400", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = i.wrapping_add(1);
            let query = fingerprint(2 << 32 | (i % 2400));
            black_box(
                store
                    .exact_lookup(black_box(query), EpisodeId::new(1))
                    .expect("lookup"),
            )
        });
    });
}

fn bench_batch_insert(c: &mut Criterion) {
    c.bench_function("add_batch/2400_frames", |b| {
        let frames: Vec<(u64, Fingerprint)> = (0..2400u64)
            .map(|i| (i * 1000, fingerprint(7 << 32 | i)))
            .collect();
        let mut episode = 0i64;
        let store = SqliteHashStore::in_memory(16).expect("in-memory store");
        b.iter(|| {
            episode += 1;
            store
                .add_batch(EpisodeId::new(episode), black_box(&frames))
                .expect("batch insert");
        });
    });
}

criterion_group!(
    benches,
    bench_near_lookup,
    bench_exact_lookup,
    bench_batch_insert
);
criterion_main!(benches);
