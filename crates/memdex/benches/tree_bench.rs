//! Benchmarks for the Memdex byte-tree.
//!
//! Run with: cargo bench --package fennec-memdex
//!
//! ## Benchmark Categories
//!
//! - **Merge**: repeated updates to a single hot key
//! - **Insert**: distinct-key insertion with splits
//! - **Walk**: full traversal of a populated tree

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fennec_memdex::expr::sum;
use fennec_memdex::{ByteTree, Field, Fields, Sample, Table};

const RES_NANOS: i64 = 60 * 1_000_000_000;

fn table() -> Table {
    Table::new(
        "bench",
        Fields::new(vec![
            Field::new("hits", sum("hits")),
            Field::new("errors", sum("errors")),
        ]),
        Duration::from_secs(60),
    )
}

/// Generate dimension keys with realistic shared prefixes.
fn generate_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("dc{}/host{:04}/metric{}", i % 4, i % 500, i).into_bytes())
        .collect()
}

fn bench_hot_key_merge(c: &mut Criterion) {
    let tree = ByteTree::new();
    let table = table();
    let sample = Sample::new(RES_NANOS).with("hits", 1.0).with("errors", 0.0);

    c.bench_function("tree_merge_hot_key", |b| {
        b.iter(|| tree.update(&table, 0, black_box(b"dc1/host42/cpu"), &sample))
    });
}

fn bench_insert_distinct_keys(c: &mut Criterion) {
    let table = table();
    let keys = generate_keys(1000);

    let mut group = c.benchmark_group("tree_insert");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("distinct_1k", |b| {
        b.iter_batched(
            ByteTree::new,
            |tree| {
                let sample = Sample::new(RES_NANOS).with("hits", 1.0);
                for key in &keys {
                    tree.update(&table, 0, key, &sample);
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_walk(c: &mut Criterion) {
    let tree = Arc::new(ByteTree::new());
    let table = table();
    let sample = Sample::new(RES_NANOS).with("hits", 1.0).with("errors", 2.0);
    for key in generate_keys(10_000) {
        tree.update(&table, 0, &key, &sample);
    }

    let mut group = c.benchmark_group("tree_walk");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("full_10k", |b| {
        b.iter(|| {
            let mut rows = 0usize;
            tree.walk(0, |_, data| {
                rows += data.len();
                true
            });
            black_box(rows)
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_hot_key_merge,
    bench_insert_distinct_keys,
    bench_walk
);
criterion_main!(benches);
