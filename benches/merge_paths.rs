//! Merge hot path benchmarks.
//!
//! Run with: `cargo bench --bench merge_paths`
//!
//! Covers record splitting, payload assembly, and a full in-memory merge
//! of one dataset.

use bronze_merge::merge::{
    merge_dataset, split_records, DatasetConfig, LineMerger, MergeOptions, SourceObjectRef,
};
use bronze_merge::store::{InMemoryObjectStore, ObjectStore};
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn jsonl_body(lines: usize) -> String {
    let mut body = String::with_capacity(lines * 64);
    for i in 0..lines {
        body.push_str(&format!(
            "{{\"event_id\":{},\"user_id\":\"u{}\",\"type\":\"click\"}}\n",
            i,
            i % 97
        ));
        if i % 10 == 0 {
            body.push_str("  \n");
        }
    }
    body
}

/// Benchmark split_records - per-object decode hot path
fn bench_split_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_records");

    for lines in [10, 100, 1_000] {
        let body = jsonl_body(lines);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_function(format!("lines_{}", lines), |b| {
            b.iter(|| split_records(black_box(&body)))
        });
    }

    group.finish();
}

/// Benchmark LineMerger - folding many small objects into one payload
fn bench_line_merger(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_merger");

    for objects in [10, 100, 1_000] {
        let records = split_records(&jsonl_body(20));
        let sources: Vec<SourceObjectRef> = (0..objects)
            .map(|i| SourceObjectRef {
                bucket: "raw-events".to_string(),
                key: format!("part-{:05}.json", i),
                size: 1_024,
            })
            .collect();

        group.throughput(Throughput::Elements((objects * records.len()) as u64));
        group.bench_function(format!("objects_{}", objects), |b| {
            b.iter(|| {
                let mut merger = LineMerger::new();
                for source in &sources {
                    merger.push(source, records.clone());
                }
                black_box(merger.finish())
            })
        });
    }

    group.finish();
}

/// Benchmark a full merge against the in-memory store
fn bench_merge_dataset(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let dir = tempfile::tempdir().expect("tempdir");

    let store = InMemoryObjectStore::new();
    store.create_bucket("raw-events");
    store.create_bucket("bronze");
    runtime.block_on(async {
        for i in 0..200 {
            store
                .put(
                    "raw-events",
                    &format!("part-{:04}.json", i),
                    Bytes::from(jsonl_body(25)),
                )
                .await
                .expect("seed put");
        }
    });
    let dataset = DatasetConfig::for_dataset("events", dir.path());

    c.bench_function("merge_dataset_200_objects", |b| {
        b.iter(|| {
            runtime
                .block_on(merge_dataset(&store, &dataset, &MergeOptions::new()))
                .expect("merge")
        })
    });
}

criterion_group!(
    benches,
    bench_split_records,
    bench_line_merger,
    bench_merge_dataset
);
criterion_main!(benches);
