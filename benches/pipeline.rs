use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use combdb::{BufferMode, Collection, Options};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Doc {
    name: String,
    payload: Vec<u8>,
}

fn make_doc(i: u64) -> Doc {
    Doc {
        name: format!("record_{i:08}"),
        payload: vec![0xA5; 100],
    }
}

fn open_collection(dir: &TempDir, mode: BufferMode) -> Collection<u64, Doc> {
    let options = Options::builder()
        .base_directory(dir.path())
        .database_name("bench")
        .buffer_mode(mode)
        .max_parallelism(8)
        .build();
    let collection = Collection::new("docs", options);
    collection.load().unwrap();
    collection
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    let size = 5_000u64;

    for (label, mode) in [
        ("disabled", BufferMode::Disabled),
        ("buffered", BufferMode::Buffered),
        ("parallel", BufferMode::ParallelBuffered),
    ] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(label), &mode, |b, &mode| {
            b.iter_batched_ref(
                || {
                    let dir = TempDir::new().unwrap();
                    let collection = open_collection(&dir, mode);
                    (dir, collection)
                },
                |(_dir, collection)| {
                    for i in 0..size {
                        collection.add(black_box(i), black_box(make_doc(i))).unwrap();
                    }
                    collection.flush().unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let size = 10_000u64;

    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, BufferMode::Disabled);
    for i in 0..size {
        collection.add(i, make_doc(i)).unwrap();
    }

    group.throughput(Throughput::Elements(size));
    group.bench_function("in_memory", |b| {
        b.iter(|| {
            for i in 0..size {
                black_box(collection.try_get(black_box(&i)).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");
    let size = 2_000u64;

    group.throughput(Throughput::Elements(size * 2));
    group.bench_function("add_remove_reuse", |b| {
        b.iter_batched_ref(
            || {
                let dir = TempDir::new().unwrap();
                let collection = open_collection(&dir, BufferMode::Disabled);
                (dir, collection)
            },
            |(_dir, collection)| {
                for i in 0..size {
                    collection.add(i, make_doc(i)).unwrap();
                }
                for i in 0..size {
                    collection.remove(i).unwrap();
                }
                for i in size..size * 2 {
                    collection.add(i, make_doc(i)).unwrap();
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_get, bench_churn);
criterion_main!(benches);
