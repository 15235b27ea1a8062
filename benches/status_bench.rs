//! Benchmarks for the status update path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_extractor::status::{ProcessCounters, ProcessingStatus, StatusSnapshot};

fn snapshot(identifier: &str, step: u64) -> StatusSnapshot {
    StatusSnapshot::new(
        identifier,
        1000,
        "Extracting",
        "/evidence/file",
        ProcessCounters::new(step, 0, 0, step * 10, 0, step / 100),
    )
}

/// Benchmark monotonic worker updates for different pool sizes
fn bench_worker_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_updates");

    for workers in [1usize, 8, 32] {
        let identifiers: Vec<String> = (0..workers).map(|i| format!("worker-{:02}", i)).collect();
        group.throughput(Throughput::Elements(workers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &identifiers, |b, identifiers| {
            let mut status = ProcessingStatus::new();
            let mut step = 0;
            b.iter(|| {
                step += 1;
                for identifier in identifiers {
                    status
                        .update_worker_status(black_box(&snapshot(identifier, step)))
                        .unwrap();
                }
            });
        });
    }

    group.finish();
}

/// Benchmark the totals read model
fn bench_totals(c: &mut Criterion) {
    let mut status = ProcessingStatus::new();
    status.start_foreman("foreman", 1);
    for i in 0..32 {
        status.update_worker_status(&snapshot(&format!("worker-{:02}", i), 500)).unwrap();
    }

    c.bench_function("totals_32_workers", |b| b.iter(|| black_box(&status).totals()));
}

criterion_group!(benches, bench_worker_updates, bench_totals);
criterion_main!(benches);
