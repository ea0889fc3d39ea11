use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use raze_types::BlockHash;
use raze_work::{work_validate, work_value, WorkPool};

fn bench_work_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_generation");
    group.sample_size(10);
    let pool = WorkPool::new(2);
    let root = BlockHash::new([0x42; 32]);

    // Thresholds low enough to complete quickly; the live threshold takes
    // a large fraction of a second per sample.
    for threshold in [0u64, 0xf000_0000_0000_0000, 0xff00_0000_0000_0000] {
        group.bench_with_input(
            BenchmarkId::new("generate", format!("{threshold:016X}")),
            &threshold,
            |b, &threshold| {
                b.iter(|| black_box(pool.generate_blocking(root, threshold).unwrap()));
            },
        );
    }

    group.finish();
    pool.stop();
}

fn bench_work_validation(c: &mut Criterion) {
    let root = BlockHash::new([0x42; 32]);

    c.bench_function("work_value", |b| {
        b.iter(|| black_box(work_value(black_box(&root), black_box(0xDEAD_BEEF))));
    });

    c.bench_function("work_validate", |b| {
        b.iter(|| {
            black_box(work_validate(
                black_box(&root),
                black_box(0xDEAD_BEEF),
                black_box(raze_work::PUBLISH_TEST_THRESHOLD),
            ))
        });
    });
}

criterion_group!(benches, bench_work_generation, bench_work_validation);
criterion_main!(benches);
