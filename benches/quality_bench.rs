//! Benchmarks for quality label normalization.
//!
//! Run with: `cargo bench --bench quality_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use streamgate::normalize_quality;

/// Labels as providers actually report them.
const LABELS: &[&str] = &[
    "1080",
    "720p",
    "FHD",
    "Full HD",
    "4K UHD",
    "Server 2",
    "HDRip 480p x264",
    "CAM",
    "The.Movie.2019.2160p.WEB-DL.DDP5.1.HDR.HEVC",
    "",
];

fn bench_single_labels(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    for label in LABELS {
        group.bench_with_input(BenchmarkId::from_parameter(label), label, |b, label| {
            b.iter(|| normalize_quality(black_box(label)));
        });
    }
    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let batch: Vec<&str> = LABELS.iter().copied().cycle().take(1000).collect();
    let mut group = c.benchmark_group("normalize_batch");
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function("1000_labels", |b| {
        b.iter(|| {
            batch
                .iter()
                .map(|label| normalize_quality(black_box(label)))
                .count()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_single_labels, bench_batch);
criterion_main!(benches);
