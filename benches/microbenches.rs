//! Criterion microbenches for the per-frame hot path.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - localization normalization (point lists and corner scalars)
//! - source-to-viewport mapping
//! - reference classification
//! - verification recoloring of a full overlay

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use scanfuse::geometry::{
    normalize, Coord, CornerScalars, Dimensions, Localization, ViewportBox, ViewportMapper,
};
use scanfuse::pipeline::{apply_verification, Annotation, AnnotationKind};
use scanfuse::reference::{ReferenceEntry, ReferenceTable};

fn quad(x: f64, y: f64, side: f64) -> Localization {
    Localization::Points(vec![
        Coord::new(x, y),
        Coord::new(x + side, y),
        Coord::new(x + side, y + side),
        Coord::new(x, y + side),
    ])
}

/// Benchmark normalizing both localization shapes.
fn bench_normalize(c: &mut Criterion) {
    let displayed = Dimensions::new(1280.0, 720.0);
    let points = quad(120.0, 80.0, 64.0);
    let corners = Localization::Corners(CornerScalars {
        x1: 120.0,
        y1: 80.0,
        x2: 184.0,
        y2: 80.0,
        x3: 184.0,
        y3: 144.0,
        x4: 120.0,
        y4: 144.0,
    });

    let mut group = c.benchmark_group("normalize");
    group.bench_function("points", |b| {
        b.iter(|| black_box(normalize(black_box(&points), displayed)))
    });
    group.bench_function("corners", |b| {
        b.iter(|| black_box(normalize(black_box(&corners), displayed)))
    });
    group.finish();
}

/// Benchmark mapping a source box into the displayed viewport.
fn bench_map(c: &mut Criterion) {
    let mapper = ViewportMapper::new(
        Dimensions::new(1280.0, 720.0),
        Dimensions::new(1920.0, 1080.0),
    );
    let extent = normalize(&quad(300.0, 200.0, 150.0), mapper.displayed())
        .ok()
        .flatten()
        .expect("benchmark quad is well-formed");

    c.bench_function("viewport_place", |b| {
        b.iter(|| black_box(mapper.place(black_box(extent))))
    });
}

/// Benchmark classification against reference tables of growing size.
fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    for size in [100usize, 10_000] {
        let table = ReferenceTable::new(
            (0..size)
                .map(|i| {
                    ReferenceEntry::new(format!("{i:013}"))
                        .with_reported(if i % 2 == 0 { "Yes" } else { "No" })
                })
                .collect(),
        );
        let probe = format!("{:013}", size / 2);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &probe, |b, probe| {
            b.iter(|| black_box(table.classify(black_box(probe))))
        });
    }
    group.finish();
}

/// Benchmark recoloring an overlay after a verification.
fn bench_apply_verification(c: &mut Criterion) {
    let annotations: Vec<Annotation> = (0..64)
        .map(|i| Annotation {
            kind: AnnotationKind::Barcode,
            value: format!("{i:013}"),
            bbox: ViewportBox::from_xywh(i as f64, 0.0, 10.0, 10.0),
            classification: None,
            flagged_non_reported: false,
            color: "red".to_string(),
        })
        .collect();
    let non_reported: Vec<String> = (0..64)
        .step_by(3)
        .map(|i| format!("{i:013} (Item {i})"))
        .collect();

    c.bench_function("apply_verification", |b| {
        b.iter_batched(
            || annotations.clone(),
            |mut overlay| black_box(apply_verification(&mut overlay, &non_reported)),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_map,
    bench_classify,
    bench_apply_verification
);
criterion_main!(benches);
