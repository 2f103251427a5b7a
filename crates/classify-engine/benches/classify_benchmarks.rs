//! Benchmarks for level calculation, grid detection and contour extraction.
//!
//! Run with: cargo bench --package classify-engine --bench classify_benchmarks

use std::sync::Arc;

use classify_engine::contour::{contour_band, contour_lines, filled_bands, ContourField};
use classify_engine::grid::{GridDetector, GridField};
use classify_engine::triangulation::{build_mesh, SpadeTriangulator, DEFAULT_MIN_CIRCLE_RATIO};
use classify_engine::{
    calculate_levels, ClassifyGenerator, ClassifyMethod, ClassifyParams, ClassifyType, Crs,
    ExtendOption, MemorySource, PointSet, RecordingFeedback,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use test_utils::{fields, lattice, scattered, PointData};

fn point_set(points: &PointData) -> PointSet {
    PointSet::new(points.x.clone(), points.y.clone(), points.z.clone()).unwrap()
}

fn grid_field(size: usize) -> ContourField {
    let points = lattice(size, size, 1.0, fields::ripple(size as f64 / 3.0));
    let set = point_set(&points);
    let layout = GridDetector::default().detect(set.x(), set.y()).unwrap();
    ContourField::from_grid(&GridField::new(&set, &layout))
}

fn mesh_field(n: usize) -> ContourField {
    let points = scattered(n, 100.0, 100.0, 42, fields::ripple(30.0));
    let mesh = build_mesh(&SpadeTriangulator, &points.x, &points.y, DEFAULT_MIN_CIRCLE_RATIO).unwrap();
    ContourField::from_mesh(&mesh, &points.z).unwrap()
}

// =============================================================================
// LEVEL CALCULATION BENCHMARKS
// =============================================================================

fn bench_calculate_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_levels");
    let points = scattered(10_000, 100.0, 100.0, 7, fields::gaussian_hill(50.0, 50.0, 20.0, 500.0));
    group.throughput(Throughput::Elements(points.len() as u64));

    let params = ClassifyParams {
        n_classify: Some(20),
        interval: Some(25.0),
        ..ClassifyParams::default()
    };
    for method in [
        ClassifyMethod::Equal,
        ClassifyMethod::Interval,
        ClassifyMethod::Quantile,
        ClassifyMethod::Pretty,
    ] {
        group.bench_with_input(BenchmarkId::new("method", method.id()), &method, |b, &method| {
            b.iter(|| calculate_levels(black_box(&points.z), method, &params))
        });
    }

    group.finish();
}

// =============================================================================
// GRID DETECTION BENCHMARKS
// =============================================================================

fn bench_grid_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_detection");

    for size in [32usize, 128] {
        let points = lattice(size, size, 1.0, fields::plane(1.0, 1.0)).shuffled(1);
        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(BenchmarkId::new("shuffled", size), &points, |b, points| {
            b.iter(|| GridDetector::default().detect(black_box(&points.x), black_box(&points.y)))
        });
    }

    group.finish();
}

// =============================================================================
// TRIANGULATION BENCHMARKS
// =============================================================================

fn bench_triangulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangulation");

    for n in [1_000usize, 10_000] {
        let points = scattered(n, 100.0, 100.0, 3, fields::plane(1.0, 0.0));
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("spade", n), &points, |b, points| {
            b.iter(|| build_mesh(&SpadeTriangulator, &points.x, &points.y, DEFAULT_MIN_CIRCLE_RATIO))
        });
    }

    group.finish();
}

// =============================================================================
// CONTOUR EXTRACTION BENCHMARKS
// =============================================================================

fn bench_contour_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("contour_extraction");
    let levels: Vec<f64> = (-4..=4).map(|k| k as f64 * 0.2).collect();

    for (name, field) in [("grid_128", grid_field(128)), ("mesh_5000", mesh_field(5_000))] {
        group.bench_with_input(BenchmarkId::new("lines", name), &field, |b, field| {
            b.iter(|| {
                for &level in &levels {
                    black_box(contour_lines(field, level));
                }
            })
        });

        let bands = filled_bands(&levels, ExtendOption::Both);
        group.bench_with_input(BenchmarkId::new("bands", name), &field, |b, field| {
            b.iter(|| {
                for band in &bands {
                    let _ = black_box(contour_band(field, band));
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// FULL PIPELINE BENCHMARKS
// =============================================================================

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(20);

    let points = scattered(2_000, 100.0, 100.0, 11, fields::gaussian_hill(40.0, 60.0, 25.0, 100.0));
    let source = Arc::new(MemorySource::from_xyz("z", &points.x, &points.y, &points.z, Crs::default()));

    for classify_type in ClassifyType::all() {
        group.bench_function(classify_type.as_str(), |b| {
            b.iter(|| {
                let mut generator = ClassifyGenerator::new(Arc::new(RecordingFeedback::new()));
                generator.set_data_source(source.clone());
                generator.set_expression("z", None);
                generator.set_method(
                    ClassifyMethod::Pretty,
                    ClassifyParams {
                        n_classify: Some(10),
                        ..ClassifyParams::default()
                    },
                );
                generator.set_classify_type(classify_type);
                generator.features().map(|features| features.count())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_calculate_levels,
    bench_grid_detection,
    bench_triangulation,
    bench_contour_extraction,
    bench_full_pipeline,
);
criterion_main!(benches);
