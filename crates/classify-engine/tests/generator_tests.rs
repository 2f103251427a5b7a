//! End-to-end tests of the classification generator.

use std::sync::Arc;

use classify_engine::{
    ClassifyError, ClassifyFeature, ClassifyGenerator, ClassifyMethod, ClassifyParams,
    ClassifyType, Crs, ExtendOption, FeatureValue, Geometry, GeneratorConfig, LocalOrigin,
    MemorySource, RecordingFeedback, SharedSource, TriangulationConfig, TriangulationMode,
};
use test_utils::{assert_approx_eq, assert_levels_approx_eq, fields, lattice, scattered, PointData};

fn source(points: &PointData) -> SharedSource {
    Arc::new(MemorySource::from_xyz(
        "z",
        &points.x,
        &points.y,
        &points.z,
        Crs::from_authid("EPSG:2193"),
    ))
}

fn generator_for(points: &PointData) -> (ClassifyGenerator, Arc<RecordingFeedback>) {
    let feedback = Arc::new(RecordingFeedback::new());
    let mut generator = ClassifyGenerator::new(feedback.clone());
    generator.set_data_source(source(points));
    generator.set_expression("z", None);
    (generator, feedback)
}

fn collect(generator: &mut ClassifyGenerator) -> Vec<ClassifyFeature> {
    generator
        .features()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn equal_params(n: usize) -> ClassifyParams {
    ClassifyParams {
        n_classify: Some(n),
        ..ClassifyParams::default()
    }
}

fn total_area(features: &[ClassifyFeature]) -> f64 {
    features.iter().map(|f| f.geometry.area()).sum()
}

#[test]
fn test_unit_square_single_line() {
    let points = PointData {
        x: vec![0.0, 1.0, 1.0, 0.0],
        y: vec![0.0, 0.0, 1.0, 1.0],
        z: vec![0.0, 0.0, 1.0, 1.0],
    };
    let (mut generator, _) = generator_for(&points);
    generator.set_levels(vec![0.5]);
    generator.set_classify_type(ClassifyType::Line);

    let features = collect(&mut generator);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].index, 0);
    assert_eq!(features[0].label, "0.5");
    assert_eq!(features[0].value, FeatureValue::Level(0.5));
    match &features[0].geometry {
        Geometry::MultiLineString(lines) => {
            assert_eq!(lines.len(), 1);
            assert!(lines[0].iter().all(|p| (p.y - 0.5).abs() < 1e-12));
        }
        other => panic!("expected lines, got {:?}", other),
    }
}

#[test]
fn test_three_by_three_grid_detected() {
    let points = lattice(3, 3, 1.0, |_, y| y).shuffled(11);
    let (mut generator, _) = generator_for(&points);
    assert!(generator.is_gridded().unwrap());
    assert_eq!(generator.grid_shape().unwrap(), Some((3, 3)));
}

#[test]
fn test_perturbed_lattice_not_gridded() {
    let points = lattice(5, 5, 1.0, fields::plane(1.0, 1.0))
        .perturbed(12, 0.3, 0.2)
        .shuffled(3);
    let (mut generator, _) = generator_for(&points);
    assert!(!generator.is_gridded().unwrap());
    assert_eq!(generator.grid_shape().unwrap(), None);
}

#[test]
fn test_equal_interval_levels() {
    let points = scattered(50, 10.0, 10.0, 5, fields::plane(1.0, 0.5));
    let (zmin, zmax) = points
        .z
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &z| (lo.min(z), hi.max(z)));
    let (mut generator, _) = generator_for(&points);
    generator.set_method(ClassifyMethod::Equal, equal_params(6));

    let levels = generator.levels().unwrap().to_vec();
    assert_eq!(levels.len(), 7);
    assert_approx_eq!(levels[0], zmin, 1e-9);
    assert_approx_eq!(levels[6], zmax, 1e-9);
    let step = (zmax - zmin) / 6.0;
    for w in levels.windows(2) {
        assert_approx_eq!(w[1] - w[0], step, 1e-9);
    }
}

#[test]
fn test_manual_levels_sorted_and_deduplicated() {
    let points = lattice(3, 3, 1.0, |x, _| x);
    let (mut generator, _) = generator_for(&points);
    generator.set_levels("2, 0.5 1 0.5;1.5");
    assert_levels_approx_eq!(generator.levels().unwrap(), &[0.5, 1.0, 1.5, 2.0], 1e-12);
}

#[test]
fn test_filled_band_count_follows_extend() {
    let points = lattice(5, 5, 1.0, |x, _| x);
    let (mut generator, _) = generator_for(&points);
    generator.set_levels(vec![0.5, 1.5, 2.5]);
    generator.set_classify_type(ClassifyType::Filled);

    let expected = [
        (ExtendOption::Neither, 2),
        (ExtendOption::Below, 3),
        (ExtendOption::Above, 3),
        (ExtendOption::Both, 4),
    ];
    for (extend, count) in expected {
        generator.set_extend(extend);
        assert_eq!(generator.filled_bands().unwrap().len(), count, "{}", extend);
    }
}

#[test]
fn test_filled_grid_bands_cover_domain() {
    let points = lattice(5, 5, 1.0, |x, _| x);
    let (mut generator, feedback) = generator_for(&points);
    generator.set_levels(vec![0.5, 1.5, 2.5]);
    generator.set_classify_type(ClassifyType::Filled);
    generator.set_extend(ExtendOption::Both);

    let features = collect(&mut generator);
    assert_eq!(features.len(), 4);
    let indexes: Vec<usize> = features.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
    assert_eq!(features[0].label, "< 0.5");
    assert_eq!(features[1].label, "0.5 - 1.5");
    assert_eq!(features[3].label, "> 2.5");
    assert_eq!(
        features[0].value,
        FeatureValue::Range {
            min: f64::NEG_INFINITY,
            max: 0.5
        }
    );

    let areas: Vec<f64> = features.iter().map(|f| f.geometry.area()).collect();
    assert_approx_eq!(areas[0], 2.0, 1e-9);
    assert_approx_eq!(areas[1], 4.0, 1e-9);
    assert_approx_eq!(areas[2], 4.0, 1e-9);
    assert_approx_eq!(areas[3], 6.0, 1e-9);
    assert!(feedback.infos().iter().any(|i| i == "Classifying 5 by 5 grid"));
}

#[test]
fn test_filled_triangulated_bands_cover_hull() {
    let points = lattice(5, 5, 1.0, fields::gaussian_hill(2.0, 2.0, 1.5, 10.0)).shuffled(9);
    let (mut generator, feedback) = generator_for(&points);
    generator.set_use_grid(false);
    generator.set_method(ClassifyMethod::Equal, equal_params(4));
    generator.set_classify_type(ClassifyType::Filled);
    generator.set_extend(ExtendOption::Neither);

    let features = collect(&mut generator);
    assert!(!features.is_empty());
    assert_approx_eq!(total_area(&features), 16.0, 1e-6);
    assert!(feedback.infos().iter().any(|i| i == "Triangulating 25 points"));
    assert!(feedback.infos().iter().any(|i| i.starts_with("Classifying") && i.ends_with("triangles")));
}

#[test]
fn test_layer_skips_levels_at_minimum() {
    let points = lattice(5, 5, 1.0, |x, _| x);
    let (mut generator, _) = generator_for(&points);
    generator.set_levels(vec![0.0, 1.5, 2.5]);
    generator.set_classify_type(ClassifyType::Layer);

    let features = collect(&mut generator);
    let indexes: Vec<usize> = features.iter().map(|f| f.index).collect();
    assert_eq!(indexes, vec![1, 2]);
    assert_eq!(features[0].value, FeatureValue::Level(1.5));
    assert_approx_eq!(features[0].geometry.area(), 10.0, 1e-9);
    assert_approx_eq!(features[1].geometry.area(), 6.0, 1e-9);
    assert_eq!(
        generator.fields().iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["index", "z", "label"]
    );
}

#[test]
fn test_grid_and_triangulation_lines_agree() {
    let points = lattice(6, 6, 1.0, fields::plane(1.0, 0.0));
    let (mut generator, _) = generator_for(&points);
    generator.set_levels(vec![2.5]);

    let gridded = collect(&mut generator);
    generator.set_use_grid(false);
    let triangulated = collect(&mut generator);

    for features in [&gridded, &triangulated] {
        assert_eq!(features.len(), 1);
        match &features[0].geometry {
            Geometry::MultiLineString(lines) => {
                assert!(lines.iter().flatten().all(|p| (p.x - 2.5).abs() < 1e-9));
            }
            other => panic!("expected lines, got {:?}", other),
        }
    }
}

#[test]
fn test_generation_is_idempotent() {
    let points = scattered(80, 20.0, 20.0, 21, fields::ripple(10.0));
    let (mut generator, _) = generator_for(&points);
    generator.set_method(ClassifyMethod::Quantile, equal_params(5));
    generator.set_classify_type(ClassifyType::Filled);

    let first = collect(&mut generator);
    let second = collect(&mut generator);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_two_points_too_few() {
    let points = PointData {
        x: vec![0.0, 1.0],
        y: vec![0.0, 1.0],
        z: vec![1.0, 2.0],
    };
    let (mut generator, feedback) = generator_for(&points);
    generator.set_levels(vec![1.5]);
    let err = generator.features().unwrap_err();
    assert_eq!(err, ClassifyError::TooFewPoints { count: 2 });
    assert!(err.is_user_data());
    assert_eq!(feedback.errors().len(), 1);
}

#[test]
fn test_constant_values_do_not_crash() {
    let points = lattice(4, 4, 1.0, |_, _| 5.0);
    let (mut generator, _) = generator_for(&points);

    generator.set_method(ClassifyMethod::Equal, equal_params(5));
    let err = generator.levels().unwrap_err();
    assert!(err.is_classification());

    generator.set_levels(vec![5.0]);
    generator.set_classify_type(ClassifyType::Layer);
    assert!(collect(&mut generator).is_empty());

    generator.set_classify_type(ClassifyType::Line);
    assert!(generator.features().unwrap().all(|f| f.is_ok()));
}

#[test]
fn test_cancel_during_load() {
    let points = lattice(4, 4, 1.0, |x, _| x);
    let (mut generator, feedback) = generator_for(&points);
    generator.set_levels(vec![1.5]);
    feedback.cancel();
    assert_eq!(generator.features().unwrap_err(), ClassifyError::Cancelled);
}

#[test]
fn test_null_values_skipped_and_expression_evaluated() {
    let mut memory = MemorySource::new(
        vec![classify_engine::FieldDef::new("depth", classify_engine::FieldType::Double)],
        Crs::default(),
    );
    for (x, y, z) in [(0.0, 0.0, 1.0), (1.0, 0.0, 2.0), (0.0, 1.0, 3.0), (1.0, 1.0, 4.0)] {
        memory.push_point(x, y, vec![z.into()]);
    }
    memory.push_point(5.0, 5.0, vec![classify_engine::AttributeValue::Null]);

    let feedback = Arc::new(RecordingFeedback::new());
    let mut generator = ClassifyGenerator::new(feedback);
    generator.set_data_source(Arc::new(memory));
    generator.set_expression("\"depth\" * -1", Some("Depth".to_string()));
    let points = generator.points().unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points.z(), &[-1.0, -2.0, -3.0, -4.0]);
    assert_eq!(generator.z_field_name(), "Depth");
}

#[test]
fn test_duplicate_points_discarded() {
    let mut points = lattice(3, 3, 10.0, |x, y| x + y);
    points.x.push(10.001);
    points.y.push(10.0);
    points.z.push(99.0);

    let (mut generator, feedback) = generator_for(&points);
    generator.set_duplicate_tolerance(0.01);
    assert_eq!(generator.points().unwrap().len(), 9);
    assert!(generator.is_gridded().unwrap());
    assert!(feedback
        .infos()
        .iter()
        .any(|i| i.starts_with("1 near duplicate points discarded")));

    generator.set_duplicate_tolerance(0.0);
    assert_eq!(generator.points().unwrap().len(), 10);
    assert!(!generator.is_gridded().unwrap());
}

#[test]
fn test_missing_worker_is_generation_error() {
    let points = scattered(30, 5.0, 5.0, 1, fields::plane(1.0, 1.0));
    let (mut generator, feedback) = generator_for(&points);
    generator.set_levels(vec![2.0, 4.0]);
    generator.set_use_grid(false);
    generator.set_triangulation(TriangulationConfig {
        mode: TriangulationMode::Worker,
        worker_path: Some("/nonexistent/trig-worker".into()),
        ..TriangulationConfig::default()
    });

    let err = generator.features().unwrap_err();
    assert!(err.is_generation());
    assert!(feedback.errors().iter().any(|(message, fatal)| *fatal
        && message.starts_with("Triangulation worker failed")));
}

#[test]
fn test_from_yaml_config() {
    let yaml = r#"
expression: z
method: interval
params:
  interval: 1
classify_type: filled
extend: neither
origin: auto
labels:
  precision: 0
  units: " m"
"#;
    let config: GeneratorConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.origin, LocalOrigin::Auto);

    let points = lattice(4, 4, 1.0, |x, _| x + 100.0);
    let feedback = Arc::new(RecordingFeedback::new());
    let mut generator = ClassifyGenerator::from_config(Some(source(&points)), &config, feedback);
    assert_levels_approx_eq!(generator.levels().unwrap(), &[100.0, 101.0, 102.0, 103.0], 1e-12);

    let features = collect(&mut generator);
    assert_eq!(features.len(), 3);
    assert_eq!(features[0].label, "100 - 101 m");
    assert_approx_eq!(total_area(&features), 9.0, 1e-9);
    for feature in &features {
        if let Geometry::MultiPolygon(polygons) = &feature.geometry {
            assert!(polygons
                .iter()
                .flat_map(|p| &p.exterior)
                .all(|p| (0.0..=3.0).contains(&p.x) && (0.0..=3.0).contains(&p.y)));
        }
    }
    assert_eq!(generator.origin_offset(), (0.0, 0.0));
}
