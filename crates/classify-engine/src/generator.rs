//! Classification orchestration.
//!
//! [`ClassifyGenerator`] owns the configuration and every derived stage:
//!
//! ```text
//! source + expression ──► PointSet ──► GridLayout ──► ContourField
//!                            │                              │
//!                            └──► levels ──► labels ────────┴──► features
//! ```
//!
//! Each stage is computed on first use and cached until a setter changes one
//! of its inputs, at which point that stage and everything downstream of it is
//! dropped.

use std::collections::BTreeSet;
use std::iter::FusedIterator;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use classify_common::{
    AttributeValue, ClassifyError, ClassifyResult, ClassifyType, Crs, ExtendOption, Feedback,
    FieldDef, FieldType, Geometry, GeometryType, TracingFeedback,
};
use tracing::{debug, info, warn};

use crate::builder::{build_lines, build_polygons, PolygonBuild};
use crate::config::{GeneratorConfig, LocalOrigin, TriangulationConfig};
use crate::contour::{self, contour_band, contour_lines, Band, ContourField};
use crate::grid::{GridDetector, GridField, GridLayout};
use crate::labels::{LabelFormat, LabelFormatter};
use crate::levels::{calculate_levels, ClassifyMethod, ClassifyParams, LevelList};
use crate::loader::{load_points, LoadOptions, PointSet};
use crate::source::{FeatureId, FeatureSource};
use crate::triangulation::{build_mesh, panic_message};

/// Shared handle to a feature source.
pub type SharedSource = Arc<dyn FeatureSource + Send + Sync>;

/// Shared handle to a feedback sink.
pub type SharedFeedback = Arc<dyn Feedback + Send + Sync>;

/// Value attributes of an output feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    /// Line or layer level
    Level(f64),
    /// Filled band bounds, infinite on extended sides
    Range { min: f64, max: f64 },
}

/// One classified output feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyFeature {
    pub index: usize,
    pub value: FeatureValue,
    pub label: String,
    pub geometry: Geometry,
}

impl ClassifyFeature {
    /// Attribute values aligned with [`ClassifyGenerator::fields`].
    pub fn attributes(&self) -> Vec<AttributeValue> {
        let mut values = vec![AttributeValue::Int(self.index as i64)];
        match self.value {
            FeatureValue::Level(level) => values.push(AttributeValue::Double(level)),
            FeatureValue::Range { min, max } => {
                values.push(AttributeValue::Double(min));
                values.push(AttributeValue::Double(max));
            }
        }
        values.push(AttributeValue::Text(self.label.clone()));
        values
    }
}

/// Consumer of generated features.
pub trait FeatureSink {
    fn add_feature(
        &mut self,
        feature: &ClassifyFeature,
        attributes: &[AttributeValue],
    ) -> ClassifyResult<()>;
}

impl FeatureSink for Vec<ClassifyFeature> {
    fn add_feature(
        &mut self,
        feature: &ClassifyFeature,
        _attributes: &[AttributeValue],
    ) -> ClassifyResult<()> {
        self.push(feature.clone());
        Ok(())
    }
}

/// Generates classified contour features from a point source.
pub struct ClassifyGenerator {
    source: Option<SharedSource>,
    feedback: SharedFeedback,
    config: GeneratorConfig,

    points: Option<Arc<PointSet>>,
    offset: (f64, f64),
    grid: Option<Option<GridLayout>>,
    field: Option<Arc<ContourField>>,
    levels: Option<Vec<f64>>,
    formatter: Option<LabelFormatter>,
}

impl std::fmt::Debug for ClassifyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifyGenerator")
            .field("has_source", &self.source.is_some())
            .field("config", &self.config)
            .field("points", &self.points.as_ref().map(|p| p.len()))
            .field("levels", &self.levels)
            .finish()
    }
}

impl Default for ClassifyGenerator {
    fn default() -> Self {
        Self::new(Arc::new(TracingFeedback))
    }
}

impl ClassifyGenerator {
    /// A generator with default configuration and no data source.
    pub fn new(feedback: SharedFeedback) -> Self {
        Self {
            source: None,
            feedback,
            config: GeneratorConfig::default(),
            points: None,
            offset: (0.0, 0.0),
            grid: None,
            field: None,
            levels: None,
            formatter: None,
        }
    }

    /// Build a generator and apply every option of `config`.
    pub fn from_config(
        source: Option<SharedSource>,
        config: &GeneratorConfig,
        feedback: SharedFeedback,
    ) -> Self {
        let mut generator = Self::new(feedback);
        if let Some(source) = source {
            generator.set_data_source(source);
        }
        generator.set_expression(config.expression.clone(), config.field_name.clone());
        generator.set_feature_ids(config.feature_ids.clone());
        generator.set_duplicate_tolerance(config.duplicate_tolerance);
        generator.set_origin(config.origin);
        generator.set_use_grid(config.use_grid);
        generator.set_grid_tolerance(config.grid_tolerance);
        generator.set_triangulation(config.triangulation.clone());
        if let Some(method) = config.method {
            generator.set_method(method, config.params.clone());
        }
        generator.set_classify_type(config.classify_type);
        generator.set_extend(config.extend);
        generator.set_label_format(config.labels.clone());
        generator
    }

    /// Current configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    // === Setters ===

    pub fn set_data_source(&mut self, source: SharedSource) {
        self.source = Some(source);
        self.invalidate_data();
    }

    /// Set the z expression, and optionally the name its output field uses.
    pub fn set_expression(&mut self, expression: impl Into<String>, field_name: Option<String>) {
        self.config.expression = expression.into();
        self.config.field_name = field_name;
        self.invalidate_data();
    }

    pub fn set_feature_ids(&mut self, ids: Option<BTreeSet<FeatureId>>) {
        self.config.feature_ids = ids;
        self.invalidate_data();
    }

    /// Negative tolerances are treated as zero.
    pub fn set_duplicate_tolerance(&mut self, tolerance: f64) {
        self.config.duplicate_tolerance = tolerance.max(0.0);
        self.invalidate_data();
    }

    pub fn set_origin(&mut self, origin: LocalOrigin) {
        self.config.origin = origin;
        self.invalidate_data();
    }

    pub fn set_use_grid(&mut self, use_grid: bool) {
        self.config.use_grid = use_grid;
        self.field = None;
    }

    pub fn set_grid_tolerance(&mut self, tolerance: f64) {
        self.config.grid_tolerance = tolerance;
        self.grid = None;
        self.field = None;
    }

    pub fn set_triangulation(&mut self, triangulation: TriangulationConfig) {
        self.config.triangulation = triangulation;
        self.field = None;
    }

    pub fn set_method(&mut self, method: ClassifyMethod, params: ClassifyParams) {
        self.config.method = Some(method);
        self.config.params = params;
        self.invalidate_levels();
    }

    /// Use explicit levels (the manual method).
    pub fn set_levels(&mut self, levels: impl Into<LevelList>) {
        let params = ClassifyParams {
            levels: Some(levels.into()),
            ..ClassifyParams::default()
        };
        self.set_method(ClassifyMethod::Manual, params);
    }

    pub fn set_classify_type(&mut self, classify_type: ClassifyType) {
        self.config.classify_type = classify_type;
    }

    pub fn set_extend(&mut self, extend: ExtendOption) {
        self.config.extend = extend;
    }

    pub fn set_label_format(&mut self, format: LabelFormat) {
        self.config.labels = format;
        self.formatter = None;
    }

    fn invalidate_data(&mut self) {
        self.points = None;
        self.offset = (0.0, 0.0);
        self.grid = None;
        self.field = None;
        self.invalidate_levels();
    }

    fn invalidate_levels(&mut self) {
        self.levels = None;
        self.formatter = None;
    }

    // === Stages ===

    /// Report an error through the feedback sink as it leaves its stage.
    fn reported<T>(&self, result: ClassifyResult<T>) -> ClassifyResult<T> {
        if let Err(err) = &result {
            self.feedback.report_error(&err.to_string(), true);
        }
        result
    }

    /// Loaded points, in local coordinates when an origin is set.
    pub fn points(&mut self) -> ClassifyResult<Arc<PointSet>> {
        if let Some(points) = &self.points {
            return Ok(Arc::clone(points));
        }

        let source = self.reported(self.source.clone().ok_or(ClassifyError::DataNotDefined))?;
        if self.config.expression.trim().is_empty() {
            return self.reported(Err(ClassifyError::DataNotDefined));
        }
        let options = LoadOptions {
            expression: &self.config.expression,
            filter: self.config.feature_ids.as_ref(),
            duplicate_tolerance: self.config.duplicate_tolerance,
        };
        let loaded = self.reported(load_points(&*source, &options, &*self.feedback))?;

        let offset = match self.config.origin {
            LocalOrigin::None => (0.0, 0.0),
            LocalOrigin::Auto => loaded.min_corner(),
            LocalOrigin::Fixed { x, y } => (x, y),
        };
        let points = if offset == (0.0, 0.0) {
            loaded
        } else {
            loaded.localized(offset.0, offset.1)
        };
        info!(
            points = points.len(),
            expression = %self.config.expression,
            dx = offset.0,
            dy = offset.1,
            "Loaded classification points"
        );

        let points = Arc::new(points);
        self.offset = offset;
        self.points = Some(Arc::clone(&points));
        Ok(points)
    }

    /// Offset added to output coordinates.
    pub fn origin_offset(&self) -> (f64, f64) {
        self.offset
    }

    fn grid_layout(&mut self) -> ClassifyResult<Option<GridLayout>> {
        if let Some(layout) = &self.grid {
            return Ok(layout.clone());
        }
        let points = self.points()?;
        let layout = GridDetector::new(self.config.grid_tolerance).detect(points.x(), points.y());
        match &layout {
            Some(layout) => debug!(rows = layout.rows, cols = layout.cols, "Points form a grid"),
            None => debug!(points = points.len(), "Points are not gridded"),
        }
        self.grid = Some(layout.clone());
        Ok(layout)
    }

    /// Whether the points form a regular grid, regardless of `use_grid`.
    pub fn is_gridded(&mut self) -> ClassifyResult<bool> {
        Ok(self.grid_layout()?.is_some())
    }

    /// `(rows, cols)` of the detected grid.
    pub fn grid_shape(&mut self) -> ClassifyResult<Option<(usize, usize)>> {
        Ok(self.grid_layout()?.map(|layout| layout.shape()))
    }

    fn contour_field(&mut self) -> ClassifyResult<Arc<ContourField>> {
        if let Some(field) = &self.field {
            return Ok(Arc::clone(field));
        }
        let points = self.points()?;
        let layout = if self.config.use_grid {
            self.grid_layout()?
        } else {
            None
        };

        let field = match layout {
            Some(layout) => {
                self.feedback.push_info(&format!(
                    "Classifying {} by {} grid",
                    layout.rows, layout.cols
                ));
                ContourField::from_grid(&GridField::new(&points, &layout))
            }
            None => {
                self.feedback
                    .push_info(&format!("Triangulating {} points", points.len()));
                let triangulator = self.config.triangulation.triangulator();
                let mesh = self.reported(build_mesh(
                    &*triangulator,
                    points.x(),
                    points.y(),
                    self.config.triangulation.min_circle_ratio,
                ))?;
                self.feedback
                    .push_info(&format!("Classifying {} triangles", mesh.num_active()));
                self.reported(ContourField::from_mesh(&mesh, points.z()))?
            }
        };

        let field = Arc::new(field);
        self.field = Some(Arc::clone(&field));
        Ok(field)
    }

    /// Strictly increasing class boundaries for the current data and method.
    pub fn levels(&mut self) -> ClassifyResult<&[f64]> {
        if self.levels.is_none() {
            let points = self.points()?;
            let method = self.reported(self.config.method.ok_or(ClassifyError::MethodNotDefined))?;
            let levels =
                self.reported(calculate_levels(points.z(), method, &self.config.params))?;
            debug!(method = %method, count = levels.len(), "Calculated levels");
            self.levels = Some(levels);
        }
        Ok(self.levels.as_deref().unwrap_or_default())
    }

    fn formatter(&mut self) -> ClassifyResult<LabelFormatter> {
        if let Some(formatter) = &self.formatter {
            return Ok(formatter.clone());
        }
        let levels = self.levels()?.to_vec();
        let formatter = LabelFormatter::for_levels(&self.config.labels, &levels);
        self.formatter = Some(formatter.clone());
        Ok(formatter)
    }

    /// Decimal places used in labels.
    pub fn label_precision(&mut self) -> ClassifyResult<usize> {
        Ok(self.formatter()?.decimals())
    }

    /// Label for a single level.
    pub fn level_label(&mut self, level: f64) -> ClassifyResult<String> {
        Ok(self.formatter()?.level_label(level))
    }

    /// Label for a band, open ended when a bound is infinite.
    pub fn range_label(&mut self, min: f64, max: f64) -> ClassifyResult<String> {
        Ok(self.formatter()?.range_label(min, max))
    }

    /// Bands produced for filled output, including extended ones.
    pub fn filled_bands(&mut self) -> ClassifyResult<Vec<Band>> {
        let extend = self.config.extend;
        Ok(contour::filled_bands(self.levels()?, extend))
    }

    // === Output schema ===

    pub fn crs(&self) -> Crs {
        self.source
            .as_ref()
            .map(|source| source.crs().clone())
            .unwrap_or_default()
    }

    pub fn classify_type(&self) -> ClassifyType {
        self.config.classify_type
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.config.classify_type.geometry_type()
    }

    /// Output name of the value field.
    pub fn z_field_name(&self) -> String {
        let name = self
            .config
            .field_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.config.expression);
        sanitize_field_name(name.trim())
    }

    /// Attribute schema of the output features.
    pub fn fields(&self) -> Vec<FieldDef> {
        let name = self.z_field_name();
        let mut fields = vec![FieldDef::new("index", FieldType::Int)];
        match self.config.classify_type {
            ClassifyType::Filled => {
                fields.push(FieldDef::new(format!("{}_min", name), FieldType::Double));
                fields.push(FieldDef::new(format!("{}_max", name), FieldType::Double));
            }
            ClassifyType::Line | ClassifyType::Layer => {
                fields.push(FieldDef::new(name, FieldType::Double));
            }
        }
        fields.push(FieldDef::new("label", FieldType::String));
        fields
    }

    // === Features ===

    /// Lazily generated features for the current classify type.
    ///
    /// Data, levels and the contour field are prepared before this returns;
    /// geometry is extracted one feature at a time as the iterator is pulled.
    pub fn features(&mut self) -> ClassifyResult<FeatureIter> {
        let levels = self.levels()?.to_vec();
        let formatter = self.formatter()?;
        let field = self.contour_field()?;

        let jobs: Vec<Job> = match self.config.classify_type {
            ClassifyType::Line => levels
                .iter()
                .enumerate()
                .map(|(index, &level)| Job {
                    index,
                    value: FeatureValue::Level(level),
                    label: formatter.level_label(level),
                    shape: Shape::Line(level),
                })
                .collect(),
            ClassifyType::Filled => contour::filled_bands(&levels, self.config.extend)
                .into_iter()
                .enumerate()
                .map(|(index, band)| Job {
                    index,
                    value: FeatureValue::Range {
                        min: band.lo,
                        max: band.hi,
                    },
                    label: formatter.range_label(band.lo, band.hi),
                    shape: Shape::Band(band),
                })
                .collect(),
            ClassifyType::Layer => {
                let (zmin, zmax) = field.z_range();
                contour::layer_bands(&levels, zmin, zmax)
                    .into_iter()
                    .map(|(index, band)| Job {
                        index,
                        value: FeatureValue::Level(band.lo),
                        label: formatter.level_label(band.lo),
                        shape: Shape::Band(band),
                    })
                    .collect()
            }
        };

        debug!(
            classify_type = %self.config.classify_type,
            jobs = jobs.len(),
            cells = field.num_cells(),
            "Generating features"
        );
        Ok(FeatureIter {
            field,
            total: jobs.len(),
            jobs: jobs.into_iter(),
            completed: 0,
            offset: self.offset,
            feedback: Arc::clone(&self.feedback),
            invalid: 0,
            generated: 0,
            finished: false,
        })
    }

    /// Generate every feature into `sink`, returning the number written.
    pub fn write_features(&mut self, sink: &mut dyn FeatureSink) -> ClassifyResult<usize> {
        let mut count = 0;
        for feature in self.features()? {
            let feature = feature?;
            sink.add_feature(&feature, &feature.attributes())?;
            count += 1;
        }
        Ok(count)
    }
}

/// Field name derived from a display name or expression.
///
/// Expressions with parentheses become `expression`; a quoted identifier is
/// unquoted; runs of non-word characters become `_`; a leading digit is
/// prefixed with `_`.
fn sanitize_field_name(name: &str) -> String {
    if name.is_empty() {
        return "none".to_string();
    }
    if name.contains(|c: char| c == '(' || c == ')') {
        return "expression".to_string();
    }

    let unquoted;
    let name = if name.len() > 2 && name.starts_with('"') && name.ends_with('"') {
        unquoted = name[1..name.len() - 1].replace("\"\"", "\"");
        unquoted.as_str()
    } else {
        name
    };

    let mut out = String::with_capacity(name.len());
    let mut in_gap = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[derive(Debug, Clone)]
enum Shape {
    Line(f64),
    Band(Band),
}

#[derive(Debug, Clone)]
struct Job {
    index: usize,
    value: FeatureValue,
    label: String,
    shape: Shape,
}

/// Iterator over generated features.
///
/// Yields `Err` at most once (cancellation or an extraction failure) and then
/// ends. Levels with no geometry are skipped; polygons that do not survive
/// repair are counted and reported when iteration completes.
pub struct FeatureIter {
    field: Arc<ContourField>,
    jobs: std::vec::IntoIter<Job>,
    total: usize,
    completed: usize,
    offset: (f64, f64),
    feedback: SharedFeedback,
    invalid: usize,
    generated: usize,
    finished: bool,
}

impl std::fmt::Debug for FeatureIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIter")
            .field("total", &self.total)
            .field("completed", &self.completed)
            .field("generated", &self.generated)
            .field("invalid", &self.invalid)
            .field("finished", &self.finished)
            .finish()
    }
}

impl FeatureIter {
    fn extract(&mut self, shape: &Shape) -> ClassifyResult<Option<Geometry>> {
        let field = &*self.field;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match shape {
            Shape::Line(level) => Ok(build_lines(contour_lines(field, *level))
                .map(PolygonBuild::Valid)
                .unwrap_or(PolygonBuild::Empty)),
            Shape::Band(band) => contour_band(field, band).map(build_polygons),
        }))
        .map_err(|payload| {
            ClassifyError::generation(format!(
                "contour extraction panicked: {}",
                panic_message(payload.as_ref())
            ))
        })??;
        Ok(self.settle(shape, outcome))
    }

    /// Geometry in output coordinates, or `None` for empty and invalid results.
    fn settle(&mut self, shape: &Shape, outcome: PolygonBuild) -> Option<Geometry> {
        match outcome {
            PolygonBuild::Valid(mut geometry) => {
                let (dx, dy) = self.offset;
                if dx != 0.0 || dy != 0.0 {
                    geometry.translate(dx, dy);
                }
                Some(geometry)
            }
            PolygonBuild::Empty => None,
            PolygonBuild::Invalid => {
                self.invalid += 1;
                warn!(?shape, "Discarded invalid classify geometry");
                None
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.feedback.set_progress(0.0);
        if self.invalid > 0 {
            self.feedback.push_info(&format!(
                "{} invalid classify geometries discarded",
                self.invalid
            ));
        }
        info!(
            features = self.generated,
            invalid = self.invalid,
            "Classification complete"
        );
    }

    fn fail(&mut self, err: ClassifyError) -> Option<ClassifyResult<ClassifyFeature>> {
        self.finished = true;
        self.feedback.set_progress(0.0);
        self.feedback.report_error(&err.to_string(), true);
        Some(Err(err))
    }
}

impl Iterator for FeatureIter {
    type Item = ClassifyResult<ClassifyFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let Some(job) = self.jobs.next() else {
                self.finish();
                return None;
            };
            if self.feedback.is_canceled() {
                return self.fail(ClassifyError::Cancelled);
            }

            let result = self.extract(&job.shape);
            self.completed += 1;
            self.feedback
                .set_progress(100.0 * self.completed as f64 / self.total as f64);

            match result {
                Ok(Some(geometry)) => {
                    self.generated += 1;
                    return Some(Ok(ClassifyFeature {
                        index: job.index,
                        value: job.value,
                        label: job.label,
                        geometry,
                    }));
                }
                Ok(None) => continue,
                Err(err) => return self.fail(err),
            }
        }
    }
}

impl FusedIterator for FeatureIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use classify_common::RecordingFeedback;

    fn square_source() -> SharedSource {
        Arc::new(MemorySource::from_xyz(
            "z",
            &[0.0, 1.0, 1.0, 0.0],
            &[0.0, 0.0, 1.0, 1.0],
            &[0.0, 0.0, 1.0, 1.0],
            Crs::default(),
        ))
    }

    fn generator(feedback: Arc<RecordingFeedback>) -> ClassifyGenerator {
        let mut generator = ClassifyGenerator::new(feedback);
        generator.set_data_source(square_source());
        generator.set_expression("z", None);
        generator
    }

    #[test]
    fn test_sanitize_field_name() {
        assert_eq!(sanitize_field_name(""), "none");
        assert_eq!(sanitize_field_name("sqrt(z)"), "expression");
        assert_eq!(sanitize_field_name("\"my field\""), "my_field");
        assert_eq!(sanitize_field_name("\"a\"\"b\""), "a_b");
        assert_eq!(sanitize_field_name("depth - m"), "depth_m");
        assert_eq!(sanitize_field_name("2m_temp"), "_2m_temp");
        assert_eq!(sanitize_field_name("elev"), "elev");
    }

    #[test]
    fn test_fields_by_type() {
        let mut generator = ClassifyGenerator::default();
        generator.set_expression("depth", None);
        let names: Vec<String> = generator.fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["index", "depth", "label"]);

        generator.set_classify_type(ClassifyType::Filled);
        let fields = generator.fields();
        assert_eq!(fields[1], FieldDef::new("depth_min", FieldType::Double));
        assert_eq!(fields[2], FieldDef::new("depth_max", FieldType::Double));
        assert_eq!(generator.geometry_type(), GeometryType::MultiPolygon);

        generator.set_expression("depth", Some("Depth (m)".to_string()));
        assert_eq!(generator.z_field_name(), "expression");
    }

    #[test]
    fn test_levels_require_data_then_method() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = ClassifyGenerator::new(feedback.clone());
        assert_eq!(generator.levels().unwrap_err(), ClassifyError::DataNotDefined);

        generator.set_data_source(square_source());
        generator.set_expression("z", None);
        assert_eq!(generator.levels().unwrap_err(), ClassifyError::MethodNotDefined);
        assert_eq!(feedback.errors().len(), 2);
    }

    #[test]
    fn test_level_cache_invalidation() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = generator(feedback);
        generator.set_levels(vec![0.75, 0.25]);
        assert_eq!(generator.levels().unwrap(), &[0.25, 0.75]);
        assert_eq!(generator.label_precision().unwrap(), 2);

        generator.set_method(
            ClassifyMethod::Equal,
            ClassifyParams {
                n_classify: Some(4),
                ..ClassifyParams::default()
            },
        );
        assert_eq!(generator.levels().unwrap().len(), 5);
        assert_eq!(generator.level_label(0.5).unwrap(), "0.50");
    }

    #[test]
    fn test_line_feature_attributes() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = generator(feedback.clone());
        generator.set_levels(vec![0.5]);

        let mut features: Vec<ClassifyFeature> = Vec::new();
        assert_eq!(generator.write_features(&mut features).unwrap(), 1);
        let feature = &features[0];
        assert_eq!(feature.index, 0);
        assert_eq!(feature.label, "0.5");
        assert_eq!(
            feature.attributes(),
            vec![
                AttributeValue::Int(0),
                AttributeValue::Double(0.5),
                AttributeValue::Text("0.5".to_string()),
            ]
        );
        assert_eq!(feedback.progress().last(), Some(&0.0));
    }

    #[test]
    fn test_origin_translates_output() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = ClassifyGenerator::new(feedback);
        generator.set_data_source(Arc::new(MemorySource::from_xyz(
            "z",
            &[1000.0, 1001.0, 1001.0, 1000.0],
            &[500.0, 500.0, 501.0, 501.0],
            &[0.0, 0.0, 1.0, 1.0],
            Crs::default(),
        )));
        generator.set_expression("z", None);
        generator.set_origin(LocalOrigin::Auto);
        generator.set_levels(vec![0.5]);

        let points = generator.points().unwrap();
        assert_eq!(points.x()[0], 0.0);
        assert_eq!(generator.origin_offset(), (1000.0, 500.0));

        let feature = generator.features().unwrap().next().unwrap().unwrap();
        match feature.geometry {
            Geometry::MultiLineString(lines) => {
                for p in &lines[0] {
                    assert!((p.y - 500.5).abs() < 1e-9);
                    assert!(p.x >= 1000.0 && p.x <= 1001.0);
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_geometries_reported_once_at_end() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = generator(Arc::clone(&feedback));
        generator.set_classify_type(ClassifyType::Filled);
        generator.set_extend(ExtendOption::Neither);
        generator.set_levels(vec![0.0, 0.5, 1.0]);

        let mut iter = generator.features().unwrap();
        let mut infos = feedback.infos();
        let band = Shape::Band(Band::new(0.0, 0.5));
        assert!(iter.settle(&band, PolygonBuild::Invalid).is_none());
        assert!(iter.settle(&band, PolygonBuild::Empty).is_none());
        assert!(iter.settle(&band, PolygonBuild::Invalid).is_none());
        assert_eq!(feedback.infos(), infos);

        let features: Vec<ClassifyFeature> = iter.by_ref().collect::<ClassifyResult<_>>().unwrap();
        assert_eq!(features.len(), 2);
        infos.push("2 invalid classify geometries discarded".to_string());
        assert_eq!(feedback.infos(), infos);
        assert!(iter.next().is_none());
        assert_eq!(feedback.infos(), infos);
    }

    #[test]
    fn test_iterator_fused_after_cancel() {
        let feedback = Arc::new(RecordingFeedback::new());
        let mut generator = generator(feedback.clone());
        generator.set_levels(vec![0.25, 0.5, 0.75]);
        let mut features = generator.features().unwrap();
        assert!(features.next().unwrap().is_ok());

        feedback.cancel();
        assert_eq!(features.next().unwrap().unwrap_err(), ClassifyError::Cancelled);
        assert!(features.next().is_none());
    }
}
