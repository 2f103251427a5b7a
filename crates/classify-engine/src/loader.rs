//! Point loading: extract `(x, y, z)` from a feature source.

use std::collections::BTreeSet;

use classify_common::{ClassifyError, ClassifyResult, Feedback};
use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use tracing::debug;

use crate::expression::ValueExpression;
use crate::source::{FeatureId, FeatureSource, InputGeometry};

/// Minimum number of points anything can be classified from.
pub const MIN_POINTS: usize = 3;

/// Approximate length of one degree of latitude in metres.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Validated point data with equal-length coordinate and value arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl PointSet {
    /// Build a point set, requiring equal lengths and at least [`MIN_POINTS`] points.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> ClassifyResult<Self> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(ClassifyError::invalid_parameter(
                "points",
                format!(
                    "coordinate arrays differ in length ({}, {}, {})",
                    x.len(),
                    y.len(),
                    z.len()
                ),
            ));
        }
        if x.len() < MIN_POINTS {
            return Err(ClassifyError::TooFewPoints { count: x.len() });
        }
        Ok(Self { x, y, z })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Minimum and maximum z.
    pub fn z_range(&self) -> (f64, f64) {
        value_range(&self.z)
    }

    /// Lower-left corner of the coordinate bounding box.
    pub fn min_corner(&self) -> (f64, f64) {
        (value_range(&self.x).0, value_range(&self.y).0)
    }

    /// A copy with coordinates shifted by (-dx, -dy).
    pub fn localized(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x.iter().map(|v| v - dx).collect(),
            y: self.y.iter().map(|v| v - dy).collect(),
            z: self.z.clone(),
        }
    }
}

pub(crate) fn value_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// What to load from a source.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    /// Field name or value expression
    pub expression: &'a str,
    /// Restrict loading to these feature ids
    pub filter: Option<&'a BTreeSet<FeatureId>>,
    /// Points closer than this are merged (0 disables)
    pub duplicate_tolerance: f64,
}

/// Load and validate points from `source`.
///
/// Features whose value is NULL are skipped. Any non-point geometry or
/// non-numeric value fails the whole load.
pub fn load_points(
    source: &dyn FeatureSource,
    options: &LoadOptions<'_>,
    feedback: &dyn Feedback,
) -> ClassifyResult<PointSet> {
    let result = read_features(source, options, feedback);
    feedback.set_progress(0.0);
    let (mut x, mut y, mut z) = result?;

    let npt = x.len();
    if options.duplicate_tolerance > 0.0 && npt > 0 {
        let keep = discard_duplicate_points(
            &x,
            &y,
            options.duplicate_tolerance,
            source.crs().is_geographic(),
        );
        if keep.len() < npt {
            x = keep.iter().map(|&i| x[i]).collect();
            y = keep.iter().map(|&i| y[i]).collect();
            z = keep.iter().map(|&i| z[i]).collect();
            feedback.push_info(&format!(
                "{} near duplicate points discarded - tolerance {}",
                npt - keep.len(),
                options.duplicate_tolerance
            ));
        }
    }

    debug!(
        expression = options.expression,
        loaded = npt,
        kept = x.len(),
        "Loaded points"
    );

    PointSet::new(x, y, z)
}

type Columns = (Vec<f64>, Vec<f64>, Vec<f64>);

fn read_features(
    source: &dyn FeatureSource,
    options: &LoadOptions<'_>,
    feedback: &dyn Feedback,
) -> ClassifyResult<Columns> {
    let fields = source.fields();
    let expression = ValueExpression::for_fields(options.expression, fields)?;
    let prepared = expression.prepare(fields)?;

    let total = source.feature_count();
    let percent = if total > 0 { 100.0 / total as f64 } else { 0.0 };

    let mut x = Vec::with_capacity(total);
    let mut y = Vec::with_capacity(total);
    let mut z = Vec::with_capacity(total);

    for (current, feature) in source.features(options.filter).enumerate() {
        if feedback.is_canceled() {
            return Err(ClassifyError::Cancelled);
        }
        feedback.set_progress((current as f64 * percent).min(100.0));

        let value = match prepared.evaluate(&feature.attributes)?.to_number()? {
            Some(v) => v,
            None => continue,
        };
        if !value.is_finite() {
            return Err(ClassifyError::NotNumber(value.to_string()));
        }
        match feature.geometry {
            InputGeometry::Point(p) => {
                x.push(p.x);
                y.push(p.y);
                z.push(value);
            }
            other => return Err(ClassifyError::InvalidGeometry(other.type_name().to_string())),
        }
    }
    Ok((x, y, z))
}

/// Indices of the points to keep after merging points closer than `tolerance`.
///
/// The first point of each near-duplicate group is kept and input order is
/// preserved. For geographic coordinates the tolerance is in metres.
pub fn discard_duplicate_points(x: &[f64], y: &[f64], tolerance: f64, geographic: bool) -> Vec<usize> {
    let n = x.len().min(y.len());
    if tolerance <= 0.0 || n == 0 {
        return (0..n).collect();
    }

    let (sx, sy) = if geographic {
        let mean_lat = y[..n].iter().sum::<f64>() / n as f64;
        let coslat = mean_lat.to_radians().cos().abs().max(1e-6);
        (METRES_PER_DEGREE * coslat, METRES_PER_DEGREE)
    } else {
        (1.0, 1.0)
    };

    let mut tree: KdTree<f64, usize, [f64; 2]> = KdTree::with_capacity(2, 64);
    let mut keep = Vec::with_capacity(n);

    for i in 0..n {
        let point = [x[i] * sx, y[i] * sy];
        // Non-finite coordinates are rejected by the tree; keep such points as they are.
        let duplicate = tree
            .within(&point, tolerance * tolerance, &squared_euclidean)
            .map(|found| !found.is_empty())
            .unwrap_or(false);
        if !duplicate {
            if let Err(e) = tree.add(point, i) {
                debug!(index = i, error = ?e, "Point not indexed for duplicate search");
            }
            keep.push(i);
        }
    }
    keep
}
