//! Structured grid detection for unordered point sets.
//!
//! Points that lie on a complete, regularly spaced rectangular lattice (in any
//! order, optionally rotated) can be contoured with marching squares instead of
//! a triangulation. The detector infers the lattice axes from the nearest
//! neighbour of the first point, clusters the rotated coordinates into rows and
//! columns and checks that every lattice position is occupied exactly once.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::PointSet;

/// Default tolerance as a fraction of the smallest point spacing.
pub const DEFAULT_GRID_TOLERANCE: f64 = 0.01;

/// Grid topology recovered from a point set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    /// `order[k]` is the point index at row-major grid position `k`
    pub order: Vec<usize>,
}

impl GridLayout {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Inverse permutation: grid position of each point index.
    pub fn positions(&self) -> Vec<usize> {
        let mut positions = vec![0; self.order.len()];
        for (k, &i) in self.order.iter().enumerate() {
            positions[i] = k;
        }
        positions
    }
}

/// Detects whether points form a regular rectangular grid.
#[derive(Debug, Clone, Copy)]
pub struct GridDetector {
    /// Allowed deviation as a fraction of the nearest neighbour distance
    pub relative_tolerance: f64,
}

impl Default for GridDetector {
    fn default() -> Self {
        Self {
            relative_tolerance: DEFAULT_GRID_TOLERANCE,
        }
    }
}

impl GridDetector {
    pub fn new(relative_tolerance: f64) -> Self {
        Self { relative_tolerance }
    }

    /// Detect a grid, returning its layout or `None` if the points are not gridded.
    pub fn detect(&self, x: &[f64], y: &[f64]) -> Option<GridLayout> {
        let n = x.len();
        if n < 4 || y.len() != n {
            return None;
        }

        let (nearest, spacing) = nearest_neighbour(x, y, 0)?;
        if spacing <= 0.0 || !spacing.is_finite() {
            return None;
        }
        let tol = self.relative_tolerance.max(0.0) * spacing;

        let angle = axis_angle(x[nearest] - x[0], y[nearest] - y[0]);
        let (sin, cos) = angle.sin_cos();
        let s: Vec<f64> = x.iter().zip(y).map(|(&x, &y)| x * cos + y * sin).collect();
        let t: Vec<f64> = x.iter().zip(y).map(|(&x, &y)| -x * sin + y * cos).collect();

        let (col_centres, col_of) = cluster(&s, tol);
        let (row_centres, row_of) = cluster(&t, tol);
        let (rows, cols) = (row_centres.len(), col_centres.len());

        if rows < 2 || cols < 2 || rows * cols != n {
            debug!(rows, cols, points = n, "Point clusters do not form a complete grid");
            return None;
        }
        if !regular(&col_centres, tol) || !regular(&row_centres, tol) {
            debug!(rows, cols, "Grid spacing is irregular");
            return None;
        }

        let mut order = vec![usize::MAX; n];
        for i in 0..n {
            let k = row_of[i] * cols + col_of[i];
            if order[k] != usize::MAX {
                return None;
            }
            order[k] = i;
        }

        debug!(rows, cols, angle_deg = angle.to_degrees(), "Detected regular grid");
        Some(GridLayout { rows, cols, order })
    }
}

/// Index and distance of the point closest to point `i`.
fn nearest_neighbour(x: &[f64], y: &[f64], i: usize) -> Option<(usize, f64)> {
    x.iter()
        .zip(y)
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(j, (&xj, &yj))| (j, (xj - x[i]).hypot(yj - y[i])))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Direction of a lattice axis, folded into (-45, 45] degrees.
fn axis_angle(dx: f64, dy: f64) -> f64 {
    let mut angle = dy.atan2(dx);
    while angle > FRAC_PI_4 {
        angle -= FRAC_PI_2;
    }
    while angle <= -FRAC_PI_4 {
        angle += FRAC_PI_2;
    }
    if angle.abs() < 1e-9 {
        0.0
    } else {
        angle
    }
}

/// Group values into clusters no wider than `tol`.
///
/// Returns the ascending cluster centres and the cluster of each value.
fn cluster(values: &[f64], tol: f64) -> (Vec<f64>, Vec<usize>) {
    let mut sorted: Vec<usize> = (0..values.len()).collect();
    sorted.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut centres = Vec::new();
    let mut assignment = vec![0; values.len()];
    let mut start = f64::NAN;
    let mut prev = f64::NAN;
    let mut sum = 0.0;
    let mut count = 0usize;

    for &i in &sorted {
        let v = values[i];
        if count > 0 && (v - prev > tol || v - start > tol) {
            centres.push(sum / count as f64);
            sum = 0.0;
            count = 0;
        }
        if count == 0 {
            start = v;
        }
        sum += v;
        count += 1;
        prev = v;
        assignment[i] = centres.len();
    }
    if count > 0 {
        centres.push(sum / count as f64);
    }
    (centres, assignment)
}

/// True when consecutive centres are equally spaced within `tol`.
fn regular(centres: &[f64], tol: f64) -> bool {
    let k = centres.len();
    if k < 2 {
        return false;
    }
    let step = (centres[k - 1] - centres[0]) / (k - 1) as f64;
    if step <= tol {
        return false;
    }
    centres.windows(2).all(|w| ((w[1] - w[0]) - step).abs() <= tol)
}

/// Point values reordered into row-major grid order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridField {
    pub rows: usize,
    pub cols: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl GridField {
    pub fn new(points: &PointSet, layout: &GridLayout) -> Self {
        let pick = |values: &[f64]| layout.order.iter().map(|&i| values[i]).collect::<Vec<_>>();
        Self {
            rows: layout.rows,
            cols: layout.cols,
            x: pick(points.x()),
            y: pick(points.y()),
            z: pick(points.z()),
        }
    }
}
