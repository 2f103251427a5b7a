//! Synthetic point data generators.
//!
//! These generators create predictable, verifiable point sets that can be
//! used across the test suite and benchmarks. Everything random is driven by
//! a seeded `StdRng`, so a given seed always produces the same points.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Parallel coordinate and value arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct PointData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl PointData {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Replace z with `f(x, y)`.
    pub fn with_field(mut self, f: impl Fn(f64, f64) -> f64) -> Self {
        self.z = self.x.iter().zip(&self.y).map(|(&x, &y)| f(x, y)).collect();
        self
    }

    /// Move point `index` by `(dx, dy)`.
    pub fn perturbed(mut self, index: usize, dx: f64, dy: f64) -> Self {
        self.x[index] += dx;
        self.y[index] += dy;
        self
    }

    /// The same points in a seeded random order.
    pub fn shuffled(self, seed: u64) -> Self {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        Self {
            x: order.iter().map(|&i| self.x[i]).collect(),
            y: order.iter().map(|&i| self.y[i]).collect(),
            z: order.iter().map(|&i| self.z[i]).collect(),
        }
    }
}

/// Creates a `rows x cols` lattice in row-major order.
///
/// Point `(row, col)` sits at `(col * spacing, row * spacing)` and its value
/// is `f(x, y)`.
///
/// # Example
///
/// ```
/// use test_utils::lattice;
///
/// let points = lattice(3, 4, 1.0, |_, y| y);
/// assert_eq!(points.len(), 12);
/// assert_eq!(points.x[1], 1.0); // row 0, col 1
/// assert_eq!(points.z[4], 1.0); // row 1, col 0
/// ```
pub fn lattice(rows: usize, cols: usize, spacing: f64, f: impl Fn(f64, f64) -> f64) -> PointData {
    rotated_lattice(rows, cols, spacing, 0.0, f)
}

/// Creates a lattice rotated by `angle_degrees` about the origin.
pub fn rotated_lattice(
    rows: usize,
    cols: usize,
    spacing: f64,
    angle_degrees: f64,
    f: impl Fn(f64, f64) -> f64,
) -> PointData {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let mut points = PointData {
        x: Vec::with_capacity(rows * cols),
        y: Vec::with_capacity(rows * cols),
        z: Vec::with_capacity(rows * cols),
    };
    for row in 0..rows {
        for col in 0..cols {
            let u = col as f64 * spacing;
            let v = row as f64 * spacing;
            let x = u * cos - v * sin;
            let y = u * sin + v * cos;
            points.x.push(x);
            points.y.push(y);
            points.z.push(f(x, y));
        }
    }
    points
}

/// Creates `n` points uniformly scattered over `[0, width) x [0, height)`.
pub fn scattered(
    n: usize,
    width: f64,
    height: f64,
    seed: u64,
    f: impl Fn(f64, f64) -> f64,
) -> PointData {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = PointData {
        x: Vec::with_capacity(n),
        y: Vec::with_capacity(n),
        z: Vec::with_capacity(n),
    };
    for _ in 0..n {
        let x = rng.gen_range(0.0..width);
        let y = rng.gen_range(0.0..height);
        points.x.push(x);
        points.y.push(y);
        points.z.push(f(x, y));
    }
    points
}

/// Scalar fields to sample over generated points.
pub mod fields {
    /// Linear ramp `a*x + b*y`.
    pub fn plane(a: f64, b: f64) -> impl Fn(f64, f64) -> f64 {
        move |x, y| a * x + b * y
    }

    /// Single peak of height `peak` centred on `(cx, cy)`.
    pub fn gaussian_hill(cx: f64, cy: f64, sigma: f64, peak: f64) -> impl Fn(f64, f64) -> f64 {
        move |x, y| {
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            peak * (-d2 / (2.0 * sigma * sigma)).exp()
        }
    }

    /// Hyperbolic saddle `(x-cx)^2 - (y-cy)^2`.
    pub fn saddle(cx: f64, cy: f64) -> impl Fn(f64, f64) -> f64 {
        move |x, y| (x - cx).powi(2) - (y - cy).powi(2)
    }

    /// Smooth wave pattern in `[-1, 1]`.
    pub fn ripple(wavelength: f64) -> impl Fn(f64, f64) -> f64 {
        let k = std::f64::consts::TAU / wavelength;
        move |x, y| (k * x).sin() * (k * y).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_layout() {
        let points = lattice(3, 4, 2.0, |x, _| x);
        assert_eq!(points.len(), 12);
        assert_eq!((points.x[5], points.y[5]), (2.0, 2.0)); // row 1, col 1
        assert_eq!(points.z[3], 6.0);
    }

    #[test]
    fn test_rotated_lattice_preserves_spacing() {
        let points = rotated_lattice(2, 2, 1.0, 30.0, |_, _| 0.0);
        let d = (points.x[1] - points.x[0]).hypot(points.y[1] - points.y[0]);
        assert!((d - 1.0).abs() < 1e-12);
        assert!(points.y[1] > 0.0);
    }

    #[test]
    fn test_shuffle_deterministic() {
        let points = lattice(5, 5, 1.0, |x, y| x + 10.0 * y);
        let a = points.clone().shuffled(7);
        let b = points.clone().shuffled(7);
        assert_eq!(a, b, "Same seed should produce same order");
        assert_ne!(a, points);

        let mut z = a.z.clone();
        z.sort_by(f64::total_cmp);
        let mut expected = points.z.clone();
        expected.sort_by(f64::total_cmp);
        assert_eq!(z, expected);
    }

    #[test]
    fn test_scattered_bounds() {
        let points = scattered(200, 10.0, 5.0, 42, fields::plane(1.0, 0.0));
        assert_eq!(points.len(), 200);
        assert!(points.x.iter().all(|&x| (0.0..10.0).contains(&x)));
        assert!(points.y.iter().all(|&y| (0.0..5.0).contains(&y)));
        assert_eq!(points.z, points.x);
    }

    #[test]
    fn test_fields() {
        assert_eq!(fields::gaussian_hill(0.0, 0.0, 1.0, 5.0)(0.0, 0.0), 5.0);
        assert_eq!(fields::saddle(0.0, 0.0)(2.0, 1.0), 3.0);
        assert!(fields::ripple(4.0)(1.0, 0.0) > 0.99);
    }
}
