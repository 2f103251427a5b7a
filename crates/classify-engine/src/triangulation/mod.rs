//! Triangulation of scattered points and flat-triangle masking.
//!
//! Delaunay triangulation is delegated to `spade`, either in process or in an
//! isolated worker process (see [`worker`]). The resulting [`TriMesh`] carries
//! a mask of degenerate triangles excluded from contouring.

pub mod worker;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use classify_common::{ClassifyError, ClassifyResult};
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};
use tracing::debug;

pub use worker::{WorkerTriangulator, TRIG_WORKER_ENV};

/// Default inscribed/circumscribed radius ratio below which hull triangles are masked.
pub const DEFAULT_MIN_CIRCLE_RATIO: f64 = 0.01;

/// Produces triangles (as point index triples) over scattered points.
pub trait Triangulator {
    fn triangulate(&self, x: &[f64], y: &[f64]) -> ClassifyResult<Vec<[usize; 3]>>;

    fn name(&self) -> &'static str;
}

/// A vertex that remembers its position in the input arrays.
#[derive(Debug, Clone, Copy)]
struct IndexedVertex {
    position: Point2<f64>,
    index: usize,
}

impl HasPosition for IndexedVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

/// Delaunay triangulation in the calling process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpadeTriangulator;

impl Triangulator for SpadeTriangulator {
    fn triangulate(&self, x: &[f64], y: &[f64]) -> ClassifyResult<Vec<[usize; 3]>> {
        if x.len() != y.len() {
            return Err(ClassifyError::generation(format!(
                "coordinate arrays differ in length ({} and {})",
                x.len(),
                y.len()
            )));
        }
        let vertices: Vec<IndexedVertex> = x
            .iter()
            .zip(y)
            .enumerate()
            .map(|(index, (&x, &y))| IndexedVertex {
                position: Point2::new(x, y),
                index,
            })
            .collect();

        let result = panic::catch_unwind(AssertUnwindSafe(move || {
            DelaunayTriangulation::<IndexedVertex>::bulk_load(vertices).map(|triangulation| {
                triangulation
                    .inner_faces()
                    .map(|face| face.vertices().map(|v| v.data().index))
                    .collect::<Vec<_>>()
            })
        }));

        match result {
            Ok(Ok(triangles)) => Ok(triangles),
            Ok(Err(err)) => Err(ClassifyError::generation(format!(
                "triangulation failed: {:?}",
                err
            ))),
            Err(payload) => Err(ClassifyError::generation(format!(
                "triangulation panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "spade"
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Triangle mesh over the point coordinates, with a mask of excluded triangles.
#[derive(Debug, Clone, PartialEq)]
pub struct TriMesh {
    x: Vec<f64>,
    y: Vec<f64>,
    triangles: Vec<[usize; 3]>,
    mask: Vec<bool>,
}

impl TriMesh {
    /// Build a mesh, orienting every triangle counter-clockwise.
    pub fn new(x: Vec<f64>, y: Vec<f64>, triangles: Vec<[usize; 3]>) -> ClassifyResult<Self> {
        let n = x.len();
        if y.len() != n {
            return Err(ClassifyError::generation("mesh coordinate arrays differ in length"));
        }
        let mut oriented = Vec::with_capacity(triangles.len());
        for [a, b, c] in triangles {
            if a >= n || b >= n || c >= n {
                return Err(ClassifyError::generation(format!(
                    "triangle [{}, {}, {}] references a vertex outside 0..{}",
                    a, b, c, n
                )));
            }
            if a == b || b == c || a == c {
                return Err(ClassifyError::generation(format!(
                    "triangle [{}, {}, {}] repeats a vertex",
                    a, b, c
                )));
            }
            let area = signed_area(&x, &y, [a, b, c]);
            oriented.push(if area < 0.0 { [a, c, b] } else { [a, b, c] });
        }
        let mask = vec![false; oriented.len()];
        Ok(Self {
            x,
            y,
            triangles: oriented,
            mask,
        })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Triangles not excluded by the mask.
    pub fn active_triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.triangles
            .iter()
            .zip(&self.mask)
            .filter(|(_, masked)| !**masked)
            .map(|(t, _)| *t)
    }

    pub fn num_active(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }

    /// Mask zero-area triangles, then peel thin triangles off the hull.
    ///
    /// A hull triangle whose inscribed/circumscribed radius ratio is below
    /// `min_circle_ratio` is masked; its neighbours may then become hull
    /// triangles and are tested in turn.
    pub fn apply_flat_mask(&mut self, min_circle_ratio: f64) -> usize {
        let mut masked = 0;
        for (i, tri) in self.triangles.iter().enumerate() {
            if !self.mask[i] && signed_area(&self.x, &self.y, *tri) == 0.0 {
                self.mask[i] = true;
                masked += 1;
            }
        }

        let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (i, &[a, b, c]) in self.triangles.iter().enumerate() {
            for (p, q) in [(a, b), (b, c), (c, a)] {
                edges.entry((p.min(q), p.max(q))).or_default().push(i);
            }
        }

        let mut pending: Vec<usize> = (0..self.triangles.len()).collect();
        while let Some(i) = pending.pop() {
            if self.mask[i] || !self.on_boundary(i, &edges) {
                continue;
            }
            if circle_ratio(&self.x, &self.y, self.triangles[i]) >= min_circle_ratio {
                continue;
            }
            self.mask[i] = true;
            masked += 1;
            let [a, b, c] = self.triangles[i];
            for (p, q) in [(a, b), (b, c), (c, a)] {
                if let Some(owners) = edges.get(&(p.min(q), p.max(q))) {
                    pending.extend(owners.iter().copied().filter(|&j| j != i && !self.mask[j]));
                }
            }
        }

        debug!(
            triangles = self.triangles.len(),
            masked,
            min_circle_ratio,
            "Applied flat triangle mask"
        );
        masked
    }

    fn on_boundary(&self, i: usize, edges: &HashMap<(usize, usize), Vec<usize>>) -> bool {
        let [a, b, c] = self.triangles[i];
        [(a, b), (b, c), (c, a)].iter().any(|&(p, q)| {
            edges
                .get(&(p.min(q), p.max(q)))
                .map_or(true, |owners| owners.iter().all(|&j| j == i || self.mask[j]))
        })
    }
}

fn signed_area(x: &[f64], y: &[f64], [a, b, c]: [usize; 3]) -> f64 {
    0.5 * ((x[b] - x[a]) * (y[c] - y[a]) - (x[c] - x[a]) * (y[b] - y[a]))
}

/// Ratio of inscribed to circumscribed circle radius, 0.5 for an equilateral triangle.
fn circle_ratio(x: &[f64], y: &[f64], tri: [usize; 3]) -> f64 {
    let [a, b, c] = tri;
    let la = (x[b] - x[c]).hypot(y[b] - y[c]);
    let lb = (x[a] - x[c]).hypot(y[a] - y[c]);
    let lc = (x[a] - x[b]).hypot(y[a] - y[b]);
    let area = signed_area(x, y, tri).abs();
    let denominator = (la + lb + lc) * la * lb * lc;
    if denominator <= 0.0 {
        return 0.0;
    }
    8.0 * area * area / denominator
}

/// Triangulate `(x, y)` and apply the flat mask.
pub fn build_mesh(
    triangulator: &dyn Triangulator,
    x: &[f64],
    y: &[f64],
    min_circle_ratio: f64,
) -> ClassifyResult<TriMesh> {
    let triangles = triangulator.triangulate(x, y)?;
    let mut mesh = TriMesh::new(x.to_vec(), y.to_vec(), triangles)?;
    mesh.apply_flat_mask(min_circle_ratio);
    if mesh.num_active() == 0 {
        return Err(ClassifyError::generation(
            "triangulation produced no usable triangles (are the points collinear?)",
        ));
    }
    debug!(
        triangulator = triangulator.name(),
        points = x.len(),
        triangles = mesh.num_active(),
        "Built triangle mesh"
    );
    Ok(mesh)
}
