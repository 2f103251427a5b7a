//! Contour extraction from gridded or triangulated fields.
//!
//! Both field kinds are handled as a set of cells: counter-clockwise quads for
//! a grid, counter-clockwise triangles for a mesh. Lines come from the
//! marching squares table (grids) or one segment per crossing triangle, and
//! are joined into polylines. Bands clip every cell to `lo <= z < hi`; the
//! shared interior edges of neighbouring pieces cancel, leaving the band
//! outline as closed rings (outer rings counter-clockwise, holes clockwise).
//!
//! Crossing points are always interpolated from the edge's lower vertex index
//! to its higher one, so neighbouring cells produce bit-identical points and
//! segments and edges can be matched exactly.

use std::collections::HashMap;

use classify_common::{ring_area, ClassifyError, ClassifyResult, ExtendOption, Point};
use tracing::debug;

use crate::grid::GridField;
use crate::triangulation::TriMesh;

/// A closed band `[lo, hi)` of field values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lo: f64,
    pub hi: f64,
    /// Include `z == hi` (the top band of a non-extended range)
    pub closed_top: bool,
}

impl Band {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self {
            lo,
            hi,
            closed_top: false,
        }
    }

    #[inline]
    fn above_lo(&self, z: f64) -> bool {
        z >= self.lo
    }

    #[inline]
    fn below_hi(&self, z: f64) -> bool {
        if self.closed_top {
            z <= self.hi
        } else {
            z < self.hi
        }
    }

    #[inline]
    pub fn contains(&self, z: f64) -> bool {
        self.above_lo(z) && self.below_hi(z)
    }
}

/// Bands between consecutive levels, extended to infinity on the requested sides.
pub fn filled_bands(levels: &[f64], extend: ExtendOption) -> Vec<Band> {
    let mut bounds = Vec::with_capacity(levels.len() + 2);
    if extend.extends_below() {
        bounds.push(f64::NEG_INFINITY);
    }
    bounds.extend_from_slice(levels);
    if extend.extends_above() {
        bounds.push(f64::INFINITY);
    }
    let count = bounds.len().saturating_sub(1);
    bounds
        .windows(2)
        .enumerate()
        .map(|(i, w)| Band {
            lo: w[0],
            hi: w[1],
            closed_top: i + 1 == count && !extend.extends_above(),
        })
        .collect()
}

/// Threshold regions `z >= level` for levels above the field minimum.
///
/// Returns `(level index, band)` pairs. The upper bound sits above the field
/// maximum so each region is a closed band.
pub fn layer_bands(levels: &[f64], zmin: f64, zmax: f64) -> Vec<(usize, Band)> {
    let upper = zmax + (1.0 + zmax.abs());
    levels
        .iter()
        .enumerate()
        .filter(|&(_, &level)| level > zmin)
        .map(|(i, &level)| (i, Band::new(level, upper)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Topology {
    Grid { rows: usize, cols: usize },
    Triangles(Vec<[usize; 3]>),
}

/// Cell vertex indices, counter-clockwise. Triangles use the first three.
#[derive(Debug, Clone, Copy)]
struct Cell {
    vertices: [usize; 4],
    len: usize,
}

impl Cell {
    fn vertices(&self) -> &[usize] {
        &self.vertices[..self.len]
    }
}

/// A scalar field over gridded or triangulated points.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourField {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    topology: Topology,
}

impl ContourField {
    pub fn from_grid(grid: &GridField) -> Self {
        Self {
            x: grid.x.clone(),
            y: grid.y.clone(),
            z: grid.z.clone(),
            topology: Topology::Grid {
                rows: grid.rows,
                cols: grid.cols,
            },
        }
    }

    /// Field over the unmasked triangles of `mesh`.
    pub fn from_mesh(mesh: &TriMesh, z: &[f64]) -> ClassifyResult<Self> {
        if z.len() != mesh.x().len() {
            return Err(ClassifyError::generation(format!(
                "{} values for a mesh of {} vertices",
                z.len(),
                mesh.x().len()
            )));
        }
        Ok(Self {
            x: mesh.x().to_vec(),
            y: mesh.y().to_vec(),
            z: z.to_vec(),
            topology: Topology::Triangles(mesh.active_triangles().collect()),
        })
    }

    pub fn is_grid(&self) -> bool {
        matches!(self.topology, Topology::Grid { .. })
    }

    pub fn num_cells(&self) -> usize {
        match &self.topology {
            Topology::Grid { rows, cols } => rows.saturating_sub(1) * cols.saturating_sub(1),
            Topology::Triangles(triangles) => triangles.len(),
        }
    }

    /// Minimum and maximum value over all vertices.
    pub fn z_range(&self) -> (f64, f64) {
        crate::loader::value_range(&self.z)
    }

    fn cells(&self) -> Box<dyn Iterator<Item = Cell> + '_> {
        match &self.topology {
            Topology::Grid { rows, cols } => {
                let (rows, cols) = (*rows, *cols);
                Box::new((0..rows.saturating_sub(1)).flat_map(move |r| {
                    (0..cols.saturating_sub(1)).map(move |c| {
                        let i = r * cols + c;
                        Cell {
                            vertices: [i, i + 1, i + cols + 1, i + cols],
                            len: 4,
                        }
                    })
                }))
            }
            Topology::Triangles(triangles) => Box::new(triangles.iter().map(|&[a, b, c]| Cell {
                vertices: [a, b, c, 0],
                len: 3,
            })),
        }
    }

    #[inline]
    fn point(&self, i: usize) -> Point {
        Point::new(self.x[i], self.y[i])
    }

    /// Point where the edge between vertices `a` and `b` crosses `level`.
    fn crossing(&self, a: usize, b: usize, level: f64) -> Point {
        let (i, j) = if a < b { (a, b) } else { (b, a) };
        let (zi, zj) = (self.z[i], self.z[j]);
        let t = if zj == zi { 0.5 } else { (level - zi) / (zj - zi) };
        if t <= 0.0 {
            self.point(i)
        } else if t >= 1.0 {
            self.point(j)
        } else {
            Point::new(
                self.x[i] + t * (self.x[j] - self.x[i]),
                self.y[i] + t * (self.y[j] - self.y[i]),
            )
        }
    }

    fn centre_value(&self, cell: &Cell) -> f64 {
        let vertices = cell.vertices();
        vertices.iter().map(|&v| self.z[v]).sum::<f64>() / vertices.len() as f64
    }

    fn has_nan(&self, cell: &Cell) -> bool {
        cell.vertices().iter().any(|&v| self.z[v].is_nan())
    }
}

/// Contour lines of `field` at `level`, joined into polylines.
pub fn contour_lines(field: &ContourField, level: f64) -> Vec<Vec<Point>> {
    let mut segments = Vec::new();
    for cell in field.cells() {
        if field.has_nan(&cell) {
            continue;
        }
        if cell.len == 4 {
            march_square(field, &cell, level, &mut segments);
        } else {
            cross_triangle(field, &cell, level, &mut segments);
        }
    }
    let lines = connect_segments(&segments);
    debug!(level, segments = segments.len(), lines = lines.len(), "Extracted contour lines");
    lines
}

/// Marching squares for one quad.
///
/// Corners are `v0..v3` counter-clockwise and edge `k` runs from `v_k` to
/// `v_(k+1)`. Saddles join the high corners when the cell centre is at or
/// above the level, matching the band clipping.
fn march_square(field: &ContourField, cell: &Cell, level: f64, out: &mut Vec<(Point, Point)>) {
    let v = cell.vertices;
    let mut case = 0u8;
    for (bit, &i) in v.iter().enumerate() {
        if field.z[i] >= level {
            case |= 1 << bit;
        }
    }
    let edge = |k: usize| field.crossing(v[k], v[(k + 1) % 4], level);
    let high_joined = || field.centre_value(cell) >= level;

    let pairs: &[(usize, usize)] = match case {
        0 | 15 => &[],
        1 | 14 => &[(3, 0)],
        2 | 13 => &[(0, 1)],
        3 | 12 => &[(3, 1)],
        4 | 11 => &[(1, 2)],
        6 | 9 => &[(0, 2)],
        7 | 8 => &[(3, 2)],
        5 if high_joined() => &[(0, 1), (2, 3)],
        5 => &[(3, 0), (1, 2)],
        10 if high_joined() => &[(3, 0), (1, 2)],
        10 => &[(0, 1), (2, 3)],
        _ => &[],
    };
    for &(a, b) in pairs {
        out.push((edge(a), edge(b)));
    }
}

/// A triangle crossing the level contributes exactly one segment.
fn cross_triangle(field: &ContourField, cell: &Cell, level: f64, out: &mut Vec<(Point, Point)>) {
    let v = cell.vertices();
    let mut ends = Vec::with_capacity(2);
    for k in 0..3 {
        let (a, b) = (v[k], v[(k + 1) % 3]);
        if (field.z[a] >= level) != (field.z[b] >= level) {
            ends.push(field.crossing(a, b, level));
        }
    }
    if let [p, q] = ends[..] {
        out.push((p, q));
    }
}

type Key = (u64, u64);

/// Exact identity of a point; `-0.0` and `0.0` compare equal.
#[inline]
fn key(p: Point) -> Key {
    ((p.x + 0.0).to_bits(), (p.y + 0.0).to_bits())
}

/// Join segments sharing end points into polylines.
///
/// Closed loops repeat their first point at the end.
pub fn connect_segments(segments: &[(Point, Point)]) -> Vec<Vec<Point>> {
    let segments: Vec<(Point, Point)> = segments
        .iter()
        .copied()
        .filter(|(a, b)| key(*a) != key(*b))
        .collect();

    let mut at: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        at.entry(key(*a)).or_default().push(i);
        at.entry(key(*b)).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let next_unused = |end: Point, used: &mut Vec<bool>| -> Option<Point> {
        let candidates = at.get(&key(end))?;
        let i = candidates.iter().copied().find(|&i| !used[i])?;
        used[i] = true;
        let (a, b) = segments[i];
        Some(if key(a) == key(end) { b } else { a })
    };

    let mut lines = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut forward = vec![a, b];
        while let Some(p) = next_unused(*forward.last().unwrap_or(&b), &mut used) {
            forward.push(p);
        }
        let closed = forward.len() > 2 && key(forward[0]) == key(forward[forward.len() - 1]);
        if !closed {
            let mut backward = Vec::new();
            let mut end = a;
            while let Some(p) = next_unused(end, &mut used) {
                backward.push(p);
                end = p;
            }
            if !backward.is_empty() {
                backward.reverse();
                backward.extend(forward);
                forward = backward;
            }
        }
        lines.push(forward);
    }
    lines
}

/// One point on a cell boundary while clipping to a band.
#[derive(Debug, Clone, Copy)]
struct BoundaryPoint {
    point: Point,
    crossing: Option<Crossing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    bound: Bound,
    entering: bool,
    edge: usize,
}

/// Outline of the region of `field` inside `band` as closed rings.
pub fn contour_band(field: &ContourField, band: &Band) -> ClassifyResult<Vec<Vec<Point>>> {
    let mut pieces = Vec::new();
    for cell in field.cells() {
        if field.has_nan(&cell) {
            continue;
        }
        for ring in clip_cell(field, &cell, band) {
            if let Some(ring) = clean_ring(ring) {
                pieces.push(ring);
            }
        }
    }
    let rings = dissolve(&pieces)?;
    debug!(
        lo = band.lo,
        hi = band.hi,
        pieces = pieces.len(),
        rings = rings.len(),
        "Extracted band"
    );
    Ok(rings)
}

/// Clip one cell to the band, returning counter-clockwise pieces.
fn clip_cell(field: &ContourField, cell: &Cell, band: &Band) -> Vec<Vec<Point>> {
    let v = cell.vertices();
    let n = v.len();
    let inside: Vec<bool> = v.iter().map(|&i| band.contains(field.z[i])).collect();

    let mut points = Vec::with_capacity(2 * n + 4);
    for k in 0..n {
        let (a, b) = (v[k], v[(k + 1) % n]);
        let (za, zb) = (field.z[a], field.z[b]);
        if inside[k] {
            points.push(BoundaryPoint {
                point: field.point(a),
                crossing: None,
            });
        }
        let lower = (band.above_lo(za) != band.above_lo(zb)).then(|| BoundaryPoint {
            point: field.crossing(a, b, band.lo),
            crossing: Some(Crossing {
                bound: Bound::Lower,
                entering: !band.above_lo(za),
                edge: k,
            }),
        });
        let upper = (band.below_hi(za) != band.below_hi(zb)).then(|| BoundaryPoint {
            point: field.crossing(a, b, band.hi),
            crossing: Some(Crossing {
                bound: Bound::Upper,
                entering: !band.below_hi(za),
                edge: k,
            }),
        });
        // Along the edge the lower crossing comes first when z increases
        if za <= zb {
            points.extend(lower);
            points.extend(upper);
        } else {
            points.extend(upper);
            points.extend(lower);
        }
    }

    if points.iter().all(|p| p.crossing.is_none()) {
        return if inside.iter().all(|&i| i) {
            vec![v.iter().map(|&i| field.point(i)).collect()]
        } else {
            Vec::new()
        };
    }

    let m = points.len();
    let mut next: Vec<usize> = (1..=m).map(|i| i % m).collect();
    for bound in [Bound::Lower, Bound::Upper] {
        pair_crossings(field, cell, band, bound, &points, &mut next);
    }

    let mut visited = vec![false; m];
    let mut rings = Vec::new();
    for start in 0..m {
        if visited[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut i = start;
        while !visited[i] {
            visited[i] = true;
            ring.push(points[i].point);
            i = next[i];
        }
        rings.push(ring);
    }
    rings
}

/// Connect each exit crossing of `bound` to the entry crossing that continues
/// the band region inside the cell.
fn pair_crossings(
    field: &ContourField,
    cell: &Cell,
    band: &Band,
    bound: Bound,
    points: &[BoundaryPoint],
    next: &mut [usize],
) {
    let ours: Vec<usize> = (0..points.len())
        .filter(|&i| points[i].crossing.map_or(false, |c| c.bound == bound))
        .collect();
    let is_exit = |i: usize| points[i].crossing.map_or(false, |c| !c.entering);

    if ours.len() == 4 && cell.len == 4 {
        // Saddle: one crossing per edge
        let mut by_edge = [0usize; 4];
        for &i in &ours {
            if let Some(c) = points[i].crossing {
                by_edge[c.edge] = i;
            }
        }
        let in_region = |z: f64| match bound {
            Bound::Lower => band.above_lo(z),
            Bound::Upper => band.below_hi(z),
        };
        let joined = in_region(field.centre_value(cell));
        for k in 0..4 {
            // Joined regions cut off the outside corners, otherwise the inside ones
            if in_region(field.z[cell.vertices[k]]) == joined {
                continue;
            }
            let p = by_edge[(k + 3) % 4];
            let q = by_edge[k];
            if is_exit(p) {
                next[p] = q;
            } else {
                next[q] = p;
            }
        }
        return;
    }

    // Otherwise each exit joins the next entry around the cell
    let m = ours.len();
    for (pos, &i) in ours.iter().enumerate() {
        if !is_exit(i) {
            continue;
        }
        if let Some(&entry) = (1..m)
            .map(|d| &ours[(pos + d) % m])
            .find(|&&j| !is_exit(j))
        {
            next[i] = entry;
        }
    }
}

/// Remove consecutive repeats; drop rings with fewer than 3 points or no area.
fn clean_ring(mut ring: Vec<Point>) -> Option<Vec<Point>> {
    ring.dedup_by(|a, b| key(*a) == key(*b));
    while ring.len() > 1 && key(ring[0]) == key(ring[ring.len() - 1]) {
        ring.pop();
    }
    if ring.len() < 3 || ring_area(&ring) == 0.0 {
        return None;
    }
    Some(ring)
}

/// Merge pieces by cancelling edges traversed in both directions, then chain
/// the remaining edges into rings.
fn dissolve(pieces: &[Vec<Point>]) -> ClassifyResult<Vec<Vec<Point>>> {
    let mut points: HashMap<Key, Point> = HashMap::new();
    let mut edges: Vec<(Key, Key)> = Vec::new();
    let mut alive: Vec<bool> = Vec::new();
    let mut lookup: HashMap<(Key, Key), Vec<usize>> = HashMap::new();

    for ring in pieces {
        for (i, &a) in ring.iter().enumerate() {
            let b = ring[(i + 1) % ring.len()];
            let (ka, kb) = (key(a), key(b));
            points.entry(ka).or_insert(a);
            if let Some(j) = lookup.get_mut(&(kb, ka)).and_then(|v| v.pop()) {
                alive[j] = false;
                continue;
            }
            lookup.entry((ka, kb)).or_default().push(edges.len());
            edges.push((ka, kb));
            alive.push(true);
        }
    }

    let mut outgoing: HashMap<Key, Vec<usize>> = HashMap::new();
    for (i, &(ka, _)) in edges.iter().enumerate() {
        if alive[i] {
            outgoing.entry(ka).or_default().push(i);
        }
    }
    // Pop from the front to keep insertion order
    for list in outgoing.values_mut() {
        list.reverse();
    }

    let mut rings = Vec::new();
    for first in 0..edges.len() {
        if !alive[first] {
            continue;
        }
        let (start, mut cur) = edges[first];
        alive[first] = false;
        if let Some(list) = outgoing.get_mut(&start) {
            list.retain(|&e| e != first);
        }
        let mut ring = vec![points[&start]];
        while cur != start {
            ring.push(points[&cur]);
            let e = outgoing
                .get_mut(&cur)
                .and_then(|list| {
                    while let Some(e) = list.pop() {
                        if alive[e] {
                            return Some(e);
                        }
                    }
                    None
                })
                .ok_or_else(|| ClassifyError::generation("band outline is not closed"))?;
            alive[e] = false;
            cur = edges[e].1;
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }
    Ok(rings)
}
