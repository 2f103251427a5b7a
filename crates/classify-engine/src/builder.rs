//! Conversion of raw contour paths into validated output geometry.

use classify_common::{point_in_ring, ring_area, Geometry, Point, Polygon};
use tracing::warn;

/// Outcome of building a polygon geometry from raw rings.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonBuild {
    /// No rings were supplied
    Empty,
    /// Rings were supplied but nothing valid survived repair
    Invalid,
    Valid(Geometry),
}

/// Multi-line geometry from paths with at least two vertices.
pub fn build_lines(paths: Vec<Vec<Point>>) -> Option<Geometry> {
    let lines: Vec<Vec<Point>> = paths.into_iter().filter(|p| p.len() >= 2).collect();
    if lines.is_empty() {
        None
    } else {
        Some(Geometry::MultiLineString(lines))
    }
}

/// Multi-polygon geometry from oriented rings (shells counter-clockwise,
/// holes clockwise).
///
/// Rings are repaired first, then each hole is assigned to the smallest shell
/// containing most of its vertices. A hole no shell contains becomes a shell.
pub fn build_polygons(rings: Vec<Vec<Point>>) -> PolygonBuild {
    if rings.is_empty() {
        return PolygonBuild::Empty;
    }

    let mut shells: Vec<Vec<Point>> = Vec::new();
    let mut holes: Vec<Vec<Point>> = Vec::new();
    for ring in rings {
        for part in repair_ring(ring) {
            if ring_area(&part) > 0.0 {
                shells.push(part);
            } else {
                holes.push(part);
            }
        }
    }

    let mut interiors: Vec<Vec<Vec<Point>>> = vec![Vec::new(); shells.len()];
    let shell_areas: Vec<f64> = shells.iter().map(|s| ring_area(s)).collect();
    let mut orphans = Vec::new();
    for hole in holes {
        let owner = shells
            .iter()
            .enumerate()
            .filter(|(_, shell)| mostly_inside(&hole, shell))
            .min_by(|(a, _), (b, _)| shell_areas[*a].total_cmp(&shell_areas[*b]))
            .map(|(i, _)| i);
        match owner {
            Some(i) => interiors[i].push(hole),
            None => orphans.push(hole),
        }
    }
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "Holes outside every shell treated as shells");
    }
    for mut orphan in orphans {
        orphan.reverse();
        shells.push(orphan);
        interiors.push(Vec::new());
    }

    if shells.is_empty() {
        return PolygonBuild::Invalid;
    }
    let polygons = shells
        .into_iter()
        .zip(interiors)
        .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
        .collect();
    PolygonBuild::Valid(Geometry::MultiPolygon(polygons))
}

fn mostly_inside(ring: &[Point], shell: &[Point]) -> bool {
    let inside = ring.iter().filter(|p| point_in_ring(**p, shell)).count();
    2 * inside > ring.len()
}

/// Repair one ring into zero or more simple rings with the same orientation.
pub fn repair_ring(ring: Vec<Point>) -> Vec<Vec<Point>> {
    let mut ring = remove_spikes(dedup_ring(ring));
    if ring.len() < 3 {
        return Vec::new();
    }

    let mut out = Vec::new();
    // Split at the first repeated vertex until none remain
    loop {
        let repeat = (0..ring.len()).find_map(|i| {
            (i + 1..ring.len())
                .find(|&j| ring[j] == ring[i])
                .map(|j| (i, j))
        });
        let Some((i, j)) = repeat else {
            break;
        };
        let loop_part: Vec<Point> = ring[i..j].to_vec();
        let mut rest: Vec<Point> = ring[..i].to_vec();
        rest.extend_from_slice(&ring[j..]);
        out.extend(repair_ring(loop_part));
        ring = remove_spikes(dedup_ring(rest));
        if ring.len() < 3 {
            ring.clear();
            break;
        }
    }
    if ring.len() >= 3 && ring_area(&ring) != 0.0 {
        out.push(ring);
    }
    out
}

fn dedup_ring(mut ring: Vec<Point>) -> Vec<Point> {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

/// Remove vertices where the ring doubles back on itself.
fn remove_spikes(mut ring: Vec<Point>) -> Vec<Point> {
    let mut changed = true;
    while changed && ring.len() >= 3 {
        changed = false;
        let n = ring.len();
        for i in 0..n {
            let a = ring[(i + n - 1) % n];
            let b = ring[i];
            let c = ring[(i + 1) % n];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            let dot = (b.x - a.x) * (c.x - b.x) + (b.y - a.y) * (c.y - b.y);
            if a == c || (cross == 0.0 && dot < 0.0) {
                ring.remove(i);
                ring = dedup_ring(ring);
                changed = true;
                break;
            }
        }
    }
    ring
}
