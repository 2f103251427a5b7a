//! Output geometry types.
//!
//! Rings are stored open: the closing vertex is implied and not repeated.

use serde::{Deserialize, Serialize};

/// A point in source (or local) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// A polygon with one exterior ring and zero or more holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    /// Area of the exterior minus the holes.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| ring_area(r).abs()).sum();
        ring_area(&self.exterior).abs() - holes
    }
}

/// A multi-part output geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    MultiLineString(Vec<Vec<Point>>),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::MultiLineString(lines) => lines.is_empty(),
            Geometry::MultiPolygon(polygons) => polygons.is_empty(),
        }
    }

    /// Number of parts (lines or polygons).
    pub fn num_parts(&self) -> usize {
        match self {
            Geometry::MultiLineString(lines) => lines.len(),
            Geometry::MultiPolygon(polygons) => polygons.len(),
        }
    }

    /// Total area of polygon parts; zero for lines.
    pub fn area(&self) -> f64 {
        match self {
            Geometry::MultiLineString(_) => 0.0,
            Geometry::MultiPolygon(polygons) => polygons.iter().map(Polygon::area).sum(),
        }
    }

    /// Shift every vertex by (dx, dy).
    pub fn translate(&mut self, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        let shift = |points: &mut Vec<Point>| {
            for p in points.iter_mut() {
                *p = p.translated(dx, dy);
            }
        };
        match self {
            Geometry::MultiLineString(lines) => lines.iter_mut().for_each(shift),
            Geometry::MultiPolygon(polygons) => {
                for polygon in polygons.iter_mut() {
                    shift(&mut polygon.exterior);
                    polygon.interiors.iter_mut().for_each(shift);
                }
            }
        }
    }
}

/// Signed area of an open ring (positive when counter-clockwise).
pub fn ring_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let p1 = ring[i];
        let p2 = ring[(i + 1) % n];
        area += p1.x * p2.y - p2.x * p1.y;
    }
    area * 0.5
}

/// Even-odd point in ring test. Points on the boundary may go either way.
pub fn point_in_ring(point: Point, ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = ring[i];
        let pj = ring[j];
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = pj.x + (point.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]
    }

    #[test]
    fn test_ring_area_orientation() {
        let mut ring = unit_square();
        assert!((ring_area(&ring) - 1.0).abs() < 1e-12);
        ring.reverse();
        assert!((ring_area(&ring) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_in_ring() {
        let ring = unit_square();
        assert!(point_in_ring(Point::new(0.5, 0.5), &ring));
        assert!(!point_in_ring(Point::new(1.5, 0.5), &ring));
    }

    #[test]
    fn test_translate() {
        let mut geom = Geometry::MultiPolygon(vec![Polygon::new(unit_square(), vec![])]);
        geom.translate(10.0, -5.0);
        if let Geometry::MultiPolygon(polys) = &geom {
            assert_eq!(polys[0].exterior[0], Point::new(10.0, -5.0));
        } else {
            panic!("expected polygon");
        }
        assert!((geom.area() - 1.0).abs() < 1e-12);
    }
}
