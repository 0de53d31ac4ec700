//! Polygonal zones and the ray-casting containment test
//!
//! A zone is a closed simple polygon: the last vertex connects back to the
//! first. Bounding box, edges and the vertex y list are derived once at
//! construction; zones never change afterwards and are shared read-only by
//! every tag tracker.
//!
//! Boundary convention: a point lying exactly on an edge is outside.
//! Self-intersecting polygons give unspecified (but non-panicking) results.

use crate::domain::geometry::{intersects, Point, Segment};
use crate::domain::types::Rgb;
use smallvec::SmallVec;
use thiserror::Error;

/// Length of the containment ray, far beyond any real zone extent
pub const RAY_LENGTH: f64 = 1.0e24;

/// Minimum vertex count for a polygon
pub const MIN_VERTICES: usize = 3;

/// Indices into the shared zone list, ascending
pub type Membership = SmallVec<[usize; 4]>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneError {
    #[error("zone name is empty")]
    EmptyName,

    #[error("zone has {0} vertices, a polygon needs at least 3")]
    TooFewVertices(usize),

    #[error("vertex {index} has a non-finite coordinate")]
    NonFiniteVertex { index: usize },
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    fn around(points: &[Point]) -> Self {
        let mut bbox = Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in points {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        bbox
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// A named polygon with a display color
#[derive(Debug, Clone)]
pub struct Zone {
    name: String,
    vertices: Vec<Point>,
    color: Rgb,
    bbox: BoundingBox,
    edges: Vec<Segment>,
    vertex_ys: Vec<f64>,
}

impl Zone {
    pub fn new(name: impl Into<String>, vertices: Vec<Point>, color: Rgb) -> Result<Self, ZoneError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ZoneError::EmptyName);
        }
        if vertices.len() < MIN_VERTICES {
            return Err(ZoneError::TooFewVertices(vertices.len()));
        }
        if let Some(index) = vertices.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ZoneError::NonFiniteVertex { index });
        }

        let bbox = BoundingBox::around(&vertices);
        let n = vertices.len();
        let edges = (0..n).map(|i| Segment::new(vertices[i], vertices[(i + 1) % n])).collect();
        let vertex_ys = vertices.iter().map(|p| p.y).collect();

        Ok(Self { name, vertices, color, bbox, edges, vertex_ys })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn color(&self) -> Rgb {
        self.color
    }

    #[inline]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    #[inline]
    pub fn edges(&self) -> &[Segment] {
        &self.edges
    }

    /// Vertex average, used by the simulator to aim tags at zones
    pub fn centroid(&self) -> Point {
        let n = self.vertices.len() as f64;
        let (sx, sy) = self.vertices.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point::new(sx / n, sy / n)
    }

    /// Ray-casting point-in-polygon test
    pub fn contains(&self, point: Point) -> bool {
        if !self.bbox.contains(point) {
            return false;
        }
        if self.edges.iter().any(|edge| edge.touches(point)) {
            return false;
        }

        let ray = Segment::new(point, Point::new(point.x + RAY_LENGTH, point.y));
        let mut crossings = self.edges.iter().filter(|edge| intersects(&ray, edge)).count() as i64;

        // A ray through a vertex hits both edges meeting there. That is one
        // crossing unless the vertex is a global top or bottom.
        let (y_min, y_max) = (self.bbox.min_y, self.bbox.max_y);
        if point.y != y_max && point.y != y_min && self.vertex_ys.contains(&point.y) {
            let grazed = self.vertices.iter().filter(|v| v.y == point.y && v.x > point.x).count();
            crossings -= grazed as i64;
        }

        crossings.rem_euclid(2) == 1
    }
}

/// Indices of every zone containing `point`, in zone order
pub fn membership(zones: &[Zone], point: Point) -> Membership {
    zones
        .iter()
        .enumerate()
        .filter(|(_, zone)| zone.contains(point))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);

    fn zone(name: &str, vertices: &[[f64; 2]]) -> Zone {
        Zone::new(name, vertices.iter().copied().map(Point::from).collect(), RED).unwrap()
    }

    fn unit_square() -> Zone {
        zone("square", &[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
    }

    #[test]
    fn test_construction_derives_edges_and_bbox() {
        let z = zone("tri", &[[0.0, 0.0], [4.0, 1.0], [1.0, 3.0]]);
        assert_eq!(z.edges().len(), z.vertices().len());
        assert_eq!(z.edges()[2].p1(), Point::new(1.0, 3.0));
        assert_eq!(z.edges()[2].p2(), Point::new(0.0, 0.0));
        assert_eq!(
            *z.bounding_box(),
            BoundingBox { min_x: 0.0, max_x: 4.0, min_y: 0.0, max_y: 3.0 }
        );
    }

    #[test]
    fn test_construction_rejects_bad_input() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert_eq!(Zone::new("", pts.clone(), RED).unwrap_err(), ZoneError::EmptyName);
        assert_eq!(
            Zone::new("a", pts[..2].to_vec(), RED).unwrap_err(),
            ZoneError::TooFewVertices(2)
        );
        let mut nan = pts;
        nan[1].y = f64::NAN;
        assert_eq!(Zone::new("a", nan, RED).unwrap_err(), ZoneError::NonFiniteVertex { index: 1 });
    }

    #[test]
    fn test_unit_square() {
        let z = unit_square();
        assert!(z.contains(Point::new(0.5, 0.5)));
        assert!(!z.contains(Point::new(2.0, 2.0)));
        assert!(!z.contains(Point::new(-1.0, 0.5)));
    }

    #[test]
    fn test_boundary_is_outside() {
        let z = unit_square();
        for p in [[0.5, 1.0], [0.5, 0.0], [0.0, 0.5], [1.0, 0.5], [0.0, 0.0], [1.0, 1.0]] {
            assert!(!z.contains(Point::from(p)), "{:?} should be outside", p);
        }
    }

    #[test]
    fn test_ray_through_middle_vertex_counts_once() {
        // (10, 5) is neither the top nor the bottom of the triangle
        let z = zone("tri", &[[0.0, 0.0], [10.0, 5.0], [0.0, 10.0]]);
        assert!(z.contains(Point::new(2.0, 5.0)));
        assert!(z.contains(Point::new(9.0, 5.0)));
    }

    #[test]
    fn test_ray_through_reflex_vertex() {
        // Arrow notch: reflex vertex at (5, 5), notch opens to the right
        let z = zone("notch", &[[0.0, 0.0], [10.0, 0.0], [5.0, 5.0], [10.0, 10.0], [0.0, 10.0]]);
        assert!(z.contains(Point::new(2.0, 5.0)));
        assert!(!z.contains(Point::new(8.0, 5.0)));
        assert!(z.contains(Point::new(8.0, 1.0)));
    }

    #[test]
    fn test_ray_level_with_top_vertex() {
        // Diamond: ray at the apex height grazes the apex from the left
        let z = zone("diamond", &[[5.0, 0.0], [10.0, 5.0], [5.0, 10.0], [0.0, 5.0]]);
        assert!(z.contains(Point::new(5.0, 5.0)));
        assert!(z.contains(Point::new(1.0, 5.0)));
        assert!(!z.contains(Point::new(4.0, 10.0)));
    }

    #[test]
    fn test_concave_u_shape() {
        let z = zone(
            "u",
            &[[0.0, 0.0], [9.0, 0.0], [9.0, 9.0], [6.0, 9.0], [6.0, 3.0], [3.0, 3.0], [3.0, 9.0], [0.0, 9.0]],
        );
        assert!(z.contains(Point::new(1.5, 6.0)));
        assert!(z.contains(Point::new(7.5, 6.0)));
        assert!(!z.contains(Point::new(4.5, 6.0)));
        assert!(z.contains(Point::new(4.5, 1.5)));
    }

    #[test]
    fn test_duplicate_vertices_do_not_panic() {
        let z = zone("dup", &[[0.0, 0.0], [0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]);
        assert!(z.contains(Point::new(2.0, 2.0)));
        assert!(!z.contains(Point::new(5.0, 2.0)));
    }

    #[test]
    fn test_membership_reports_overlaps_in_order() {
        let zones = vec![
            zone("a", &[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]),
            zone("b", &[[20.0, 0.0], [30.0, 0.0], [30.0, 10.0], [20.0, 10.0]]),
            zone("c", &[[5.0, 5.0], [15.0, 5.0], [15.0, 15.0], [5.0, 15.0]]),
        ];
        assert_eq!(membership(&zones, Point::new(7.0, 7.0)).as_slice(), &[0, 2]);
        assert_eq!(membership(&zones, Point::new(25.0, 5.0)).as_slice(), &[1]);
        assert!(membership(&zones, Point::new(50.0, 50.0)).is_empty());
    }

    #[test]
    fn test_centroid() {
        assert_eq!(unit_square().centroid(), Point::new(0.5, 0.5));
    }
}
