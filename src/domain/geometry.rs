//! Planar geometry primitives used by zone containment
//!
//! Segments carry their line equation `a*x + b*y + c = 0`, computed once at
//! construction so the half-plane sign tests are a multiply-add per endpoint.

/// Cross-term magnitude below which two segments are treated as parallel.
///
/// Changing this value changes which near-tangent rays count as crossings.
pub const COLLINEAR_EPSILON: f64 = 1e-5;

/// A point in the tag coordinate plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// A line segment with precomputed line coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    p1: Point,
    p2: Point,
    a: f64,
    b: f64,
    c: f64,
}

impl Segment {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self {
            p1,
            p2,
            a: p2.y - p1.y,
            b: p1.x - p2.x,
            c: p2.x * p1.y - p1.x * p2.y,
        }
    }

    #[inline]
    pub fn p1(&self) -> Point {
        self.p1
    }

    #[inline]
    pub fn p2(&self) -> Point {
        self.p2
    }

    /// Signed value of the line equation at `p`; zero on the line
    #[inline]
    fn side(&self, p: Point) -> f64 {
        self.a * p.x + self.b * p.y + self.c
    }

    /// True when `other` lies strictly on one side of this segment's line
    #[inline]
    fn separates(&self, other: &Segment) -> bool {
        let d1 = self.side(other.p1);
        let d2 = self.side(other.p2);
        (d1 > 0.0 && d2 > 0.0) || (d1 < 0.0 && d2 < 0.0)
    }

    /// Whether `p` lies exactly on this segment (endpoints included)
    pub fn touches(&self, p: Point) -> bool {
        if self.side(p) != 0.0 {
            return false;
        }
        let (min_x, max_x) = min_max(self.p1.x, self.p2.x);
        let (min_y, max_y) = min_max(self.p1.y, self.p2.y);
        p.x >= min_x && p.x <= max_x && p.y >= min_y && p.y <= max_y
    }
}

#[inline]
fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Sign-test intersection of two segments.
///
/// Touching endpoints count as a crossing. Parallel or near-collinear pairs
/// never do, even when they overlap.
pub fn intersects(s1: &Segment, s2: &Segment) -> bool {
    if s1.separates(s2) || s2.separates(s1) {
        return false;
    }
    (s1.a * s2.b - s2.a * s1.b).abs() >= COLLINEAR_EPSILON
}
