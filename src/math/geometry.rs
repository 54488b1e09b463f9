use super::{lerp, Point2d};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A straight line segment between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment2d {
    /// The start of the segment.
    pub a: Point2d,
    /// The end of the segment.
    pub b: Point2d,
}

/// The point at which one segment touches another.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    /// The world space coordinates of the intersection.
    pub point: Point2d,
    /// The intersection parameter along the first segment, in `[0, 1]`.
    pub offset: f64,
}

impl LineSegment2d {
    /// Creates a line segment from its two end points.
    pub fn from_ends(a: Point2d, b: Point2d) -> Self {
        Self { a, b }
    }

    /// The end points as a two-vertex polygon.
    pub fn as_polygon(&self) -> [Point2d; 2] {
        [self.a, self.b]
    }

    /// Finds where this segment touches another one, if it does.
    pub fn intersect(&self, other: &LineSegment2d) -> Option<Touch> {
        segment_intersection(self.a, self.b, other.a, other.b)
    }
}

/// Intersects segment `ab` with segment `cd`.
///
/// The returned offset is measured along `ab`. Parallel or degenerate
/// segments never intersect.
pub fn segment_intersection(a: Point2d, b: Point2d, c: Point2d, d: Point2d) -> Option<Touch> {
    let t_top = (d.x - c.x) * (a.y - c.y) - (d.y - c.y) * (a.x - c.x);
    let u_top = (c.y - a.y) * (a.x - b.x) - (c.x - a.x) * (a.y - b.y);
    let bottom = (d.y - c.y) * (b.x - a.x) - (d.x - c.x) * (b.y - a.y);

    if bottom == 0.0 {
        return None;
    }

    let t = t_top / bottom;
    let u = u_top / bottom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(Touch {
            point: Point2d::new(lerp(a.x, b.x, t), lerp(a.y, b.y, t)),
            offset: t,
        })
    } else {
        None
    }
}

/// Returns true if any edge of `p1` crosses any edge of `p2`.
///
/// Polygons are implicitly closed. A two-vertex polygon is a single segment.
pub fn polygons_intersect(p1: &[Point2d], p2: &[Point2d]) -> bool {
    p1.iter()
        .circular_tuple_windows()
        .cartesian_product(p2.iter().circular_tuple_windows().collect_vec())
        .any(|((a, b), (c, d))| segment_intersection(*a, *b, *c, *d).is_some())
}
