//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};
pub use geometry::{polygons_intersect, segment_intersection, LineSegment2d, Touch};
pub use util::*;

mod geometry;
mod util;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;
