use super::{Point2d, Vector2d};
use std::f64::consts::PI;

/// Linearly interpolates between `a` and `b`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Returns `count` evenly spaced values from `a` to `b`, including both ends.
///
/// A single sample yields `a`; zero samples yield nothing.
pub fn linspace(a: f64, b: f64, count: usize) -> impl Iterator<Item = f64> {
    let step = if count > 1 {
        (b - a) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count).map(move |i| a + step * i as f64)
}

/// Wraps an angle in radians into the interval `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let mut angle = angle % (2.0 * PI);
    if angle > PI {
        angle -= 2.0 * PI;
    }
    if angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// The unit vector pointing "forward" for the given heading.
///
/// A heading of zero points towards negative `y`.
pub fn heading(angle: f64) -> Vector2d {
    Vector2d::new(-angle.sin(), -angle.cos())
}

/// Moves a point `distance` units along the given heading.
pub fn project_forward(point: Point2d, angle: f64, distance: f64) -> Point2d {
    point + heading(angle) * distance
}
