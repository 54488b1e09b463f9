use super::CarAttributes;
use crate::controls::Controls;
use crate::math::{project_forward, wrap_angle, Point2d};
use std::f64::consts::PI;

/// Idle steering eases the heading towards multiples of this angle.
const SNAP_ANGLE: f64 = PI / 18.0;

/// Applies throttle, the speed limits and friction to the speed.
///
/// Without throttle the speed moves towards zero by `friction` per tick
/// and never crosses it.
pub fn drive(speed: f64, controls: &Controls, attribs: &CarAttributes) -> f64 {
    let mut speed = speed;
    if controls.forward {
        speed += attribs.acceleration;
    }
    if controls.reverse {
        speed -= attribs.acceleration;
    }
    speed = speed.clamp(-attribs.reverse_speed, attribs.top_speed);

    if !controls.is_driving() {
        speed -= attribs.friction.min(speed.abs()).copysign(speed);
        if speed.abs() < attribs.friction {
            speed = 0.0;
        }
    }
    speed
}

/// Steers the car. Steering only works while moving and is mirrored in reverse.
pub fn turn(angle: f64, speed: f64, controls: &Controls, attribs: &CarAttributes) -> f64 {
    let direction = if speed > 0.0 {
        1.0
    } else if speed < 0.0 {
        -1.0
    } else {
        return angle;
    };

    let mut angle = angle;
    if controls.left {
        angle += direction * attribs.steering_force;
    }
    if controls.right {
        angle -= direction * attribs.steering_force;
    }
    wrap_angle(angle)
}

/// Moves the car along its heading.
pub fn advance(position: Point2d, angle: f64, speed: f64) -> Point2d {
    project_forward(position, angle, speed)
}

/// Eases the heading towards the nearest multiple of 10° while not steering.
pub fn snap_to_angle(angle: f64, controls: &Controls, attribs: &CarAttributes) -> f64 {
    if controls.is_steering() {
        return angle;
    }
    let target = (angle / SNAP_ANGLE).round() * SNAP_ANGLE;
    angle + (target - angle) * attribs.steering_force
}

/// Computes the corners of a `width` by `height` rectangle centred on
/// `position` and rotated to `angle`.
pub fn polygon(position: Point2d, angle: f64, width: f64, height: f64) -> [Point2d; 4] {
    let rad = f64::hypot(width, height) / 2.0;
    let alpha = f64::atan2(width, height);
    [
        angle - alpha,
        angle + alpha,
        angle + PI - alpha,
        angle + PI + alpha,
    ]
    .map(|corner| project_forward(position, corner, rad))
}
