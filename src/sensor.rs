use crate::math::{linspace, project_forward, LineSegment2d, Touch};
use crate::tuning::{ParameterSpec, Tunable};
use crate::util::{check_positive, check_within, ConfigError, Interval};
use crate::Pose;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::f64::consts::PI;

/// The attributes of a distance sensor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorAttributes {
    /// The number of rays cast each tick.
    pub ray_count: usize,
    /// The length of each ray in world units.
    pub ray_length: f64,
    /// The full angle covered by the fan of rays, in radians.
    pub ray_spread: f64,
}

impl Default for SensorAttributes {
    fn default() -> Self {
        Self {
            ray_count: 3,
            ray_length: 100.0,
            ray_spread: PI / 4.0,
        }
    }
}

impl SensorAttributes {
    /// Rejects a sensor without rays or with an impossible fan.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("ray_count", self.ray_count as f64)?;
        check_positive("ray_length", self.ray_length)?;
        check_within("ray_spread", self.ray_spread, Interval::new(0.0, 2.0 * PI))
    }
}

/// A fan of rays reporting the nearest obstacle along each ray.
#[derive(Clone, Debug)]
pub struct Sensor {
    attributes: SensorAttributes,
    /// The rays cast on the last update.
    rays: SmallVec<[LineSegment2d; 8]>,
    /// The nearest touch along each ray, if any.
    readings: SmallVec<[Option<Touch>; 8]>,
}

impl Sensor {
    /// Creates a sensor which has not cast any rays yet.
    pub fn new(attributes: &SensorAttributes) -> Self {
        Self {
            attributes: *attributes,
            rays: SmallVec::new(),
            readings: SmallVec::new(),
        }
    }

    /// The sensor's attributes.
    pub fn attributes(&self) -> &SensorAttributes {
        &self.attributes
    }

    /// The number of rays the next cast will produce.
    pub fn ray_count(&self) -> usize {
        self.attributes.ray_count
    }

    /// The rays cast on the last update.
    pub fn rays(&self) -> &[LineSegment2d] {
        &self.rays
    }

    /// The nearest touch along each ray on the last update.
    pub fn readings(&self) -> &[Option<Touch>] {
        &self.readings
    }

    /// Casts the rays and then measures them against the obstacles.
    pub fn update(&mut self, pose: Pose, obstacles: &[LineSegment2d]) {
        self.cast_rays(pose);
        self.update_readings(obstacles);
    }

    /// Rebuilds the fan of rays from the given pose.
    pub fn cast_rays(&mut self, pose: Pose) {
        let SensorAttributes {
            ray_count,
            ray_length,
            ray_spread,
        } = self.attributes;

        let offsets: SmallVec<[f64; 8]> = match ray_count {
            1 => smallvec::smallvec![0.0],
            n => linspace(-ray_spread / 2.0, ray_spread / 2.0, n).collect(),
        };

        self.rays = offsets
            .into_iter()
            .map(|offset| {
                let end = project_forward(pose.position, pose.angle + offset, ray_length);
                LineSegment2d::from_ends(pose.position, end)
            })
            .collect();
    }

    /// Finds the closest obstacle along each ray.
    pub fn update_readings(&mut self, obstacles: &[LineSegment2d]) {
        self.readings = self
            .rays
            .iter()
            .map(|ray| {
                obstacles
                    .iter()
                    .filter_map(|obstacle| ray.intersect(obstacle))
                    .min_by(|a, b| a.offset.total_cmp(&b.offset))
            })
            .collect();
    }

    /// The readings as network inputs.
    ///
    /// A clear ray reads `0`, a touch reads `1 - offset`, so nearer
    /// obstacles give stronger signals.
    pub fn inputs(&self) -> Vec<f64> {
        self.readings
            .iter()
            .map(|reading| reading.map_or(0.0, |touch| 1.0 - touch.offset))
            .collect()
    }
}

const SENSOR_PARAMETERS: &[ParameterSpec<Sensor>] = &[
    ParameterSpec {
        name: "rayCount",
        range: Interval::new(1.0, 100.0),
        step: 1.0,
        default: 3.0,
        get: |sensor| sensor.attributes.ray_count as f64,
        set: |sensor, value| sensor.attributes.ray_count = value.round() as usize,
    },
    ParameterSpec {
        name: "rayLength",
        range: Interval::new(1.0, 1000.0),
        step: 1.0,
        default: 100.0,
        get: |sensor| sensor.attributes.ray_length,
        set: |sensor, value| sensor.attributes.ray_length = value,
    },
    ParameterSpec {
        name: "raySpread",
        range: Interval::new(0.0, 2.0 * PI),
        step: 0.1,
        default: PI / 4.0,
        get: |sensor| sensor.attributes.ray_spread,
        set: |sensor, value| sensor.attributes.ray_spread = value,
    },
];

impl Tunable for Sensor {
    fn parameter_specs() -> &'static [ParameterSpec<Self>] {
        SENSOR_PARAMETERS
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use assert_approx_eq::assert_approx_eq;

    fn sensor(ray_count: usize, ray_spread: f64) -> Sensor {
        Sensor::new(&SensorAttributes {
            ray_count,
            ray_length: 100.0,
            ray_spread,
        })
    }

    fn ray_angle(ray: &LineSegment2d) -> f64 {
        let d = ray.b - ray.a;
        f64::atan2(-d.x, -d.y)
    }

    #[test]
    fn single_ray_points_forward() {
        let mut sensor = sensor(1, PI / 2.0);
        sensor.cast_rays(Pose::new(Point2d::new(0.0, 0.0), 0.3));
        assert_eq!(sensor.rays().len(), 1);
        assert_approx_eq!(ray_angle(&sensor.rays()[0]), 0.3);
    }

    #[test]
    fn rays_span_full_spread() {
        let mut sensor = sensor(5, PI / 2.0);
        sensor.cast_rays(Pose::new(Point2d::new(50.0, 50.0), 0.0));
        let angles: Vec<_> = sensor.rays().iter().map(ray_angle).collect();
        let expected = [-PI / 4.0, -PI / 8.0, 0.0, PI / 8.0, PI / 4.0];
        assert_eq!(angles.len(), 5);
        for (angle, expected) in angles.iter().zip(expected) {
            assert_approx_eq!(*angle, expected);
        }
        for ray in sensor.rays() {
            assert_approx_eq!((ray.b - ray.a).x.hypot((ray.b - ray.a).y), 100.0);
        }
    }

    #[test]
    fn nearest_touch_wins() {
        let mut sensor = sensor(1, 0.0);
        let near = LineSegment2d::from_ends(Point2d::new(-10.0, -25.0), Point2d::new(10.0, -25.0));
        let far = LineSegment2d::from_ends(Point2d::new(-10.0, -75.0), Point2d::new(10.0, -75.0));
        sensor.update(Pose::new(Point2d::new(0.0, 0.0), 0.0), &[far, near]);

        let touch = sensor.readings()[0].unwrap();
        assert_approx_eq!(touch.offset, 0.25);
        assert_approx_eq!(sensor.inputs()[0], 0.75);
    }

    #[test]
    fn clear_rays_read_zero() {
        let mut sensor = sensor(3, PI / 4.0);
        sensor.update(Pose::new(Point2d::new(0.0, 0.0), 0.0), &[]);
        assert_eq!(sensor.readings(), &[None, None, None]);
        assert_eq!(sensor.inputs(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn tuning_ray_count_resizes() {
        let mut sensor = sensor(3, PI / 4.0);
        let pose = Pose::new(Point2d::new(0.0, 0.0), 0.0);
        sensor.update(pose, &[]);
        sensor.set_parameter("rayCount", 7.0).unwrap();
        assert_eq!(sensor.readings().len(), 3);
        sensor.update(pose, &[]);
        assert_eq!(sensor.rays().len(), 7);
        assert_eq!(sensor.readings().len(), 7);
    }

    #[test]
    fn rejects_bad_attributes() {
        let defaults = SensorAttributes::default();
        assert!(defaults.validate().is_ok());
        assert_eq!(
            SensorAttributes { ray_count: 0, ..defaults }.validate(),
            Err(ConfigError::NotPositive { name: "ray_count", value: 0.0 })
        );
        assert!(SensorAttributes { ray_length: 0.0, ..defaults }.validate().is_err());
        assert!(SensorAttributes { ray_spread: -0.1, ..defaults }.validate().is_err());
    }
}
