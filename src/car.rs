use crate::controls::{ControlType, Controls};
use crate::math::{polygons_intersect, wrap_angle, LineSegment2d, Point2d};
use crate::network::{NetworkError, NeuralNetwork};
use crate::sensor::{Sensor, SensorAttributes};
use crate::tuning::{ParameterSpec, Tunable};
use crate::util::{check_non_negative, check_positive, check_within, ConfigError, Interval};
use crate::CarSet;
use arrayvec::ArrayVec;
use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

mod dynamics;

/// The number of network outputs: forward, left, right and reverse.
pub const CONTROL_OUTPUTS: usize = 4;

/// The position and heading of a car.
///
/// A heading of zero faces negative `y`, which is "up" the road.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The centre of the car in world space.
    pub position: Point2d,
    /// The heading in radians, within `(-π, π]`.
    pub angle: f64,
}

impl Pose {
    /// Creates a new pose, wrapping the heading into `(-π, π]`.
    pub fn new(position: Point2d, angle: f64) -> Self {
        Self {
            position,
            angle: wrap_angle(angle),
        }
    }
}

/// The attributes of a simulated car.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarAttributes {
    /// The car's width in world units.
    pub width: f64,
    /// The car's length in world units.
    pub height: f64,
    /// The heading change per tick while steering, in radians.
    pub steering_force: f64,
    /// The maximum forward speed per tick.
    pub top_speed: f64,
    /// The maximum reverse speed per tick, as a positive number.
    pub reverse_speed: f64,
    /// The speed gained per tick of throttle.
    pub acceleration: f64,
    /// The speed lost per tick without throttle.
    pub friction: f64,
}

impl Default for CarAttributes {
    fn default() -> Self {
        Self {
            width: 30.0,
            height: 50.0,
            steering_force: 0.03,
            top_speed: 3.0,
            reverse_speed: 2.0,
            acceleration: 0.035,
            friction: 0.01,
        }
    }
}

impl CarAttributes {
    /// Rejects attributes which would produce a degenerate body or an empty speed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("width", self.width)?;
        check_positive("height", self.height)?;
        check_non_negative("steering_force", self.steering_force)?;
        check_non_negative("top_speed", self.top_speed)?;
        check_non_negative("reverse_speed", self.reverse_speed)?;
        check_non_negative("acceleration", self.acceleration)?;
        check_within("friction", self.friction, Interval::new(0.0, 1.0))
    }
}

/// A simulated car.
#[derive(Clone, Debug)]
pub struct Car {
    /// Insertion order, used to break ties between equally placed cars.
    pub(crate) seq: usize,
    /// Who drives the car.
    control_type: ControlType,
    attributes: CarAttributes,
    pose: Pose,
    /// Signed speed along the heading, per tick.
    speed: f64,
    /// The corners of the car, rebuilt every update.
    polygon: [Point2d; 4],
    /// Set on the first collision and never cleared.
    damaged: bool,
    controls: Controls,
    sensor: Option<Sensor>,
    network: Option<NeuralNetwork>,
    /// Whether a sensor/network size mismatch has already been reported.
    mismatch_reported: bool,
}

impl Car {
    fn new(
        control_type: ControlType,
        attributes: &CarAttributes,
        pose: Pose,
        sensor: Option<Sensor>,
        network: Option<NeuralNetwork>,
    ) -> Self {
        // Poses read from a config file bypass `Pose::new`.
        let pose = Pose::new(pose.position, pose.angle);
        Self {
            seq: 0,
            control_type,
            attributes: *attributes,
            pose,
            speed: 0.0,
            polygon: dynamics::polygon(pose.position, pose.angle, attributes.width, attributes.height),
            damaged: false,
            controls: Controls::new(control_type),
            sensor,
            network,
            mismatch_reported: false,
        }
    }

    /// Creates a car driven through [Car::set_controls].
    pub fn player(attributes: &CarAttributes, pose: Pose, sensor: &SensorAttributes) -> Self {
        Self::new(ControlType::Player, attributes, pose, Some(Sensor::new(sensor)), None)
    }

    /// Creates a scripted car which always drives forward and has no sensor.
    pub fn cpu(attributes: &CarAttributes, pose: Pose) -> Self {
        Self::new(ControlType::Cpu, attributes, pose, None, None)
    }

    /// Creates a car driven by the given network, which must take one input
    /// per sensor ray and produce [CONTROL_OUTPUTS] outputs.
    pub fn ai(
        attributes: &CarAttributes,
        pose: Pose,
        sensor: &SensorAttributes,
        network: NeuralNetwork,
    ) -> Result<Self, NetworkError> {
        network.ensure_shape(sensor.ray_count, CONTROL_OUTPUTS)?;
        Ok(Self::new(
            ControlType::Ai,
            attributes,
            pose,
            Some(Sensor::new(sensor)),
            Some(network),
        ))
    }

    /// Creates a car driven by a fresh random network with the given hidden layers.
    pub fn random_ai(
        attributes: &CarAttributes,
        pose: Pose,
        sensor: &SensorAttributes,
        hidden: &[usize],
        rng: &mut impl Rng,
    ) -> Result<Self, NetworkError> {
        let topology = std::iter::once(sensor.ray_count)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(CONTROL_OUTPUTS))
            .collect_vec();
        let network = NeuralNetwork::new(&topology, rng)?;
        Self::ai(attributes, pose, sensor, network)
    }

    /// Who drives the car.
    pub fn control_type(&self) -> ControlType {
        self.control_type
    }

    /// The car's attributes.
    pub fn attributes(&self) -> &CarAttributes {
        &self.attributes
    }

    /// The car's position and heading.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// The coordinates in world space of the centre of the car.
    pub fn position(&self) -> Point2d {
        self.pose.position
    }

    /// The heading in radians.
    pub fn angle(&self) -> f64 {
        self.pose.angle
    }

    /// The signed speed along the heading.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Whether the car has crashed. Damaged cars never move again.
    pub fn is_damaged(&self) -> bool {
        self.damaged
    }

    /// The corners of the car.
    pub fn polygon(&self) -> &[Point2d; 4] {
        &self.polygon
    }

    /// The edges of the car, for other cars to collide with.
    pub fn hitbox(&self) -> ArrayVec<LineSegment2d, 4> {
        self.polygon
            .iter()
            .circular_tuple_windows()
            .map(|(a, b)| LineSegment2d::from_ends(*a, *b))
            .collect()
    }

    /// The current driving inputs.
    pub fn controls(&self) -> Controls {
        self.controls
    }

    /// Overrides the driving inputs, e.g. from a keyboard.
    ///
    /// A network driven car overwrites these on its next update.
    pub fn set_controls(&mut self, controls: Controls) {
        self.controls = controls;
    }

    /// The car's sensor, if it has one.
    pub fn sensor(&self) -> Option<&Sensor> {
        self.sensor.as_ref()
    }

    /// Mutable access to the sensor, for tuning.
    pub fn sensor_mut(&mut self) -> Option<&mut Sensor> {
        self.sensor.as_mut()
    }

    /// The network driving the car, if it has one.
    pub fn network(&self) -> Option<&NeuralNetwork> {
        self.network.as_ref()
    }

    /// Advances the car by one tick.
    ///
    /// # Parameters
    /// * `obstacles` - Every segment the car may collide with or see,
    ///   excluding the car's own hitbox.
    pub fn update(&mut self, obstacles: &[LineSegment2d]) {
        if !self.damaged {
            self.move_car();
        }

        let Pose { position, angle } = self.pose;
        self.polygon = dynamics::polygon(position, angle, self.attributes.width, self.attributes.height);

        if !self.damaged && self.assess_damage(obstacles) {
            log::debug!(
                "car #{} crashed at ({:.1}, {:.1})",
                self.seq,
                position.x,
                position.y
            );
            self.damaged = true;
        }

        if let Some(sensor) = &mut self.sensor {
            sensor.update(self.pose, obstacles);
            if let Some(network) = &self.network {
                match network.feed_forward(&sensor.inputs()) {
                    Ok(outputs) => {
                        self.controls.set_from_outputs(&outputs);
                        self.mismatch_reported = false;
                    }
                    Err(err) => {
                        if !self.mismatch_reported {
                            log::warn!("car #{} released its controls: {}", self.seq, err);
                            self.mismatch_reported = true;
                        }
                        self.controls = Controls::default();
                    }
                }
            }
        }
    }

    fn move_car(&mut self) {
        let attribs = &self.attributes;
        self.speed = dynamics::drive(self.speed, &self.controls, attribs);
        self.pose.angle = dynamics::turn(self.pose.angle, self.speed, &self.controls, attribs);
        self.pose.position = dynamics::advance(self.pose.position, self.pose.angle, self.speed);
        let angle = dynamics::snap_to_angle(self.pose.angle, &self.controls, attribs);
        self.pose.angle = wrap_angle(angle);
    }

    fn assess_damage(&self, obstacles: &[LineSegment2d]) -> bool {
        obstacles
            .iter()
            .any(|segment| polygons_intersect(&self.polygon, &segment.as_polygon()))
    }
}

/// Updates every car in the set against the shared obstacles and, when
/// `mutual` is set, against the hitboxes of the other cars in the set.
///
/// All hitboxes are taken before any car moves, so every car sees the same
/// snapshot of its neighbours.
pub(crate) fn update_cars(cars: &mut CarSet, shared: &[LineSegment2d], mutual: bool) {
    let hitboxes = if mutual {
        cars.iter().map(|(id, car)| (id, car.hitbox())).collect_vec()
    } else {
        vec![]
    };
    for (id, car) in cars.iter_mut() {
        let obstacles = shared
            .iter()
            .copied()
            .chain(
                hitboxes
                    .iter()
                    .filter(|(other, _)| *other != id)
                    .flat_map(|(_, hitbox)| hitbox.iter().copied()),
            )
            .collect_vec();
        car.update(&obstacles);
    }
}

const CAR_PARAMETERS: &[ParameterSpec<Car>] = &[
    ParameterSpec {
        name: "steeringForce",
        range: Interval::new(0.0, 0.1),
        step: 0.001,
        default: 0.03,
        get: |car| car.attributes.steering_force,
        set: |car, value| car.attributes.steering_force = value,
    },
    ParameterSpec {
        name: "topSpeed",
        range: Interval::new(0.0, 100.0),
        step: 0.2,
        default: 3.0,
        get: |car| car.attributes.top_speed,
        set: |car, value| car.attributes.top_speed = value,
    },
    ParameterSpec {
        name: "reverseSpeed",
        range: Interval::new(0.0, 10.0),
        step: 0.1,
        default: 2.0,
        get: |car| car.attributes.reverse_speed,
        set: |car, value| car.attributes.reverse_speed = value,
    },
    ParameterSpec {
        name: "acceleration",
        range: Interval::new(0.0, 1.0),
        step: 0.001,
        default: 0.035,
        get: |car| car.attributes.acceleration,
        set: |car, value| car.attributes.acceleration = value,
    },
    ParameterSpec {
        name: "friction",
        range: Interval::new(0.0, 1.0),
        step: 0.001,
        default: 0.01,
        get: |car| car.attributes.friction,
        set: |car, value| car.attributes.friction = value,
    },
];

impl Tunable for Car {
    fn parameter_specs() -> &'static [ParameterSpec<Self>] {
        CAR_PARAMETERS
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{Layer, NetworkSnapshot};
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;
    use std::f64::consts::PI;

    fn player_at(x: f64, y: f64, angle: f64) -> Car {
        Car::player(
            &CarAttributes::default(),
            Pose::new(Point2d::new(x, y), angle),
            &SensorAttributes::default(),
        )
    }

    fn press(car: &mut Car, forward: bool, reverse: bool) {
        car.set_controls(Controls {
            forward,
            reverse,
            ..Default::default()
        });
    }

    #[test]
    fn forward_never_exceeds_top_speed() {
        let mut car = player_at(0.0, 0.0, 0.0);
        press(&mut car, true, false);
        for _ in 0..500 {
            car.update(&[]);
            assert!(car.speed() <= car.attributes().top_speed);
        }
        assert_eq!(car.speed(), car.attributes().top_speed);
    }

    #[test]
    fn reverse_never_exceeds_reverse_speed() {
        let mut car = player_at(0.0, 0.0, 0.0);
        press(&mut car, false, true);
        for _ in 0..500 {
            car.update(&[]);
            assert!(car.speed() >= -car.attributes().reverse_speed);
        }
        assert_eq!(car.speed(), -car.attributes().reverse_speed);
        assert!(car.position().y > 0.0);
    }

    #[test]
    fn friction_stops_car_exactly() {
        let mut car = player_at(0.0, 0.0, 0.0);
        press(&mut car, true, false);
        for _ in 0..40 {
            car.update(&[]);
        }
        let speed = car.speed();
        let limit = (speed / car.attributes().friction).ceil() as usize;

        press(&mut car, false, false);
        let mut ticks = 0;
        while car.speed() != 0.0 {
            car.update(&[]);
            ticks += 1;
            assert!(car.speed() >= 0.0);
            assert!(ticks <= limit);
        }
        car.update(&[]);
        assert_eq!(car.speed(), 0.0);
    }

    #[test]
    fn opposite_headings_move_apart() {
        let mut up = player_at(100.0, 100.0, 0.0);
        let mut down = player_at(100.0, 100.0, PI);
        for car in [&mut up, &mut down] {
            press(car, true, false);
            car.update(&[]);
        }
        let acc = CarAttributes::default().acceleration;
        assert_approx_eq!(up.position().x, 100.0);
        assert_approx_eq!(up.position().y, 100.0 - acc);
        assert_approx_eq!(down.position().x, 100.0);
        assert_approx_eq!(down.position().y, 100.0 + acc);
    }

    #[test]
    fn damage_is_sticky() {
        let mut car = player_at(0.0, 0.0, 0.0);
        let wall = LineSegment2d::from_ends(Point2d::new(-100.0, 0.0), Point2d::new(100.0, 0.0));
        car.update(&[wall]);
        assert!(car.is_damaged());

        press(&mut car, true, false);
        let position = car.position();
        for _ in 0..50 {
            car.update(&[]);
            assert!(car.is_damaged());
            assert_eq!(car.position(), position);
        }
        assert_eq!(car.sensor().unwrap().rays().len(), 3);
    }

    #[test]
    fn hitbox_is_closed() {
        let car = player_at(0.0, 0.0, 0.4);
        let hitbox = car.hitbox();
        assert_eq!(hitbox.len(), 4);
        for (edge, next) in hitbox.iter().circular_tuple_windows() {
            assert_eq!(edge.b, next.a);
        }
    }

    #[test]
    fn cpu_cars_drive_themselves() {
        let mut car = Car::cpu(&CarAttributes::default(), Pose::new(Point2d::new(0.0, 0.0), 0.0));
        car.update(&[]);
        assert!(car.speed() > 0.0);
        assert!(car.sensor().is_none());
    }

    #[test]
    fn ai_requires_matching_network() {
        let mut rng = Pcg64::seed_from_u64(3);
        let sensor = SensorAttributes::default();
        let pose = Pose::new(Point2d::new(0.0, 0.0), 0.0);
        let network = NeuralNetwork::new(&[5, 4], &mut rng).unwrap();
        assert!(matches!(
            Car::ai(&CarAttributes::default(), pose, &sensor, network),
            Err(NetworkError::Incompatible { expected_inputs: 3, found_inputs: 5, .. })
        ));

        let car = Car::random_ai(&CarAttributes::default(), pose, &sensor, &[6], &mut rng).unwrap();
        assert_eq!(car.network().unwrap().topology(), vec![3, 6, 4]);
    }

    #[test]
    fn retuned_sensor_releases_controls() {
        let mut rng = Pcg64::seed_from_u64(4);
        let sensor = SensorAttributes::default();
        let pose = Pose::new(Point2d::new(0.0, 0.0), 0.0);
        let mut car = Car::random_ai(&CarAttributes::default(), pose, &sensor, &[6], &mut rng).unwrap();
        car.sensor_mut().unwrap().set_parameter("rayCount", 5.0).unwrap();
        press(&mut car, true, false);
        car.update(&[]);
        assert_eq!(car.controls(), Controls::default());
        assert_eq!(car.sensor().unwrap().readings().len(), 5);
    }

    #[test]
    fn tuning_top_speed() {
        let mut car = player_at(0.0, 0.0, 0.0);
        car.set_parameter("topSpeed", 1.0).unwrap();
        press(&mut car, true, false);
        for _ in 0..100 {
            car.update(&[]);
        }
        assert_eq!(car.speed(), 1.0);
        assert_eq!(car.parameters().len(), 5);
    }

    /// A single layer network over three rays: forward always fires, left
    /// fires when the middle ray sees something, right and reverse never fire.
    fn hand_built_network() -> NeuralNetwork {
        let layer = Layer {
            inputs: 3,
            outputs: 4,
            weights: vec![
                vec![0.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
            ],
            biases: vec![-1.0, 0.0, 1.0, 1.0],
        };
        NeuralNetwork::from_snapshot(NetworkSnapshot {
            topology: vec![3, 4],
            layers: vec![layer],
        })
        .unwrap()
    }

    #[test]
    fn network_drives_the_car() {
        let pose = Pose::new(Point2d::new(0.0, 0.0), 0.0);
        let mut car = Car::ai(
            &CarAttributes::default(),
            pose,
            &SensorAttributes::default(),
            hand_built_network(),
        )
        .unwrap();
        assert_eq!(car.controls(), Controls::default());

        car.update(&[]);
        assert!(car.controls().forward);
        assert!(!car.controls().left);
        assert_eq!(car.speed(), 0.0);

        car.update(&[]);
        assert!(car.speed() > 0.0);
        assert!(car.position().y < 0.0);
    }

    #[test]
    fn obstacle_ahead_flips_steering() {
        let pose = Pose::new(Point2d::new(0.0, 0.0), 0.0);
        let mut car = Car::ai(
            &CarAttributes::default(),
            pose,
            &SensorAttributes::default(),
            hand_built_network(),
        )
        .unwrap();
        let wall = LineSegment2d::from_ends(Point2d::new(-50.0, -60.0), Point2d::new(50.0, -60.0));

        car.update(&[wall]);
        assert!(!car.is_damaged());
        assert_approx_eq!(car.sensor().unwrap().inputs()[1], 0.4);
        assert!(car.controls().forward);
        assert!(car.controls().left);
        assert!(!car.controls().right);

        car.update(&[]);
        assert!(!car.controls().left);
    }

    #[test]
    fn heading_is_wrapped() {
        assert_approx_eq!(Pose::new(Point2d::new(0.0, 0.0), 4.0).angle, 4.0 - 2.0 * PI);

        let raw = Pose {
            position: Point2d::new(0.0, 0.0),
            angle: 4.0,
        };
        let mut car = Car::cpu(&CarAttributes::default(), raw);
        assert_approx_eq!(car.angle(), 4.0 - 2.0 * PI);
        for _ in 0..200 {
            car.update(&[]);
            assert!(car.angle() > -PI && car.angle() <= PI);
        }

        let raw = Pose {
            position: Point2d::new(0.0, 0.0),
            angle: -PI,
        };
        let car = Car::player(&CarAttributes::default(), raw, &SensorAttributes::default());
        assert_eq!(car.angle(), PI);
    }

    #[test]
    fn rejects_bad_attributes() {
        assert!(CarAttributes::default().validate().is_ok());
        let bad = |attributes: CarAttributes| attributes.validate().unwrap_err();
        let defaults = CarAttributes::default();

        assert_eq!(
            bad(CarAttributes { width: 0.0, height: 0.0, ..defaults }),
            ConfigError::NotPositive { name: "width", value: 0.0 }
        );
        assert_eq!(
            bad(CarAttributes { height: -5.0, ..defaults }),
            ConfigError::NotPositive { name: "height", value: -5.0 }
        );
        assert_eq!(
            bad(CarAttributes { top_speed: -1.0, reverse_speed: 0.0, ..defaults }),
            ConfigError::Negative { name: "top_speed", value: -1.0 }
        );
        assert_eq!(
            bad(CarAttributes { reverse_speed: -2.0, ..defaults }),
            ConfigError::Negative { name: "reverse_speed", value: -2.0 }
        );
        assert_eq!(
            bad(CarAttributes { acceleration: -0.1, ..defaults }),
            ConfigError::Negative { name: "acceleration", value: -0.1 }
        );
        assert!(matches!(
            bad(CarAttributes { steering_force: f64::NAN, ..defaults }),
            ConfigError::Negative { name: "steering_force", .. }
        ));
        assert!(matches!(
            bad(CarAttributes { friction: 1.5, ..defaults }),
            ConfigError::OutOfRange { name: "friction", .. }
        ));
    }
}
