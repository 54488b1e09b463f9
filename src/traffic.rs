use crate::car::{update_cars, Car, CarAttributes, Pose};
use crate::math::{LineSegment2d, Point2d};
use crate::util::{check_non_negative, check_positive, ConfigError};
use crate::{CarId, CarSet, Road};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The attributes of the background traffic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficAttributes {
    /// The number of ticks between spawns.
    pub spawn_interval: usize,
    /// How far ahead of the reference car new traffic appears.
    pub spawn_ahead: f64,
    /// The top speed of traffic cars, slower than the cohort so it can be overtaken.
    pub top_speed: f64,
    /// Traffic further than this behind the reference car is removed.
    pub cull_distance: f64,
}

impl Default for TrafficAttributes {
    fn default() -> Self {
        Self {
            spawn_interval: 120,
            spawn_ahead: 200.0,
            top_speed: 2.0,
            cull_distance: 500.0,
        }
    }
}

impl TrafficAttributes {
    /// Rejects a zero spawn interval and negative speeds or distances.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("spawn_interval", self.spawn_interval as f64)?;
        check_non_negative("top_speed", self.top_speed)?;
        check_non_negative("cull_distance", self.cull_distance)
    }
}

/// Scripted cars which drive straight ahead in their lane.
#[derive(Clone, Debug)]
pub struct Traffic {
    attributes: TrafficAttributes,
    /// The attributes given to each spawned car.
    car_attributes: CarAttributes,
    cars: CarSet,
    /// Ticks since the last spawn.
    since_spawn: usize,
    /// The next sequence number.
    seq: usize,
}

impl Traffic {
    /// Creates an empty stream of traffic.
    pub fn new(attributes: &TrafficAttributes, car_attributes: &CarAttributes) -> Self {
        Self {
            attributes: *attributes,
            car_attributes: CarAttributes {
                top_speed: attributes.top_speed,
                ..*car_attributes
            },
            cars: CarSet::with_key(),
            since_spawn: 0,
            seq: 0,
        }
    }

    /// The traffic attributes.
    pub fn attributes(&self) -> &TrafficAttributes {
        &self.attributes
    }

    /// Changes the number of ticks between spawns. Zero is treated as one.
    pub fn set_spawn_interval(&mut self, ticks: usize) {
        self.attributes.spawn_interval = ticks.max(1);
    }

    /// Returns an iterator over the traffic cars.
    pub fn iter_cars(&self) -> impl Iterator<Item = (CarId, &Car)> {
        self.cars.iter()
    }

    /// The number of traffic cars.
    pub fn len(&self) -> usize {
        self.cars.len()
    }

    /// Whether there is no traffic.
    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    /// Removes every traffic car and restarts the spawn timer.
    pub fn clear(&mut self) {
        self.cars.clear();
        self.since_spawn = 0;
    }

    /// Adds a traffic car at the centre of a lane.
    pub fn add_car(&mut self, road: &Road, lane: usize, y: f64) -> CarId {
        let pose = Pose::new(Point2d::new(road.lane_center(lane), y), 0.0);
        let mut car = Car::cpu(&self.car_attributes, pose);
        self.seq += 1;
        car.seq = self.seq;
        log::debug!("traffic car #{} spawned in lane {} at y = {:.1}", car.seq, lane, y);
        self.cars.insert(car)
    }

    /// The edges of every traffic car.
    pub fn hitbox(&self) -> Vec<LineSegment2d> {
        self.cars.values().flat_map(|car| car.hitbox()).collect()
    }

    /// Moves every traffic car; traffic collides with the road and with itself.
    pub fn update(&mut self, road_hitbox: &[LineSegment2d]) {
        update_cars(&mut self.cars, road_hitbox, true);
    }

    /// Removes traffic which has fallen behind the reference position.
    pub fn cull(&mut self, reference_y: f64) {
        let limit = reference_y + self.attributes.cull_distance;
        let before = self.cars.len();
        self.cars.retain(|_, car| car.position().y <= limit);
        if self.cars.len() < before {
            log::debug!("culled {} traffic cars", before - self.cars.len());
        }
    }

    /// Advances the spawn timer and, when it elapses, spawns a car in a
    /// random lane ahead of the reference position.
    pub fn tick_spawner(&mut self, road: &Road, reference_y: f64, rng: &mut impl Rng) -> Option<CarId> {
        self.since_spawn += 1;
        if self.since_spawn < self.attributes.spawn_interval {
            return None;
        }
        self.since_spawn = 0;
        let lane = rng.gen_range(0..road.lane_count());
        Some(self.add_car(road, lane, reference_y - self.attributes.spawn_ahead))
    }
}
