use crate::car::{update_cars, Car, CarAttributes, Pose};
use crate::math::{LineSegment2d, Point2d};
use crate::network::{NetworkError, NeuralNetwork};
use crate::road::{Road, RoadAttributes};
use crate::sensor::SensorAttributes;
use crate::traffic::{Traffic, TrafficAttributes};
use crate::tuning::{ParameterSpec, Tunable};
use crate::util::{check_non_negative, check_positive, check_within, ConfigError, Interval};
use crate::{CarId, CarSet};
use itertools::Itertools;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// The attributes of the evolving population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationAttributes {
    /// The number of cars in each generation.
    pub cohort_size: usize,
    /// How strongly each spawned network is pulled towards random values, in `[0, 1]`.
    pub mutation_rate: f64,
    /// The hidden layer sizes of fresh networks.
    pub hidden_layers: Vec<usize>,
    /// Cars further than this behind the reference car are removed.
    pub cull_distance: f64,
    /// Damaged cars further than this behind the reference car are removed.
    pub damaged_grace: f64,
    /// Whether cars of the cohort collide with each other.
    pub cohort_collisions: bool,
}

impl Default for PopulationAttributes {
    fn default() -> Self {
        Self {
            cohort_size: 100,
            mutation_rate: 0.1,
            hidden_layers: vec![6],
            cull_distance: 800.0,
            damaged_grace: 200.0,
            cohort_collisions: false,
        }
    }
}

impl PopulationAttributes {
    /// Rejects rates outside `[0, 1]`, empty hidden layers and negative distances.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_within("mutation_rate", self.mutation_rate, Interval::new(0.0, 1.0))?;
        for width in &self.hidden_layers {
            check_positive("hidden_layers", *width as f64)?;
        }
        check_non_negative("cull_distance", self.cull_distance)?;
        check_non_negative("damaged_grace", self.damaged_grace)
    }
}

/// Everything needed to build a [Simulation].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub road: RoadAttributes,
    pub car: CarAttributes,
    pub sensor: SensorAttributes,
    pub traffic: TrafficAttributes,
    pub population: PopulationAttributes,
    /// Where each generation starts.
    pub spawn: Pose,
    /// Seeds the random number generator; a random seed is used if absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let road = RoadAttributes::default();
        Self {
            spawn: Pose::new(Point2d::new(road.center_x, 600.0), 0.0),
            road,
            car: Default::default(),
            sensor: Default::default(),
            traffic: Default::default(),
            population: Default::default(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Checks every section of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.road.validate()?;
        self.car.validate()?;
        self.sensor.validate()?;
        self.traffic.validate()?;
        self.population.validate()
    }
}

/// A population of cars learning to drive down a road full of traffic.
pub struct Simulation {
    config: SimulationConfig,
    road: Road,
    /// The cars being evolved.
    cars: CarSet,
    /// The scripted background traffic.
    traffic: Traffic,
    /// The leading car.
    reference: Option<CarId>,
    /// The current frame of simulation.
    frame: usize,
    /// The current generation, starting at zero.
    generation: usize,
    /// The next sequence number.
    seq: usize,
    rng: Pcg64,
}

impl Simulation {
    /// Creates a simulation without any cars, rejecting an invalid configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };
        Ok(Self {
            road: Road::new(&config.road),
            traffic: Traffic::new(&config.traffic, &config.car),
            cars: CarSet::with_key(),
            reference: None,
            frame: 0,
            generation: 0,
            seq: 0,
            rng,
            config,
        })
    }

    /// The configuration the simulation was built with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The road.
    pub fn road(&self) -> &Road {
        &self.road
    }

    /// The background traffic.
    pub fn traffic(&self) -> &Traffic {
        &self.traffic
    }

    /// Mutable access to the background traffic, e.g. to place cars by hand.
    pub fn traffic_mut(&mut self) -> &mut Traffic {
        &mut self.traffic
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The current generation.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The current mutation rate.
    pub fn mutation_rate(&self) -> f64 {
        self.config.population.mutation_rate
    }

    /// Returns an iterator over all the cars of the population.
    pub fn iter_cars(&self) -> impl Iterator<Item = (CarId, &Car)> {
        self.cars.iter()
    }

    /// The number of cars in the population.
    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    /// Gets a reference to the car with the given ID.
    pub fn get_car(&self, car_id: CarId) -> Option<&Car> {
        self.cars.get(car_id)
    }

    /// Gets a mutable reference to the car with the given ID.
    pub fn get_car_mut(&mut self, car_id: CarId) -> Option<&mut Car> {
        self.cars.get_mut(car_id)
    }

    /// The ID of the leading car.
    pub fn reference(&self) -> Option<CarId> {
        self.reference
    }

    /// The leading car.
    pub fn reference_car(&self) -> Option<&Car> {
        self.reference.and_then(|id| self.cars.get(id))
    }

    /// The network of the leading car, the best controller found so far.
    pub fn best_network(&self) -> Option<&NeuralNetwork> {
        self.reference_car().and_then(Car::network)
    }

    /// How far the leading car has travelled up the road from the spawn point.
    pub fn reference_progress(&self) -> Option<f64> {
        self.reference_car()
            .map(|car| self.config.spawn.position.y - car.position().y)
    }

    /// Adds a car to the population.
    pub fn add_car(&mut self, mut car: Car) -> CarId {
        self.seq += 1;
        car.seq = self.seq;
        let id = self.cars.insert(car);
        self.reference = self.find_leader();
        id
    }

    /// Removes a car from the population. Unknown IDs are ignored.
    pub fn remove_car(&mut self, car_id: CarId) {
        if self.cars.remove(car_id).is_some() && self.reference == Some(car_id) {
            self.reference = self.find_leader();
        }
    }

    /// Spawns `count` network driven cars at the spawn pose.
    ///
    /// With a `base` network the first car receives an exact copy of it,
    /// keeping the best lineage intact, and every other car receives a copy
    /// mutated by `mutation_rate`. Without one, every car gets a fresh
    /// random network. Nothing is spawned if any car fails to build.
    pub fn spawn_cohort(
        &mut self,
        count: usize,
        base: Option<&NeuralNetwork>,
        mutation_rate: f64,
    ) -> Result<Vec<CarId>, NetworkError> {
        let SimulationConfig {
            car: attributes,
            sensor,
            spawn,
            population,
            ..
        } = &self.config;

        let mut cohort = Vec::with_capacity(count);
        for idx in 0..count {
            let car = match base {
                Some(base) => {
                    let mut network = base.clone();
                    if idx > 0 {
                        network.mutate(mutation_rate, &mut self.rng);
                    }
                    Car::ai(attributes, *spawn, sensor, network)?
                }
                None => Car::random_ai(
                    attributes,
                    *spawn,
                    sensor,
                    &population.hidden_layers,
                    &mut self.rng,
                )?,
            };
            cohort.push(car);
        }

        log::debug!(
            "spawning {} cars ({})",
            count,
            if base.is_some() { "mutated" } else { "random" }
        );
        Ok(cohort.into_iter().map(|car| self.add_car(car)).collect())
    }

    /// Replaces the population with a new generation bred from the current
    /// leader, and clears the traffic.
    ///
    /// If there is no leader with a network, the generation starts from
    /// random networks.
    pub fn next_generation(&mut self, count: usize) -> Result<Vec<CarId>, NetworkError> {
        let base = self.best_network().cloned();
        log::info!(
            "generation {} finished after {} frames, best progress {:.1}",
            self.generation,
            self.frame,
            self.reference_progress().unwrap_or(0.0)
        );

        self.cars.clear();
        self.traffic.clear();
        self.reference = None;
        self.frame = 0;
        self.generation += 1;

        let rate = self.config.population.mutation_rate;
        self.spawn_cohort(count, base.as_ref(), rate)
    }

    /// Advances the simulation by one tick.
    pub fn step(&mut self) {
        self.reap_cars();

        self.traffic.update(self.road.hitbox());
        let obstacles: Vec<LineSegment2d> = self
            .road
            .hitbox()
            .iter()
            .copied()
            .chain(self.traffic.hitbox())
            .collect();
        update_cars(
            &mut self.cars,
            &obstacles,
            self.config.population.cohort_collisions,
        );

        self.reference = self.find_leader();
        if let Some(reference_y) = self.reference_car().map(|car| car.position().y) {
            self.traffic.cull(reference_y);
            self.traffic
                .tick_spawner(&self.road, reference_y, &mut self.rng);
        }

        self.frame += 1;
    }

    /// Removes cars which have fallen too far behind the leader.
    fn reap_cars(&mut self) {
        let reference_y = match self.reference_car() {
            Some(car) => car.position().y,
            None => return,
        };
        let cull_distance = self.config.population.cull_distance;
        let damaged_grace = self.config.population.damaged_grace;

        self.cars.retain(|_, car| {
            let behind = car.position().y - reference_y;
            let keep = behind <= cull_distance && !(car.is_damaged() && behind > damaged_grace);
            if !keep {
                log::debug!("removing car #{} ({:.1} behind the leader)", car.seq, behind);
            }
            keep
        });
    }

    /// Finds the car furthest up the road, preferring the earliest added on ties.
    fn find_leader(&self) -> Option<CarId> {
        self.cars
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.position()
                    .y
                    .total_cmp(&b.position().y)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| id)
    }

    /// Spawns background traffic in every lane at the given distance ahead of the spawn point.
    pub fn add_traffic_row(&mut self, distance: f64) -> Vec<CarId> {
        let y = self.config.spawn.position.y - distance;
        (0..self.road.lane_count())
            .map(|lane| self.traffic.add_car(&self.road, lane, y))
            .collect_vec()
    }
}

const SIMULATION_PARAMETERS: &[ParameterSpec<Simulation>] = &[
    ParameterSpec {
        name: "mutationRate",
        range: Interval::new(0.0, 1.0),
        step: 0.01,
        default: 0.1,
        get: |sim| sim.config.population.mutation_rate,
        set: |sim, value| sim.config.population.mutation_rate = value,
    },
    ParameterSpec {
        name: "spawnInterval",
        range: Interval::new(1.0, 600.0),
        step: 1.0,
        default: 120.0,
        get: |sim| sim.traffic.attributes().spawn_interval as f64,
        set: |sim, value| sim.traffic.set_spawn_interval(value.round() as usize),
    },
];

impl Tunable for Simulation {
    fn parameter_specs() -> &'static [ParameterSpec<Self>] {
        SIMULATION_PARAMETERS
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            seed: Some(42),
            ..Default::default()
        }
    }

    fn player_at(sim: &Simulation, x: f64, y: f64) -> Car {
        let config = sim.config();
        Car::player(&config.car, Pose::new(Point2d::new(x, y), 0.0), &config.sensor)
    }

    #[test]
    fn empty_cohort_is_valid() {
        let mut sim = Simulation::new(config()).unwrap();
        assert!(sim.spawn_cohort(0, None, 0.1).unwrap().is_empty());
        assert_eq!(sim.car_count(), 0);
        assert!(sim.reference().is_none());
        sim.step();
        assert_eq!(sim.frame(), 1);
    }

    #[test]
    fn first_car_keeps_base_network() {
        let mut sim = Simulation::new(config()).unwrap();
        let mut rng = Pcg64::seed_from_u64(7);
        let base = NeuralNetwork::new(&[3, 6, 4], &mut rng).unwrap();
        let ids = sim.spawn_cohort(4, Some(&base), 0.5).unwrap();

        assert_eq!(sim.get_car(ids[0]).unwrap().network(), Some(&base));
        for id in &ids[1..] {
            let network = sim.get_car(*id).unwrap().network().unwrap();
            assert_ne!(network, &base);
            assert_eq!(network.topology(), base.topology());
        }
        assert_eq!(sim.reference(), Some(ids[0]));
    }

    #[test]
    fn rejects_incompatible_base() {
        let mut sim = Simulation::new(config()).unwrap();
        let base = NeuralNetwork::new(&[5, 4], &mut Pcg64::seed_from_u64(7)).unwrap();
        assert!(sim.spawn_cohort(3, Some(&base), 0.1).is_err());
        assert_eq!(sim.car_count(), 0);
    }

    #[test]
    fn removing_twice_is_harmless() {
        let mut sim = Simulation::new(config()).unwrap();
        let ids = sim.spawn_cohort(2, None, 0.1).unwrap();
        sim.remove_car(ids[0]);
        sim.remove_car(ids[0]);
        assert_eq!(sim.car_count(), 1);
        assert_eq!(sim.reference(), Some(ids[1]));
    }

    #[test]
    fn leader_ties_go_to_first_added() {
        let mut sim = Simulation::new(config()).unwrap();
        let behind = player_at(&sim, 200.0, 100.0);
        let first = player_at(&sim, 140.0, 50.0);
        let second = player_at(&sim, 260.0, 50.0);
        sim.add_car(behind);
        let first = sim.add_car(first);
        sim.add_car(second);
        sim.step();
        assert_eq!(sim.reference(), Some(first));
    }

    #[test]
    fn reaps_stragglers_and_wrecks() {
        let mut sim = Simulation::new(config()).unwrap();
        let leader = player_at(&sim, 200.0, 0.0);
        let straggler = player_at(&sim, 200.0, 2000.0);
        let wreck = player_at(&sim, 110.0, 300.0);
        let healthy = player_at(&sim, 200.0, 300.0);
        let leader = sim.add_car(leader);
        let straggler = sim.add_car(straggler);
        let wreck = sim.add_car(wreck);
        let healthy = sim.add_car(healthy);

        sim.step();
        assert!(sim.get_car(straggler).is_none());
        assert!(sim.get_car(wreck).unwrap().is_damaged());

        sim.step();
        assert!(sim.get_car(wreck).is_none());
        assert!(sim.get_car(healthy).is_some());
        assert_eq!(sim.reference(), Some(leader));
    }

    #[test]
    fn traffic_spawns_ahead_of_leader() {
        let mut sim = Simulation::new(config()).unwrap();
        sim.set_parameter("spawnInterval", 10.0).unwrap();
        sim.add_car(player_at(&sim, 200.0, 600.0));
        for _ in 0..10 {
            sim.step();
        }
        assert_eq!(sim.traffic().len(), 1);
        let (_, car) = sim.traffic().iter_cars().next().unwrap();
        assert!(car.position().y < 600.0);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let mut sim = Simulation::new(config()).unwrap();
            sim.spawn_cohort(20, None, 0.1).unwrap();
            sim.add_traffic_row(300.0);
            for _ in 0..300 {
                sim.step();
            }
            let leader = sim.reference_car().unwrap();
            (leader.position(), sim.car_count(), sim.traffic().len())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn next_generation_breeds_from_leader() {
        let mut sim = Simulation::new(config()).unwrap();
        sim.spawn_cohort(10, None, 0.1).unwrap();
        for _ in 0..100 {
            sim.step();
        }
        let best = sim.best_network().unwrap().clone();
        let ids = sim.next_generation(10).unwrap();

        assert_eq!(sim.generation(), 1);
        assert_eq!(sim.frame(), 0);
        assert_eq!(sim.car_count(), 10);
        assert!(sim.traffic().is_empty());
        assert_eq!(sim.get_car(ids[0]).unwrap().network(), Some(&best));
    }

    #[test]
    fn mutation_rate_is_tunable() {
        let mut sim = Simulation::new(config()).unwrap();
        sim.set_parameter("mutationRate", 0.25).unwrap();
        assert_eq!(sim.mutation_rate(), 0.25);
        assert!(sim.set_parameter("mutationRate", 1.5).is_err());
    }

    #[test]
    fn rejects_invalid_config() {
        let reject = |config: SimulationConfig| Simulation::new(config).err().unwrap();

        let mut bad = config();
        bad.car.top_speed = -1.0;
        bad.car.reverse_speed = 0.0;
        assert_eq!(reject(bad), ConfigError::Negative { name: "top_speed", value: -1.0 });

        let mut bad = config();
        bad.car.width = 0.0;
        bad.car.height = 0.0;
        assert_eq!(reject(bad), ConfigError::NotPositive { name: "width", value: 0.0 });

        let mut bad = config();
        bad.car.acceleration = -0.5;
        assert_eq!(reject(bad), ConfigError::Negative { name: "acceleration", value: -0.5 });

        let mut bad = config();
        bad.car.friction = 2.0;
        assert!(matches!(reject(bad), ConfigError::OutOfRange { name: "friction", .. }));

        let mut bad = config();
        bad.traffic.top_speed = -3.0;
        assert_eq!(reject(bad), ConfigError::Negative { name: "top_speed", value: -3.0 });

        let mut bad = config();
        bad.sensor.ray_count = 0;
        assert!(matches!(reject(bad), ConfigError::NotPositive { name: "ray_count", .. }));

        let mut bad = config();
        bad.road.shoulder = 150.0;
        assert!(matches!(reject(bad), ConfigError::NarrowRoad { .. }));

        let mut bad = config();
        bad.population.mutation_rate = 1.5;
        assert!(matches!(reject(bad), ConfigError::OutOfRange { name: "mutation_rate", .. }));

        let mut bad = config();
        bad.population.hidden_layers = vec![6, 0];
        assert!(matches!(reject(bad), ConfigError::NotPositive { name: "hidden_layers", .. }));
    }
}
