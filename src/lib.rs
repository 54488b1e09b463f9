//! Cars with distance sensors and tiny neural networks learning to drive down
//! a busy multi-lane road through mutation and selection.
//!
//! The host calls [Simulation::step] once per frame and reads back poses,
//! hitboxes, sensor readings and networks for display. Nothing here draws,
//! listens to a keyboard or touches storage.

pub use car::{Car, CarAttributes, Pose, CONTROL_OUTPUTS};
pub use cgmath;
pub use controls::{ControlType, Controls};
pub use network::{Layer, NetworkError, NetworkSnapshot, NeuralNetwork};
pub use road::{Road, RoadAttributes};
pub use sensor::{Sensor, SensorAttributes};
pub use simulation::{PopulationAttributes, Simulation, SimulationConfig};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use traffic::{Traffic, TrafficAttributes};
pub use tuning::{Parameter, Tunable, TuningError};
pub use util::{ConfigError, Interval};

mod car;
mod controls;
pub mod math;
mod network;
mod road;
mod sensor;
mod simulation;
mod traffic;
pub mod tuning;
mod util;

new_key_type! {
    /// Unique ID of a [Car].
    pub struct CarId;
}

type CarSet = SlotMap<CarId, Car>;
