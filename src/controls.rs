use serde::{Deserialize, Serialize};

/// Who is driving a car.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlType {
    /// Driven by an external input source, e.g. a keyboard.
    Player,
    /// Scripted background traffic which always drives forward.
    Cpu,
    /// Driven by the car's own neural network.
    Ai,
}

/// The four driving inputs of a car.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub forward: bool,
    pub left: bool,
    pub right: bool,
    pub reverse: bool,
}

impl Controls {
    /// The initial controls for the given driver.
    pub fn new(control_type: ControlType) -> Self {
        match control_type {
            ControlType::Cpu => Self {
                forward: true,
                ..Default::default()
            },
            ControlType::Player | ControlType::Ai => Self::default(),
        }
    }

    /// Sets the controls from network outputs ordered
    /// `[forward, left, right, reverse]`. Missing outputs release their control.
    pub fn set_from_outputs(&mut self, outputs: &[f64]) {
        let pressed = |idx: usize| outputs.get(idx).map_or(false, |v| *v > 0.5);
        self.forward = pressed(0);
        self.left = pressed(1);
        self.right = pressed(2);
        self.reverse = pressed(3);
    }

    /// Whether the car is trying to move.
    pub fn is_driving(&self) -> bool {
        self.forward || self.reverse
    }

    /// Whether the car is trying to turn.
    pub fn is_steering(&self) -> bool {
        self.left || self.right
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cpu_drives_forward() {
        let controls = Controls::new(ControlType::Cpu);
        assert!(controls.forward && !controls.reverse && !controls.is_steering());
        assert_eq!(Controls::new(ControlType::Ai), Controls::default());
    }

    #[test]
    fn outputs_map_in_order() {
        let mut controls = Controls::default();
        controls.set_from_outputs(&[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            controls,
            Controls {
                forward: true,
                left: false,
                right: true,
                reverse: false
            }
        );
        controls.set_from_outputs(&[]);
        assert_eq!(controls, Controls::default());
    }
}
