//! Named, bounded parameters that a tuning panel may read and write between ticks.

use crate::util::Interval;
use thiserror::Error;

/// A snapshot of one tunable parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parameter {
    /// The parameter name, e.g. `"topSpeed"`.
    pub name: &'static str,
    /// The current value.
    pub value: f64,
    /// The permitted values.
    pub range: Interval<f64>,
    /// The suggested increment for a slider.
    pub step: f64,
    /// The value a fresh instance starts with.
    pub default: f64,
}

/// Describes how to read and write one tunable field of `T`.
pub struct ParameterSpec<T> {
    pub name: &'static str,
    pub range: Interval<f64>,
    pub step: f64,
    pub default: f64,
    pub get: fn(&T) -> f64,
    pub set: fn(&mut T, f64),
}

/// Errors produced when writing a parameter.
#[derive(Debug, Error, PartialEq)]
pub enum TuningError {
    #[error("unknown parameter `{0}`")]
    Unknown(String),
    #[error("value {value} for `{name}` is outside {range:?}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        range: Interval<f64>,
    },
}

/// A component exposing a fixed table of tunable parameters.
pub trait Tunable: Sized + 'static {
    /// The parameter table of this component.
    fn parameter_specs() -> &'static [ParameterSpec<Self>];

    /// Lists every parameter with its current value.
    fn parameters(&self) -> Vec<Parameter> {
        Self::parameter_specs()
            .iter()
            .map(|spec| Parameter {
                name: spec.name,
                value: (spec.get)(self),
                range: spec.range,
                step: spec.step,
                default: spec.default,
            })
            .collect()
    }

    /// Gets the current value of the named parameter.
    fn get_parameter(&self, name: &str) -> Option<f64> {
        find_spec::<Self>(name).map(|spec| (spec.get)(self))
    }

    /// Sets the named parameter, rejecting unknown names and out of range values.
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), TuningError> {
        let spec = find_spec::<Self>(name).ok_or_else(|| TuningError::Unknown(name.to_string()))?;
        if !spec.range.contains(value) {
            return Err(TuningError::OutOfRange {
                name: spec.name,
                value,
                range: spec.range,
            });
        }
        log::debug!("set {} = {}", spec.name, value);
        (spec.set)(self, value);
        Ok(())
    }

    /// Restores every parameter to its default.
    fn reset_parameters(&mut self) {
        for spec in Self::parameter_specs() {
            (spec.set)(self, spec.default);
        }
    }
}

fn find_spec<T: Tunable>(name: &str) -> Option<&'static ParameterSpec<T>> {
    T::parameter_specs().iter().find(|spec| spec.name == name)
}
