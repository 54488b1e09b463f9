//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

use cgmath::num_traits::Float;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An interval on the real number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: std::cmp::PartialOrd> Interval<T> {
    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

impl<T: Float> Interval<T> {
    /// Clamps the value into the interval.
    pub fn clamp(&self, value: T) -> T {
        T::min(T::max(value, self.min), self.max)
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Errors raised when a configuration is rejected at construction.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("`{name}` must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("`{name}` must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("`{name}` must be within {range:?}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        range: Interval<f64>,
    },
    #[error("a {width} wide road has no room between its {shoulder} wide shoulders")]
    NarrowRoad { width: f64, shoulder: f64 },
}

/// Rejects zero, negative and non-finite values.
pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

/// Rejects negative and non-finite values.
pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Rejects values outside the given interval.
pub(crate) fn check_within(
    name: &'static str,
    value: f64,
    range: Interval<f64>,
) -> Result<(), ConfigError> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, range })
    }
}
