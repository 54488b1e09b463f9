use crate::math::{linspace, LineSegment2d, Point2d};
use crate::util::{check_non_negative, check_positive, ConfigError};
use serde::{Deserialize, Serialize};

/// The attributes of a road.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadAttributes {
    /// The x coordinate of the centre of the road.
    pub center_x: f64,
    /// The width of the road including both shoulders.
    pub width: f64,
    /// The width of each shoulder, which is not drivable.
    pub shoulder: f64,
    /// The number of lanes.
    pub lane_count: usize,
    /// How far the borders extend from `y = 0` in both directions.
    pub length: f64,
}

impl Default for RoadAttributes {
    fn default() -> Self {
        Self {
            center_x: 200.0,
            width: 200.0,
            shoulder: 10.0,
            lane_count: 3,
            length: 1e6,
        }
    }
}

impl RoadAttributes {
    /// Rejects a road without a drivable surface between its shoulders.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("width", self.width)?;
        check_non_negative("shoulder", self.shoulder)?;
        check_positive("length", self.length)?;
        if self.width <= 2.0 * self.shoulder {
            return Err(ConfigError::NarrowRoad {
                width: self.width,
                shoulder: self.shoulder,
            });
        }
        Ok(())
    }
}

/// A straight road running along the y axis.
#[derive(Clone, Debug)]
pub struct Road {
    /// The x coordinate of the left border.
    left: f64,
    /// The x coordinate of the right border.
    right: f64,
    lane_count: usize,
    borders: [LineSegment2d; 2],
}

impl Road {
    /// Creates a new road. At least one lane is always present.
    pub fn new(attributes: &RoadAttributes) -> Self {
        let half = attributes.width / 2.0;
        let left = attributes.center_x - half + attributes.shoulder;
        let right = attributes.center_x + half - attributes.shoulder;
        let (top, bottom) = (-attributes.length, attributes.length);
        let border = |x| LineSegment2d::from_ends(Point2d::new(x, top), Point2d::new(x, bottom));
        Self {
            left,
            right,
            lane_count: attributes.lane_count.max(1),
            borders: [border(left), border(right)],
        }
    }

    /// The left and right borders.
    pub fn hitbox(&self) -> &[LineSegment2d] {
        &self.borders
    }

    /// The number of lanes.
    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    /// The x coordinate of the centre of the given lane, counting from the left.
    /// Lanes past the right-most one are treated as the right-most one.
    pub fn lane_center(&self, lane: usize) -> f64 {
        let lane_width = (self.right - self.left) / self.lane_count as f64;
        let lane = lane.min(self.lane_count - 1);
        self.left + lane_width * (lane as f64 + 0.5)
    }

    /// The x coordinates of the lane markings, both borders included.
    pub fn lane_boundaries(&self) -> Vec<f64> {
        linspace(self.left, self.right, self.lane_count + 1).collect()
    }
}
