//! Core sample types

use serde::{Deserialize, Serialize};

/// One timestamped 3-axis accelerometer reading.
///
/// `timestamp` is a free-running tick counter that may wrap; only differences
/// between timestamps are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic tick count
    pub timestamp: u32,
    /// X axis, raw counts
    pub x: i16,
    /// Y axis, raw counts
    pub y: i16,
    /// Z axis, raw counts
    pub z: i16,
}

impl Sample {
    /// Create a sample.
    pub const fn new(timestamp: u32, x: i16, y: i16, z: i16) -> Self {
        Self { timestamp, x, y, z }
    }

    /// All-zero reading at `timestamp`.
    pub const fn at_rest(timestamp: u32) -> Self {
        Self::new(timestamp, 0, 0, 0)
    }

    /// Axis values in X, Y, Z order.
    pub fn axes(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

/// Accelerometer axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in storage order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Storage index of the axis.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}
