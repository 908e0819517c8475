// Per-wheel values in canonical order: front-left, front-right, rear-left, rear-right

use std::fmt;
use std::ops::{Index, Sub};

use serde::{Deserialize, Serialize};

/// One of the four drive wheels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Wheel {
    /// All wheels in canonical order
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearLeft,
        Wheel::RearRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Wheel::FrontLeft => 0,
            Wheel::FrontRight => 1,
            Wheel::RearLeft => 2,
            Wheel::RearRight => 3,
        }
    }

    /// Human readable name, eg. "front left"
    pub fn name(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "front left",
            Wheel::FrontRight => "front right",
            Wheel::RearLeft => "rear left",
            Wheel::RearRight => "rear right",
        }
    }

    /// Key expression segment, eg. "front_left" in `grizzly/motors/front_left/status`
    pub fn topic_segment(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "front_left",
            Wheel::FrontRight => "front_right",
            Wheel::RearLeft => "rear_left",
            Wheel::RearRight => "rear_right",
        }
    }

    pub fn from_topic_segment(segment: &str) -> Option<Wheel> {
        Self::ALL.into_iter().find(|w| w.topic_segment() == segment)
    }
}

impl fmt::Display for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Four per-wheel values (speed, error, limit...).
///
/// Operations return new vectors; nothing mutates a vector in place.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelVector([f64; 4]);

impl WheelVector {
    pub fn new(front_left: f64, front_right: f64, rear_left: f64, rear_right: f64) -> Self {
        Self([front_left, front_right, rear_left, rear_right])
    }

    pub fn from_array(values: [f64; 4]) -> Self {
        Self(values)
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }

    /// Elementwise absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.map(f64::abs))
    }

    /// Wheel holding the largest value, and that value.
    ///
    /// Ties go to the earliest wheel in canonical order.
    pub fn max_coeff(&self) -> (Wheel, f64) {
        let mut best = Wheel::FrontLeft;
        for wheel in Wheel::ALL {
            if self[wheel] > self[best] {
                best = wheel;
            }
        }
        (best, self[best])
    }

    /// Copy of this vector with one wheel's value replaced by zero
    pub fn with_zeroed(&self, wheel: Wheel) -> Self {
        let mut values = self.0;
        values[wheel.index()] = 0.0;
        Self(values)
    }

    /// True when every wheel is within `epsilon` of zero
    pub fn is_stationary(&self, epsilon: f64) -> bool {
        self.0.iter().all(|v| v.abs() <= epsilon)
    }
}

impl Index<Wheel> for WheelVector {
    type Output = f64;

    fn index(&self, wheel: Wheel) -> &f64 {
        &self.0[wheel.index()]
    }
}

impl Sub for WheelVector {
    type Output = WheelVector;

    fn sub(self, rhs: WheelVector) -> WheelVector {
        Self(std::array::from_fn(|i| self.0[i] - rhs.0[i]))
    }
}
