// Rate-of-change limiter for one wheel's commanded speed

use super::wheels::Wheel;

/// Bounds how fast one wheel's command may change.
///
/// Each application moves the previous output toward the requested speed by at
/// most `max_rate * elapsed`, where elapsed is measured between command stamps.
#[derive(Debug, Clone)]
pub struct AccelerationLimiter {
    wheel: Wheel,
    max_rate: f64,
    previous: f64,
    last_stamp: Option<f64>,
}

impl AccelerationLimiter {
    /// `max_rate` is the wheel's angular acceleration limit in rad/s^2
    pub fn new(wheel: Wheel, max_rate: f64) -> Self {
        Self {
            wheel,
            max_rate,
            previous: 0.0,
            last_stamp: None,
        }
    }

    pub fn wheel(&self) -> Wheel {
        self.wheel
    }

    pub fn previous(&self) -> f64 {
        self.previous
    }

    /// Forget history: the next output starts from standstill
    pub fn reset(&mut self) {
        self.previous = 0.0;
        self.last_stamp = None;
    }

    /// Limit `requested` (commanded at `stamp`) and return the speed to send.
    ///
    /// The first application after construction or [`reset`](Self::reset) has
    /// no elapsed time to spend, so it holds the previous output (zero) and
    /// only records the stamp. Stamps going backwards count as zero elapsed.
    pub fn apply(&mut self, requested: f64, stamp: f64) -> f64 {
        let elapsed = match self.last_stamp {
            Some(last) => (stamp - last).max(0.0),
            None => 0.0,
        };
        let max_delta = self.max_rate * elapsed;
        let delta = (requested - self.previous).clamp(-max_delta, max_delta);

        self.previous += delta;
        self.last_stamp = Some(stamp);
        self.previous
    }
}
