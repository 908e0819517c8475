// Health monitors consulted by the motion supervisor
//
// Each monitor keeps only the latest message per input and answers
// "is this subsystem fit to move the vehicle right now?".

mod encoders;
mod frequency;
mod motors;

pub use encoders::{EncoderMonitor, FaultVerdict};
pub use frequency::FrequencyMonitor;
pub use motors::MotorsMonitor;

use crate::messages::DiagnosticStatus;

/// A subsystem whose health gates motion
pub trait HealthMonitor {
    /// Whether motion may continue, evaluated at `now`.
    ///
    /// Takes `&mut self` so monitors can advance their own detection state.
    fn ok(&self, now: f64) -> bool;

    /// Human readable status for the diagnostics report
    fn diagnostic(&self, now: f64) -> DiagnosticStatus;
}
