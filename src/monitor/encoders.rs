// Encoder sanity monitoring
//
// A failed encoder (or its cabling) reads zero, or buzzes around zero, while
// the wheel is commanded to turn. A stalled wheel under heavy load looks
// similar, but load tends to slow every wheel together. So a wheel is only
// suspected when its error stands well clear of the next-worst wheel, and
// only condemned when that holds continuously for a while.

use tracing::{debug, error};

use super::HealthMonitor;
use crate::config::SafetyConfig;
use crate::messages::{DiagnosticLevel, DiagnosticStatus, Drive};
use crate::motion::{wheels_to_twist, Wheel, WheelVector};

/// Result of evaluating an encoder reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    /// Nothing suspicious, or not enough data yet
    NoCandidate,
    /// This wheel looks failed in the latest reading only
    Candidate(Wheel),
    /// This wheel has looked failed for longer than the persistence window.
    /// Never cleared for the life of the process.
    Confirmed(Wheel),
}

impl FaultVerdict {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, FaultVerdict::Confirmed(_))
    }
}

pub struct EncoderMonitor {
    last_encoders: Option<Drive>,
    last_drive: Option<Drive>,
    // Stamp of the latest encoder reading that produced no candidate
    time_of_last_nonsuspect: Option<f64>,
    verdict: FaultVerdict,

    encoders_timeout: f64,
    error_diff_threshold: f64,
    time_to_failure: f64,
    near_zero: f64,
    stationary_epsilon: f64,
    vehicle_width: f64,
    wheel_radius: f64,
}

impl EncoderMonitor {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            last_encoders: None,
            last_drive: None,
            time_of_last_nonsuspect: None,
            verdict: FaultVerdict::NoCandidate,
            encoders_timeout: config.encoders_timeout,
            error_diff_threshold: config.encoder_speed_error_diff_threshold,
            time_to_failure: config.encoder_fault_time_to_failure,
            near_zero: config.encoder_near_zero,
            stationary_epsilon: config.stationary_epsilon,
            vehicle_width: config.vehicle_width,
            wheel_radius: config.wheel_radius,
        }
    }

    /// New measured wheel speeds. Every reading is checked against the latest
    /// drive, so a healthy reading between supervisor ticks still restarts
    /// the persistence clock.
    pub fn on_encoders(&mut self, encoders: Drive) {
        self.last_encoders = Some(encoders);
        self.evaluate(encoders);
    }

    /// New wheel speeds sent to the motors
    pub fn on_drive(&mut self, drive: Drive) {
        self.last_drive = Some(drive);
    }

    /// The wheel whose encoder has been condemned, if any
    pub fn failed_encoder(&self) -> Option<Wheel> {
        match self.verdict {
            FaultVerdict::Confirmed(wheel) => Some(wheel),
            _ => None,
        }
    }

    /// Verdict from the most recent encoder reading. Sticky once confirmed.
    pub fn verdict(&self) -> FaultVerdict {
        self.verdict
    }

    /// Single-reading check: the wheel that looks like a failed encoder, if any
    fn detect_candidate(&self, measured: &WheelVector, commanded: &WheelVector) -> Option<Wheel> {
        let error = (*measured - *commanded).abs();

        let (candidate, max_error) = error.max_coeff();
        let (_, second_max_error) = error.with_zeroed(candidate).max_coeff();
        let max_error_diff = max_error - second_max_error;

        // A failed encoder reads still or buzzing near zero; a large reading is a real speed
        if measured[candidate].abs() > self.near_zero {
            return None;
        }

        if max_error_diff <= self.error_diff_threshold {
            return None;
        }

        Some(candidate)
    }

    // Advance the persistence tracking with one reading
    fn evaluate(&mut self, encoders: Drive) {
        if self.verdict.is_confirmed() {
            return;
        }

        // Nothing sent to the motors recently: nothing to compare against
        let Some(drive) = self.last_drive else {
            return;
        };
        if encoders.stamp - drive.stamp > self.encoders_timeout {
            return;
        }

        self.verdict = match self.detect_candidate(&encoders.wheels(), &drive.wheels()) {
            Some(wheel) => {
                // First ever evaluation starts the clock rather than counting from zero
                let since = *self.time_of_last_nonsuspect.get_or_insert(encoders.stamp);
                if encoders.stamp - since > self.time_to_failure {
                    error!(
                        "Encoder failure confirmed on {} wheel after {:.2}s",
                        wheel,
                        encoders.stamp - since
                    );
                    FaultVerdict::Confirmed(wheel)
                } else {
                    debug!("Encoder failure candidate: {} wheel", wheel);
                    FaultVerdict::Candidate(wheel)
                }
            }
            None => {
                self.time_of_last_nonsuspect = Some(encoders.stamp);
                FaultVerdict::NoCandidate
            }
        };
    }

    /// Whether the vehicle is turning its wheels, per the latest encoder reading.
    /// Without any reading it is assumed still.
    pub fn moving(&self) -> bool {
        self.last_encoders
            .is_some_and(|e| !e.wheels().is_stationary(self.stationary_epsilon))
    }
}

impl HealthMonitor for EncoderMonitor {
    fn ok(&self, now: f64) -> bool {
        // No encoder data, or it's old: definitely not okay
        match self.last_encoders {
            Some(encoders) if encoders.age(now) <= self.encoders_timeout => {}
            _ => return false,
        }

        // No drive data, or it's old: still initializing, nothing to compare against
        match self.last_drive {
            Some(drive) if drive.age(now) <= self.encoders_timeout => {}
            _ => return true,
        }

        !self.verdict.is_confirmed()
    }

    fn diagnostic(&self, now: f64) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Encoders");

        let Some(encoders) = self.last_encoders else {
            stat.summary(DiagnosticLevel::Error, "No encoders messages received.");
            return stat;
        };

        let age = encoders.age(now);
        stat.add("Age of last encoders message", format!("{:.3}", age));
        if age > self.encoders_timeout {
            stat.summary(DiagnosticLevel::Error, "Last encoders message is stale.");
            return stat;
        }

        if let Some(wheel) = self.failed_encoder() {
            stat.summary(
                DiagnosticLevel::Error,
                format!(
                    "Encoder failure detected in {} wheel. Not a recoverable error, please service system.",
                    wheel
                ),
            );
            return stat;
        }

        let twist = wheels_to_twist(&encoders.wheels(), self.vehicle_width, self.wheel_radius);
        stat.add("Measured linear velocity (m/s)", format!("{:.3}", twist.linear));
        stat.add("Measured angular velocity (rad/s)", format!("{:.3}", twist.angular));
        stat.summary(DiagnosticLevel::Ok, "Encoders look good.");
        stat
    }
}
