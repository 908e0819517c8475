// Timeouts, topics, safety thresholds
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::motion::Wheel;

// Supervisor tick frequency
pub const LOOP_HZ: u64 = 20;

// Tick period, also the unit the diagnostics cadence is counted in
pub const TICK_PERIOD: Duration = Duration::from_millis(1000 / LOOP_HZ);

// Diagnostics are published once per second
pub const DIAGNOSTIC_EVERY_TICKS: u64 = LOOP_HZ;

// Hardware id reported with every diagnostics array
pub const HARDWARE_ID: &str = "grizzly";

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "grizzly/cmd_drive"; // commanded wheel speeds
pub const TOPIC_SAFE_DRIVE: &str = "grizzly/safe_cmd_drive"; // gated wheel speeds
pub const TOPIC_ENCODERS: &str = "grizzly/motors/encoders"; // measured wheel speeds
pub const TOPIC_MCU_STATUS: &str = "grizzly/mcu/status";
pub const TOPIC_MCU_AMBIENCE: &str = "grizzly/mcu/ambience";
pub const TOPIC_MCU_ESTOP: &str = "grizzly/mcu/estop";
pub const TOPIC_ESTOP: &str = "grizzly/estop"; // operator / safety relay
pub const TOPIC_MOTOR_STATUS: &str = "grizzly/motors/*/status"; // one per wheel
pub const TOPIC_DIAGNOSTICS: &str = "grizzly/diagnostics";

/// Concrete status topic for one wheel's motor controller
pub fn motor_status_topic(wheel: Wheel) -> String {
    format!("grizzly/motors/{}/status", wheel.topic_segment())
}

/// Error loading or validating a [`SafetyConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Policy knobs for the motion supervisor and its monitors.
///
/// All durations are in seconds, all speeds in rad/s at the wheel unless
/// stated otherwise. Any field omitted from the JSON file keeps its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Encoder readings older than this make the encoders unhealthy
    pub encoders_timeout: f64,
    /// Gap between worst and second-worst wheel error that marks a candidate
    pub encoder_speed_error_diff_threshold: f64,
    /// How long a candidate must persist before it is confirmed
    pub encoder_fault_time_to_failure: f64,
    /// A failed encoder reads within this band around zero
    pub encoder_near_zero: f64,
    /// All wheels within this band around zero counts as stationary
    pub stationary_epsilon: f64,

    /// Track width in meters
    pub vehicle_width: f64,
    /// Wheel radius in meters
    pub wheel_radius: f64,
    /// Maximum linear acceleration in m/s^2
    pub max_acceleration: f64,

    pub starting_duration: f64,
    /// A move command newer than this is "recent"
    pub movement_command_window: f64,
    /// Moving falls back to Stopped after this long without a move command
    pub moving_command_timeout: f64,
    /// PendingStopped requires no move command for at least this long
    pub pending_stop_quiet_period: f64,
    /// Continuous pre-charge longer than this is an electrical fault
    pub precharge_timeout: f64,

    /// Motor controller status older than this makes the controllers unhealthy
    pub motors_timeout: f64,

    // Liveness diagnostics, Hz
    pub expected_mcu_status_frequency: f64,
    pub min_cmd_drive_frequency: f64,
    pub max_cmd_drive_frequency: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            encoders_timeout: 0.11,
            encoder_speed_error_diff_threshold: 0.5,
            encoder_fault_time_to_failure: 0.5,
            encoder_near_zero: 0.01,
            stationary_epsilon: 0.001,
            vehicle_width: 1.01,
            wheel_radius: 0.333,
            max_acceleration: 1.0,
            starting_duration: 2.0,
            movement_command_window: 0.1,
            moving_command_timeout: 3.0,
            pending_stop_quiet_period: 1.0,
            precharge_timeout: 4.0,
            motors_timeout: 0.1,
            expected_mcu_status_frequency: 50.0,
            min_cmd_drive_frequency: 10.0,
            max_cmd_drive_frequency: 50.0,
        }
    }
}

impl SafetyConfig {
    /// Read a JSON config file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SafetyConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("encoders_timeout", self.encoders_timeout),
            ("encoder_fault_time_to_failure", self.encoder_fault_time_to_failure),
            ("vehicle_width", self.vehicle_width),
            ("wheel_radius", self.wheel_radius),
            ("max_acceleration", self.max_acceleration),
            ("starting_duration", self.starting_duration),
            ("movement_command_window", self.movement_command_window),
            ("moving_command_timeout", self.moving_command_timeout),
            ("pending_stop_quiet_period", self.pending_stop_quiet_period),
            ("precharge_timeout", self.precharge_timeout),
            ("motors_timeout", self.motors_timeout),
            ("expected_mcu_status_frequency", self.expected_mcu_status_frequency),
            ("min_cmd_drive_frequency", self.min_cmd_drive_frequency),
            ("max_cmd_drive_frequency", self.max_cmd_drive_frequency),
        ];
        for (field, value) in positive {
            // NaN fails this comparison too
            if !(value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive, got {}", value),
                });
            }
        }

        let non_negative = [
            (
                "encoder_speed_error_diff_threshold",
                self.encoder_speed_error_diff_threshold,
            ),
            ("encoder_near_zero", self.encoder_near_zero),
            ("stationary_epsilon", self.stationary_epsilon),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must not be negative, got {}", value),
                });
            }
        }

        if self.min_cmd_drive_frequency > self.max_cmd_drive_frequency {
            return Err(ConfigError::Invalid {
                field: "min_cmd_drive_frequency",
                reason: format!(
                    "{} exceeds max_cmd_drive_frequency {}",
                    self.min_cmd_drive_frequency, self.max_cmd_drive_frequency
                ),
            });
        }

        Ok(())
    }

    /// Per-wheel angular acceleration limit in rad/s^2
    pub fn wheel_acceleration_limit(&self) -> f64 {
        self.max_acceleration / self.wheel_radius
    }
}
