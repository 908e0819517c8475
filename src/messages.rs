// Message types exchanged with the rest of the vehicle over zenoh (JSON payloads)
// All stamps are seconds since the UNIX epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::motion::{Wheel, WheelVector};

/// Wall-clock time in the same units as message stamps
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Four wheel speeds in rad/s.
///
/// Used for commanded drive, encoder readings and the gated safe drive alike.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Drive {
    pub stamp: f64,
    pub front_left: f64,
    pub front_right: f64,
    pub rear_left: f64,
    pub rear_right: f64,
}

impl Drive {
    pub fn from_wheels(stamp: f64, wheels: WheelVector) -> Self {
        Self {
            stamp,
            front_left: wheels[Wheel::FrontLeft],
            front_right: wheels[Wheel::FrontRight],
            rear_left: wheels[Wheel::RearLeft],
            rear_right: wheels[Wheel::RearRight],
        }
    }

    /// All wheels stopped, keeping the stamp
    pub fn zero(stamp: f64) -> Self {
        Self {
            stamp,
            ..Self::default()
        }
    }

    pub fn wheels(&self) -> WheelVector {
        WheelVector::new(
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        )
    }

    /// Age relative to `now`, never negative
    pub fn age(&self, now: f64) -> f64 {
        (now - self.stamp).max(0.0)
    }
}

bitflags! {
    /// Error bits in the MCU status word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct McuError: u16 {
        /// E-stop has been hit and is waiting for a reset
        const ESTOP_RESET = 1 << 0;
        /// Drive power is pre-charging
        const PRECHARGE = 1 << 1;
    }
}

/// Periodic status from the MCU
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct McuStatus {
    pub stamp: f64,
    pub error: u16,
}

impl McuStatus {
    /// Known error bits; unknown bits are ignored
    pub fn flags(&self) -> McuError {
        McuError::from_bits_truncate(self.error)
    }
}

bitflags! {
    /// Fault bits reported by a motor controller
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MotorFault: u8 {
        const OVERHEAT = 1 << 0;
        const OVERVOLTAGE = 1 << 1;
        const UNDERVOLTAGE = 1 << 2;
        const SHORT_CIRCUIT = 1 << 3;
        const EMERGENCY_STOP = 1 << 4;
        const SEPEX_EXCITATION = 1 << 5;
        const MOSFET_FAILURE = 1 << 6;
        const STARTUP_CONFIG = 1 << 7;
    }
}

/// Periodic status from one wheel's motor controller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MotorStatus {
    pub stamp: f64,
    pub fault: u8,
}

impl MotorStatus {
    pub fn faults(&self) -> MotorFault {
        MotorFault::from_bits_truncate(self.fault)
    }
}

/// E-stop assertion, from the operator button / safety relay or to the MCU
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct EstopCommand {
    pub data: bool,
}

/// Light / beeper pattern
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[default]
    Off,
    Solid,
    Flash,
    DoubleFlash,
}

/// Ambience instruction for the MCU; defaults to everything off
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Ambience {
    pub beacon: Pattern,
    pub headlight: Pattern,
    pub taillight: Pattern,
    pub beep: Pattern,
}

impl Ambience {
    /// Same pattern on every output
    pub fn all(pattern: Pattern) -> Self {
        Self {
            beacon: pattern,
            headlight: pattern,
            taillight: pattern,
            beep: pattern,
        }
    }
}

/// Severity of a diagnostic status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    #[default]
    Ok,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Status of one monitored component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticStatus {
    pub level: DiagnosticLevel,
    pub name: String,
    pub message: String,
    pub values: Vec<KeyValue>,
}

impl DiagnosticStatus {
    pub fn new(name: &str) -> Self {
        Self {
            level: DiagnosticLevel::Ok,
            name: name.to_string(),
            message: String::new(),
            values: Vec::new(),
        }
    }

    /// Set level and summary message
    pub fn summary(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        self.level = level;
        self.message = message.into();
    }

    pub fn add(&mut self, key: &str, value: impl ToString) {
        self.values.push(KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }
}

/// Diagnostics report published by the node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticArray {
    pub stamp: f64,
    pub hardware_id: String,
    pub status: Vec<DiagnosticStatus>,
}

impl DiagnosticArray {
    /// Worst level across all statuses
    pub fn level(&self) -> DiagnosticLevel {
        self.status
            .iter()
            .map(|s| s.level)
            .max()
            .unwrap_or_default()
    }
}
