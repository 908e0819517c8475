// Motor controller liveness and fault reporting

use super::HealthMonitor;
use crate::messages::{DiagnosticLevel, DiagnosticStatus, MotorFault, MotorStatus};
use crate::motion::Wheel;

/// Fault bits, their description and how bad they are
const FAULT_TABLE: [(MotorFault, &str, DiagnosticLevel); 8] = [
    (MotorFault::UNDERVOLTAGE, "Undervoltage fault", DiagnosticLevel::Warn),
    (MotorFault::EMERGENCY_STOP, "Emergency Stop fault", DiagnosticLevel::Warn),
    (MotorFault::SEPEX_EXCITATION, "Sepex Excitation fault", DiagnosticLevel::Warn),
    (MotorFault::STARTUP_CONFIG, "Startup Configuration fault", DiagnosticLevel::Warn),
    (MotorFault::OVERHEAT, "Overheat fault", DiagnosticLevel::Error),
    (MotorFault::OVERVOLTAGE, "Overvoltage fault", DiagnosticLevel::Error),
    (MotorFault::SHORT_CIRCUIT, "Short Circuit fault", DiagnosticLevel::Error),
    (MotorFault::MOSFET_FAILURE, "MOSFET Failure fault", DiagnosticLevel::Error),
];

/// Tracks the latest status from each wheel's motor controller
pub struct MotorsMonitor {
    statuses: [Option<MotorStatus>; 4],
    timeout: f64,
}

impl MotorsMonitor {
    pub fn new(timeout: f64) -> Self {
        Self {
            statuses: [None; 4],
            timeout,
        }
    }

    pub fn on_status(&mut self, wheel: Wheel, status: MotorStatus) {
        self.statuses[wheel.index()] = Some(status);
    }

    pub fn status(&self, wheel: Wheel) -> Option<&MotorStatus> {
        self.statuses[wheel.index()].as_ref()
    }
}

impl HealthMonitor for MotorsMonitor {
    /// Healthy only while every controller is reporting in
    fn ok(&self, now: f64) -> bool {
        self.statuses
            .iter()
            .all(|s| s.is_some_and(|s| now - s.stamp <= self.timeout))
    }

    fn diagnostic(&self, now: f64) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Motors");

        for wheel in Wheel::ALL {
            let Some(status) = self.status(wheel) else {
                stat.summary(
                    DiagnosticLevel::Error,
                    format!("Motor {} driver status message not received.", wheel),
                );
                return stat;
            };
            let age = now - status.stamp;
            if age > self.timeout {
                stat.summary(
                    DiagnosticLevel::Error,
                    format!(
                        "Last motor {} status message is stale ({:.3} seconds old). Check motor driver connectivity.",
                        wheel, age
                    ),
                );
                return stat;
            }
        }

        let mut level = DiagnosticLevel::Ok;
        let mut message = String::from("Motor controllers look good.");
        for wheel in Wheel::ALL {
            let faults = self.statuses[wheel.index()]
                .map(|s| s.faults())
                .unwrap_or(MotorFault::empty());
            let mut wheel_level = DiagnosticLevel::Ok;
            for (flag, description, flag_level) in FAULT_TABLE {
                if faults.contains(flag) {
                    stat.add(wheel.name(), description);
                    wheel_level = wheel_level.max(flag_level);
                }
            }
            if wheel_level > level {
                level = wheel_level;
                message = match wheel_level {
                    DiagnosticLevel::Error => format!("Motor at {} is in a serious fault state", wheel),
                    _ => format!("Motor at {} is in a fault state", wheel),
                };
            }
        }

        stat.summary(level, message);
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_at(stamp: f64) -> MotorsMonitor {
        let mut m = MotorsMonitor::new(0.1);
        for wheel in Wheel::ALL {
            m.on_status(wheel, MotorStatus { stamp, fault: 0 });
        }
        m
    }

    #[test]
    fn test_not_ok_until_all_report() {
        let mut m = MotorsMonitor::new(0.1);
        assert!(!m.ok(0.0));
        for wheel in [Wheel::FrontLeft, Wheel::FrontRight, Wheel::RearLeft] {
            m.on_status(wheel, MotorStatus { stamp: 0.0, fault: 0 });
        }
        assert!(!m.ok(0.0));
        let stat = m.diagnostic(0.0);
        assert_eq!(stat.level, DiagnosticLevel::Error);
        assert!(stat.message.contains("rear right"), "got {}", stat.message);

        m.on_status(Wheel::RearRight, MotorStatus { stamp: 0.0, fault: 0 });
        assert!(m.ok(0.0));
    }

    #[test]
    fn test_stale_status_not_ok() {
        let m = healthy_at(5.0);
        assert!(m.ok(5.05));
        assert!(!m.ok(5.2));
        assert!(m.diagnostic(5.2).message.contains("stale"));
    }

    #[test]
    fn test_fault_bits_do_not_gate_motion() {
        let mut m = healthy_at(1.0);
        m.on_status(
            Wheel::FrontLeft,
            MotorStatus { stamp: 1.0, fault: MotorFault::OVERHEAT.bits() },
        );
        assert!(m.ok(1.0));
    }

    #[test]
    fn test_fault_levels() {
        let mut m = healthy_at(1.0);
        assert_eq!(m.diagnostic(1.0).level, DiagnosticLevel::Ok);

        m.on_status(
            Wheel::RearLeft,
            MotorStatus { stamp: 1.0, fault: MotorFault::UNDERVOLTAGE.bits() },
        );
        let stat = m.diagnostic(1.0);
        assert_eq!(stat.level, DiagnosticLevel::Warn);
        assert_eq!(stat.value("rear left"), Some("Undervoltage fault"));

        m.on_status(
            Wheel::FrontRight,
            MotorStatus {
                stamp: 1.0,
                fault: (MotorFault::SHORT_CIRCUIT | MotorFault::EMERGENCY_STOP).bits(),
            },
        );
        let stat = m.diagnostic(1.0);
        assert_eq!(stat.level, DiagnosticLevel::Error);
        assert_eq!(stat.message, "Motor at front right is in a serious fault state");
    }
}
