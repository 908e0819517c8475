// Motion safety state machine
//
// Gates commanded wheel speeds on their way to the motors. Motion is only
// passed through (acceleration limited) in Moving, which is reached via a
// Starting period of lights and beeping. Unhealthy encoders or motor
// controllers, or an e-stop, drop the vehicle into PendingStopped, which holds
// the e-stop asserted until the vehicle is still, quiet and reset. Fault is
// terminal for the process.

use std::fmt;

use tracing::{error, info, warn};

use crate::config::SafetyConfig;
use crate::messages::{
    Ambience, DiagnosticLevel, DiagnosticStatus, Drive, McuError, McuStatus, Pattern,
};
use crate::monitor::{EncoderMonitor, FaultVerdict, HealthMonitor};
use crate::motion::{AccelerationLimiter, Wheel, WheelVector};

/// Why the supervisor gave up for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    /// Pre-charge reported continuously for too long
    Precharge,
    EncoderFailure(Wheel),
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::Precharge => write!(f, "Precharge persisted for too long."),
            FaultReason::EncoderFailure(wheel) => {
                write!(f, "Encoder failure detected in {} wheel.", wheel)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionState {
    Stopped,
    /// Warning bystanders; becomes Moving at `moving_at`
    Starting { moving_at: f64 },
    Moving,
    /// E-stop asserted until the vehicle is still, quiet and reset
    PendingStopped,
    /// Terminal: needs service
    Fault(FaultReason),
}

impl MotionState {
    pub fn name(&self) -> &'static str {
        match self {
            MotionState::Stopped => "Stopped",
            MotionState::Starting { .. } => "Starting",
            MotionState::Moving => "Moving",
            MotionState::PendingStopped => "PendingStopped",
            MotionState::Fault(_) => "Fault",
        }
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to publish to the MCU after a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    pub estop: bool,
    pub ambience: Ambience,
}

pub struct MotionSupervisor {
    state: MotionState,
    encoders: EncoderMonitor,
    limiters: [AccelerationLimiter; 4],

    last_mcu_status: Option<McuStatus>,
    // Stamp of the latest MCU status without the pre-charge bit
    last_non_precharge_time: Option<f64>,
    // Stamp of the latest non-stationary drive command
    last_commanded_movement_time: Option<f64>,

    stationary_epsilon: f64,
    starting_duration: f64,
    movement_command_window: f64,
    moving_command_timeout: f64,
    pending_stop_quiet_period: f64,
    precharge_timeout: f64,
}

impl MotionSupervisor {
    pub fn new(config: &SafetyConfig) -> Self {
        let limit = config.wheel_acceleration_limit();
        Self {
            state: MotionState::Stopped,
            encoders: EncoderMonitor::new(config),
            limiters: Wheel::ALL.map(|wheel| AccelerationLimiter::new(wheel, limit)),
            last_mcu_status: None,
            last_non_precharge_time: None,
            last_commanded_movement_time: None,
            stationary_epsilon: config.stationary_epsilon,
            starting_duration: config.starting_duration,
            movement_command_window: config.movement_command_window,
            moving_command_timeout: config.moving_command_timeout,
            pending_stop_quiet_period: config.pending_stop_quiet_period,
            precharge_timeout: config.precharge_timeout,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// True only in Moving
    pub fn movement_enabled(&self) -> bool {
        self.state == MotionState::Moving
    }

    pub fn encoders(&self) -> &EncoderMonitor {
        &self.encoders
    }

    /// Whether the MCU is holding an e-stop that needs a reset
    pub fn is_estopped(&self) -> bool {
        self.last_mcu_status
            .is_some_and(|s| s.flags().contains(McuError::ESTOP_RESET))
    }

    /// Seconds since the last non-stationary command; infinite if there never was one
    pub fn time_since_movement_command(&self, now: f64) -> f64 {
        self.last_commanded_movement_time
            .map_or(f64::INFINITY, |t| now - t)
    }

    fn transition(&mut self, next: MotionState) {
        if self.state == next {
            return;
        }
        // Fault is left only by restarting the process
        if let MotionState::Fault(_) = self.state {
            return;
        }

        match next {
            MotionState::PendingStopped => warn!("Motion state {} -> {}", self.state, next),
            MotionState::Fault(reason) => error!("Motion state {} -> Fault: {}", self.state, reason),
            _ => info!("Motion state {} -> {}", self.state, next),
        }

        if next == MotionState::Moving {
            for limiter in &mut self.limiters {
                limiter.reset();
            }
        }
        self.state = next;
    }

    fn set_fault(&mut self, reason: FaultReason) {
        self.transition(MotionState::Fault(reason));
    }

    fn check_faults(&mut self) {
        if let MotionState::Fault(_) = self.state {
            return;
        }

        if let (Some(status), Some(since)) = (self.last_mcu_status, self.last_non_precharge_time) {
            if status.stamp - since > self.precharge_timeout {
                self.set_fault(FaultReason::Precharge);
            }
        }

        if let FaultVerdict::Confirmed(wheel) = self.encoders.verdict() {
            self.set_fault(FaultReason::EncoderFailure(wheel));
        }
    }

    /// A commanded drive arrived. Returns the drive to forward to the motors.
    ///
    /// Limited per wheel while Moving, all zeros (same stamp) otherwise.
    pub fn on_drive(&mut self, commanded: &Drive) -> Drive {
        // Starting is triggered from here
        if !commanded.wheels().is_stationary(self.stationary_epsilon) {
            self.last_commanded_movement_time = Some(commanded.stamp);
        }

        let safe = if self.movement_enabled() {
            let requested = commanded.wheels();
            let limited = self
                .limiters
                .each_mut()
                .map(|l| l.apply(requested[l.wheel()], commanded.stamp));
            Drive::from_wheels(commanded.stamp, WheelVector::from_array(limited))
        } else {
            Drive::zero(commanded.stamp)
        };

        // The encoders are judged against what the motors were actually told
        self.encoders.on_drive(safe);
        safe
    }

    pub fn on_encoders(&mut self, encoders: Drive) {
        self.encoders.on_encoders(encoders);
    }

    pub fn on_mcu_status(&mut self, status: McuStatus) {
        let since = self.last_non_precharge_time.get_or_insert(status.stamp);
        if !status.flags().contains(McuError::PRECHARGE) {
            *since = status.stamp;
        }
        self.last_mcu_status = Some(status);
    }

    /// External e-stop input. Returns true when an e-stop should be published
    /// immediately, ahead of the next tick.
    pub fn on_estop(&mut self, asserted: bool) -> bool {
        if !asserted {
            return false;
        }
        warn!("E-stop asserted in state {}", self.state);
        if !matches!(self.state, MotionState::Fault(_)) {
            self.transition(MotionState::PendingStopped);
        }
        true
    }

    /// Periodic evaluation. `motors_ok` is the motor controllers' health.
    pub fn tick(&mut self, now: f64, motors_ok: bool) -> TickOutput {
        let mut ambience = Ambience::default();
        let mut estop = false;

        self.check_faults();

        let encoders_ok = self.encoders.ok(now);
        let command_age = self.time_since_movement_command(now);

        if self.state == MotionState::Stopped
            && command_age < self.movement_command_window
            && !self.is_estopped()
        {
            self.transition(MotionState::Starting {
                moving_at: now + self.starting_duration,
            });
        }

        if let MotionState::Starting { moving_at } = self.state {
            ambience = Ambience::all(Pattern::DoubleFlash);
            let next = if !encoders_ok || !motors_ok || self.is_estopped() {
                MotionState::PendingStopped
            } else if command_age > self.movement_command_window {
                MotionState::Stopped
            } else if now >= moving_at {
                MotionState::Moving
            } else {
                self.state
            };
            self.transition(next);
        }

        if self.state == MotionState::Moving {
            if !encoders_ok || !motors_ok {
                self.transition(MotionState::PendingStopped);
            } else if command_age > self.moving_command_timeout {
                self.transition(MotionState::Stopped);
            }
        }

        if self.state == MotionState::PendingStopped {
            estop = true;
            // All three must hold to leave: wheels still, no recent move
            // command, and the MCU latched in e-stop awaiting reset
            if !self.encoders.moving()
                && command_age > self.pending_stop_quiet_period
                && self.is_estopped()
            {
                self.transition(MotionState::Stopped);
            }
        }

        if let MotionState::Fault(_) = self.state {
            estop = true;
        }

        TickOutput { estop, ambience }
    }

    pub fn diagnostic(&self, now: f64) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Motion Safety");
        match self.state {
            MotionState::Fault(reason) => {
                stat.summary(DiagnosticLevel::Error, format!("Fault: {}", reason));
            }
            MotionState::PendingStopped => stat.summary(
                DiagnosticLevel::Warn,
                format!("Motion state machine state is: {}", self.state),
            ),
            _ => stat.summary(
                DiagnosticLevel::Ok,
                format!("Motion state machine state is: {}", self.state),
            ),
        }

        stat.add("state", self.state);
        stat.add(
            "last move command (seconds)",
            format!("{:.3}", self.time_since_movement_command(now)),
        );
        stat.add("vehicle in motion", self.encoders.moving());
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: f64 = 1000.0;

    fn supervisor() -> MotionSupervisor {
        MotionSupervisor::new(&SafetyConfig::default())
    }

    fn drive(stamp: f64, speed: f64) -> Drive {
        Drive::from_wheels(stamp, WheelVector::from_array([speed; 4]))
    }

    fn mcu(stamp: f64, error: McuError) -> McuStatus {
        McuStatus {
            stamp,
            error: error.bits(),
        }
    }

    /// Healthy encoder reading matching the last safe drive
    fn echo_encoders(s: &mut MotionSupervisor, stamp: f64, speed: f64) {
        s.on_encoders(drive(stamp, speed));
    }

    /// Command + matching encoders + tick, all at `t`
    fn drive_tick(s: &mut MotionSupervisor, t: f64, speed: f64) -> TickOutput {
        let safe = s.on_drive(&drive(t, speed));
        echo_encoders(s, t, safe.front_left);
        s.tick(t, true)
    }

    /// Drive from Stopped into Moving; returns the time Moving was reached
    fn start_moving(s: &mut MotionSupervisor) -> f64 {
        let mut t = T0;
        drive_tick(s, t, 1.0);
        assert!(matches!(s.state(), MotionState::Starting { .. }));
        for i in 1..=40 {
            t = T0 + 0.05 * i as f64;
            drive_tick(s, t, 1.0);
        }
        assert_eq!(s.state(), MotionState::Moving);
        t
    }

    #[test]
    fn test_initial_state_is_stopped() {
        let s = supervisor();
        assert_eq!(s.state(), MotionState::Stopped);
        assert!(!s.movement_enabled());
    }

    #[test]
    fn test_stationary_command_does_not_start() {
        let mut s = supervisor();
        s.on_drive(&drive(T0, 0.0));
        echo_encoders(&mut s, T0, 0.0);
        let out = s.tick(T0, true);
        assert_eq!(s.state(), MotionState::Stopped);
        assert!(!out.estop);
        assert_eq!(out.ambience, Ambience::default());
    }

    #[test]
    fn test_move_command_starts_then_moves_after_starting_duration() {
        let mut s = supervisor();
        let out = drive_tick(&mut s, T0, 1.0);
        assert_eq!(s.state(), MotionState::Starting { moving_at: T0 + 2.0 });
        assert_eq!(out.ambience, Ambience::all(Pattern::DoubleFlash));
        assert!(!out.estop);

        drive_tick(&mut s, T0 + 1.95, 1.0);
        assert!(matches!(s.state(), MotionState::Starting { .. }));

        let out = drive_tick(&mut s, T0 + 2.0, 1.0);
        assert_eq!(s.state(), MotionState::Moving);
        assert!(s.movement_enabled());
        assert!(!out.estop);
    }

    #[test]
    fn test_no_start_while_estopped() {
        let mut s = supervisor();
        s.on_mcu_status(mcu(T0, McuError::ESTOP_RESET));
        drive_tick(&mut s, T0, 1.0);
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_starting_drops_to_stopped_when_commands_go_stale() {
        let mut s = supervisor();
        drive_tick(&mut s, T0, 1.0);
        echo_encoders(&mut s, T0 + 0.15, 0.0);
        s.tick(T0 + 0.15, true);
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_starting_goes_pending_on_unhealthy_motors() {
        let mut s = supervisor();
        drive_tick(&mut s, T0, 1.0);
        s.on_drive(&drive(T0 + 0.05, 1.0));
        echo_encoders(&mut s, T0 + 0.05, 0.0);
        let out = s.tick(T0 + 0.05, false);
        assert_eq!(s.state(), MotionState::PendingStopped);
        assert!(out.estop);
    }

    #[test]
    fn test_starting_goes_pending_without_encoders() {
        let mut s = supervisor();
        s.on_drive(&drive(T0, 1.0));
        s.tick(T0, true);
        assert_eq!(s.state(), MotionState::PendingStopped);
    }

    #[test]
    fn test_safe_drive_is_zero_unless_moving() {
        let mut s = supervisor();
        let safe = s.on_drive(&drive(T0, 3.0));
        assert_eq!(safe, Drive::zero(T0));
    }

    #[test]
    fn test_moving_drive_is_acceleration_limited() {
        let mut s = supervisor();
        let t = start_moving(&mut s);
        let limit = SafetyConfig::default().wheel_acceleration_limit();

        // First command after entering Moving starts from standstill
        let first = s.on_drive(&drive(t + 0.05, 10.0));
        assert_eq!(first.wheels(), WheelVector::zero());

        let second = s.on_drive(&drive(t + 0.1, 10.0));
        for w in Wheel::ALL {
            let expected = limit * 0.05;
            assert!(
                (second.wheels()[w] - expected).abs() < 1e-6,
                "{} wheel: {} vs {}",
                w,
                second.wheels()[w],
                expected
            );
        }
    }

    #[test]
    fn test_moving_times_out_to_stopped() {
        let mut s = supervisor();
        let t = start_moving(&mut s);

        // Stationary commands keep coming, but no movement is asked for
        for i in 1..=59 {
            let now = t + 0.05 * i as f64;
            s.on_drive(&drive(now, 0.0));
            echo_encoders(&mut s, now, 0.0);
            s.tick(now, true);
        }
        assert_eq!(s.state(), MotionState::Moving);

        let now = t + 3.1;
        s.on_drive(&drive(now, 0.0));
        echo_encoders(&mut s, now, 0.0);
        s.tick(now, true);
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_moving_goes_pending_on_unhealthy_motors() {
        let mut s = supervisor();
        let t = start_moving(&mut s);
        let out = s.tick(t + 0.01, false);
        assert_eq!(s.state(), MotionState::PendingStopped);
        assert!(out.estop);
        assert!(!s.movement_enabled());
    }

    #[test]
    fn test_moving_unhealthy_beats_command_timeout() {
        // Both exits apply on the same tick: the one that asserts e-stop wins
        let mut s = supervisor();
        let t = start_moving(&mut s);
        echo_encoders(&mut s, t + 3.1, 0.0);
        let out = s.tick(t + 3.1, false);
        assert_eq!(s.state(), MotionState::PendingStopped);
        assert!(out.estop);
    }

    #[test]
    fn test_moving_goes_pending_on_stale_encoders() {
        let mut s = supervisor();
        let t = start_moving(&mut s);
        s.on_drive(&drive(t + 0.2, 1.0));
        s.tick(t + 0.2, true);
        assert_eq!(s.state(), MotionState::PendingStopped);
    }

    #[test]
    fn test_estop_forces_pending_and_requests_publish() {
        let mut s = supervisor();
        let t = start_moving(&mut s);
        assert!(s.on_estop(true));
        assert_eq!(s.state(), MotionState::PendingStopped);
        assert!(!s.on_estop(false));

        let out = s.tick(t + 0.05, true);
        assert!(out.estop);
    }

    /// Put a supervisor in PendingStopped at T0 with a moving vehicle
    fn pending() -> MotionSupervisor {
        let mut s = supervisor();
        s.on_drive(&drive(T0, 1.0));
        echo_encoders(&mut s, T0, 1.0);
        s.on_estop(true);
        assert_eq!(s.state(), MotionState::PendingStopped);
        s
    }

    #[test]
    fn test_pending_clears_when_still_quiet_and_reset() {
        let mut s = pending();
        let t = T0 + 1.5;
        echo_encoders(&mut s, t, 0.0);
        s.on_mcu_status(mcu(t, McuError::ESTOP_RESET));
        let out = s.tick(t, true);
        assert_eq!(s.state(), MotionState::Stopped);
        assert!(out.estop, "e-stop stays asserted for the tick that leaves PendingStopped");

        let out = s.tick(t + 0.05, true);
        assert!(!out.estop);
    }

    #[test]
    fn test_pending_holds_while_vehicle_moves() {
        let mut s = pending();
        let t = T0 + 1.5;
        echo_encoders(&mut s, t, 0.5);
        s.on_mcu_status(mcu(t, McuError::ESTOP_RESET));
        assert!(s.tick(t, true).estop);
        assert_eq!(s.state(), MotionState::PendingStopped);
    }

    #[test]
    fn test_pending_holds_while_commands_recent() {
        let mut s = pending();
        let t = T0 + 1.5;
        s.on_drive(&drive(t - 0.5, 1.0));
        echo_encoders(&mut s, t, 0.0);
        s.on_mcu_status(mcu(t, McuError::ESTOP_RESET));
        s.tick(t, true);
        assert_eq!(s.state(), MotionState::PendingStopped);
    }

    #[test]
    fn test_pending_holds_until_mcu_estop_latched() {
        let mut s = pending();
        let t = T0 + 1.5;
        echo_encoders(&mut s, t, 0.0);
        s.on_mcu_status(mcu(t, McuError::empty()));
        s.tick(t, true);
        assert_eq!(s.state(), MotionState::PendingStopped);

        s.on_mcu_status(mcu(t + 0.05, McuError::ESTOP_RESET));
        echo_encoders(&mut s, t + 0.05, 0.0);
        s.tick(t + 0.05, true);
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_precharge_persisting_faults() {
        let mut s = supervisor();
        s.on_mcu_status(mcu(T0, McuError::empty()));
        for i in 1..=78 {
            let t = T0 + 0.05 * i as f64;
            s.on_mcu_status(mcu(t, McuError::PRECHARGE));
            s.tick(t, true);
        }
        assert_eq!(s.state(), MotionState::Stopped);

        s.on_mcu_status(mcu(T0 + 4.1, McuError::PRECHARGE));
        let out = s.tick(T0 + 4.1, true);
        assert_eq!(s.state(), MotionState::Fault(FaultReason::Precharge));
        assert!(out.estop);
    }

    #[test]
    fn test_intermittent_precharge_does_not_fault() {
        let mut s = supervisor();
        for i in 0..200 {
            let t = T0 + 0.05 * i as f64;
            let error = if i % 50 == 0 { McuError::empty() } else { McuError::PRECHARGE };
            s.on_mcu_status(mcu(t, error));
            s.tick(t, true);
        }
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_first_status_precharge_does_not_fault_immediately() {
        let mut s = supervisor();
        s.on_mcu_status(mcu(T0, McuError::PRECHARGE));
        s.tick(T0, true);
        assert_eq!(s.state(), MotionState::Stopped);
    }

    #[test]
    fn test_encoder_failure_faults_and_is_terminal() {
        let mut s = supervisor();
        let t = start_moving(&mut s);

        // Ramp wheels up so a dead encoder stands out from the rest
        let mut now = t;
        for _ in 0..40 {
            now += 0.05;
            drive_tick(&mut s, now, 2.0);
        }
        assert_eq!(s.state(), MotionState::Moving);

        let mut out = s.tick(now, true);
        for _ in 0..20 {
            now += 0.05;
            let safe = s.on_drive(&drive(now, 2.0));
            let mut measured = safe.wheels().as_array();
            measured[Wheel::RearLeft.index()] = 0.0;
            s.on_encoders(Drive::from_wheels(now, WheelVector::from_array(measured)));
            out = s.tick(now, true);
        }
        assert_eq!(
            s.state(),
            MotionState::Fault(FaultReason::EncoderFailure(Wheel::RearLeft))
        );
        assert!(out.estop);

        // Nothing brings it back: healthy data, e-stop, reset
        now += 2.0;
        s.on_estop(true);
        s.on_mcu_status(mcu(now, McuError::ESTOP_RESET));
        echo_encoders(&mut s, now, 0.0);
        let out = s.tick(now, true);
        assert!(matches!(s.state(), MotionState::Fault(_)));
        assert!(out.estop);
        let safe = s.on_drive(&drive(now, 1.0));
        assert_eq!(safe, Drive::zero(now));
    }

    #[test]
    fn test_diagnostic_reports_state() {
        let mut s = supervisor();
        let stat = s.diagnostic(T0);
        assert_eq!(stat.level, DiagnosticLevel::Ok);
        assert_eq!(stat.value("state"), Some("Stopped"));
        assert_eq!(stat.value("vehicle in motion"), Some("false"));

        s.on_estop(true);
        let stat = s.diagnostic(T0);
        assert_eq!(stat.level, DiagnosticLevel::Warn);
        assert_eq!(stat.message, "Motion state machine state is: PendingStopped");
    }
}
