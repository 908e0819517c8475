// 20 Hz supervisor loop over zenoh
// Inbound messages are drained at the top of every tick, each channel in
// arrival order, e-stops first. Then the state machine is evaluated once.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{info, warn};
use zenoh::pubsub::Publisher;
use zenoh::sample::Sample;

// local imports
use crate::config::{
    DIAGNOSTIC_EVERY_TICKS, HARDWARE_ID, LOOP_HZ, SafetyConfig, TICK_PERIOD, TOPIC_CMD_DRIVE,
    TOPIC_DIAGNOSTICS, TOPIC_ENCODERS, TOPIC_ESTOP, TOPIC_MCU_AMBIENCE, TOPIC_MCU_ESTOP,
    TOPIC_MCU_STATUS, TOPIC_MOTOR_STATUS, TOPIC_SAFE_DRIVE,
};
use crate::messages::{
    now_secs, DiagnosticArray, Drive, EstopCommand, McuStatus, MotorStatus,
};
use crate::monitor::{FrequencyMonitor, HealthMonitor, MotorsMonitor};
use crate::motion::Wheel;
use crate::supervisor::{MotionSupervisor, TickOutput};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Messages drained from the bus in one tick
#[derive(Debug, Default)]
pub struct Inbox {
    pub estops: Vec<EstopCommand>,
    pub mcu_statuses: Vec<McuStatus>,
    pub motor_statuses: Vec<(Wheel, MotorStatus)>,
    pub encoders: Vec<Drive>,
    pub drives: Vec<Drive>,
}

/// What must go out right after an [`Inbox`] is processed, ahead of the tick
#[derive(Debug, Default)]
pub struct Outbox {
    /// An e-stop arrived and is forwarded to the MCU
    pub estop: Option<EstopCommand>,
    /// One safe drive per drive command, in order
    pub safe_drives: Vec<Drive>,
}

/// Everything the node decides, independent of transport
pub struct SafetyNode {
    supervisor: MotionSupervisor,
    motors: MotorsMonitor,
    mcu_status_freq: FrequencyMonitor,
    cmd_drive_freq: FrequencyMonitor,
}

impl SafetyNode {
    pub fn new(config: &SafetyConfig, now: f64) -> Self {
        Self {
            supervisor: MotionSupervisor::new(config),
            motors: MotorsMonitor::new(config.motors_timeout),
            mcu_status_freq: FrequencyMonitor::new(
                "MCU status",
                config.expected_mcu_status_frequency,
                config.expected_mcu_status_frequency,
                now,
            ),
            cmd_drive_freq: FrequencyMonitor::new(
                "Drive command",
                config.min_cmd_drive_frequency,
                config.max_cmd_drive_frequency,
                now,
            ),
        }
    }

    pub fn supervisor(&self) -> &MotionSupervisor {
        &self.supervisor
    }

    /// Process an incoming drive command, returning what to send to the motors
    pub fn on_drive(&mut self, drive: Drive) -> Drive {
        self.cmd_drive_freq.tick();
        self.supervisor.on_drive(&drive)
    }

    pub fn on_encoders(&mut self, encoders: Drive) {
        self.supervisor.on_encoders(encoders);
    }

    pub fn on_mcu_status(&mut self, status: McuStatus) {
        self.mcu_status_freq.tick();
        self.supervisor.on_mcu_status(status);
    }

    pub fn on_motor_status(&mut self, wheel: Wheel, status: MotorStatus) {
        self.motors.on_status(wheel, status);
    }

    /// Returns true if an e-stop must be published right away
    pub fn on_estop(&mut self, estop: EstopCommand) -> bool {
        self.supervisor.on_estop(estop.data)
    }

    /// Handle one tick's worth of messages. E-stops go first so that drive
    /// commands queued alongside one are already gated by it.
    pub fn process(&mut self, inbox: Inbox) -> Outbox {
        let mut outbox = Outbox::default();

        for estop in inbox.estops {
            if self.on_estop(estop) {
                outbox.estop = Some(estop);
            }
        }
        for status in inbox.mcu_statuses {
            self.on_mcu_status(status);
        }
        for (wheel, status) in inbox.motor_statuses {
            self.on_motor_status(wheel, status);
        }
        for encoders in inbox.encoders {
            self.on_encoders(encoders);
        }
        outbox.safe_drives = inbox
            .drives
            .into_iter()
            .map(|drive| self.on_drive(drive))
            .collect();

        outbox
    }

    pub fn tick(&mut self, now: f64) -> TickOutput {
        let motors_ok = self.motors.ok(now);
        self.supervisor.tick(now, motors_ok)
    }

    /// Full diagnostics report; closes the current frequency measurement period
    pub fn diagnostics(&mut self, now: f64) -> DiagnosticArray {
        DiagnosticArray {
            stamp: now,
            hardware_id: HARDWARE_ID.to_string(),
            status: vec![
                self.supervisor.diagnostic(now),
                self.supervisor.encoders().diagnostic(now),
                self.motors.diagnostic(now),
                self.mcu_status_freq.update(now),
                self.cmd_drive_freq.update(now),
            ],
        }
    }
}

/// Parse a JSON payload, logging and dropping anything malformed
fn decode<T: DeserializeOwned>(sample: &Sample, what: &str) -> Option<T> {
    let payload = sample.payload().to_bytes();
    match serde_json::from_slice::<T>(&payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse {}: {}", what, e);
            None
        }
    }
}

/// Wheel named by the `*` in `grizzly/motors/*/status`
fn wheel_from_key(key: &str) -> Option<Wheel> {
    let mut segments = key.rsplit('/');
    match (segments.next(), segments.next()) {
        (Some("status"), Some(segment)) => Wheel::from_topic_segment(segment),
        _ => None,
    }
}

async fn put_json<T: Serialize>(publisher: &Publisher<'_>, msg: &T) -> Result<(), BoxError> {
    let json = serde_json::to_string(msg)?;
    publisher.put(json).await?;
    Ok(())
}

pub async fn run(config: SafetyConfig) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_encoders = session.declare_subscriber(TOPIC_ENCODERS).await?;
    let sub_mcu_status = session.declare_subscriber(TOPIC_MCU_STATUS).await?;
    let sub_motor_status = session.declare_subscriber(TOPIC_MOTOR_STATUS).await?;
    let sub_estop = session.declare_subscriber(TOPIC_ESTOP).await?;
    let pub_safe_drive = session.declare_publisher(TOPIC_SAFE_DRIVE).await?;
    let pub_ambience = session.declare_publisher(TOPIC_MCU_AMBIENCE).await?;
    let pub_estop = session.declare_publisher(TOPIC_MCU_ESTOP).await?;
    let pub_diagnostics = session.declare_publisher(TOPIC_DIAGNOSTICS).await?;

    let mut node = SafetyNode::new(&config, now_secs());
    let mut tick = interval(TICK_PERIOD);
    let mut ticks: u64 = 0;

    info!(
        "Motion safety started: {}Hz loop, {}s starting duration, {:.2} rad/s^2 wheel acceleration limit",
        LOOP_HZ,
        config.starting_duration,
        config.wheel_acceleration_limit()
    );
    info!(
        "Subscribed to: {}, {}, {}, {}, {}",
        TOPIC_CMD_DRIVE, TOPIC_ENCODERS, TOPIC_MCU_STATUS, TOPIC_MOTOR_STATUS, TOPIC_ESTOP
    );
    info!(
        "Publishing to: {}, {}, {}, {}",
        TOPIC_SAFE_DRIVE, TOPIC_MCU_AMBIENCE, TOPIC_MCU_ESTOP, TOPIC_DIAGNOSTICS
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down, asserting e-stop");
                put_json(&pub_estop, &EstopCommand { data: true }).await?;
                return Ok(());
            }
        }

        // 1. Drain all pending messages (non-blocking), one channel at a time
        let mut inbox = Inbox::default();
        while let Ok(Some(sample)) = sub_estop.try_recv() {
            inbox.estops.extend(decode::<EstopCommand>(&sample, "e-stop"));
        }

        while let Ok(Some(sample)) = sub_mcu_status.try_recv() {
            inbox.mcu_statuses.extend(decode::<McuStatus>(&sample, "MCU status"));
        }

        while let Ok(Some(sample)) = sub_motor_status.try_recv() {
            let key = sample.key_expr().as_str();
            let Some(wheel) = wheel_from_key(key) else {
                warn!("Motor status on unexpected key {}", key);
                continue;
            };
            if let Some(status) = decode::<MotorStatus>(&sample, "motor status") {
                inbox.motor_statuses.push((wheel, status));
            }
        }

        while let Ok(Some(sample)) = sub_encoders.try_recv() {
            inbox.encoders.extend(decode::<Drive>(&sample, "encoders"));
        }

        while let Ok(Some(sample)) = sub_drive.try_recv() {
            inbox.drives.extend(decode::<Drive>(&sample, "drive command"));
        }

        let outbox = node.process(inbox);
        if let Some(estop) = outbox.estop {
            put_json(&pub_estop, &estop).await?;
        }
        for safe in &outbox.safe_drives {
            put_json(&pub_safe_drive, safe).await?;
        }

        // 2. Evaluate the state machine
        let now = now_secs();
        let output = node.tick(now);

        // 3. Publish ambience and e-stop every tick
        put_json(&pub_ambience, &output.ambience).await?;
        put_json(&pub_estop, &EstopCommand { data: output.estop }).await?;

        // 4. Diagnostics at 1 Hz
        ticks += 1;
        if ticks % DIAGNOSTIC_EVERY_TICKS == 0 {
            put_json(&pub_diagnostics, &node.diagnostics(now)).await?;
        }
    }
}
