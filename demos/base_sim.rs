// Simulated base: echoes safe_cmd_drive back as encoder readings and reports
// healthy MCU / motor controllers at 50 Hz.
//
// Usage: cargo run --example base_sim -- [dead-wheel]
// Example: cargo run --example base_sim -- rear_left
//
// With a dead wheel, that wheel's encoder reads zero once the vehicle is
// moving, which the supervisor should catch as an encoder failure.

use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

use motion_safety_runtime::config::{
    motor_status_topic, TOPIC_ENCODERS, TOPIC_MCU_ESTOP, TOPIC_MCU_STATUS, TOPIC_SAFE_DRIVE,
};
use motion_safety_runtime::messages::{
    now_secs, Drive, EstopCommand, McuError, McuStatus, MotorStatus,
};
use motion_safety_runtime::motion::{Wheel, WheelVector};

const SIM_HZ: u64 = 50;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let dead_wheel = match std::env::args().nth(1) {
        Some(arg) => match Wheel::from_topic_segment(&arg) {
            Some(wheel) => Some(wheel),
            None => {
                eprintln!("Unknown wheel {}, expected front_left|front_right|rear_left|rear_right", arg);
                std::process::exit(2);
            }
        },
        None => None,
    };
    if let Some(wheel) = dead_wheel {
        warn!("Simulating a dead {} encoder", wheel);
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let sub_safe_drive = session.declare_subscriber(TOPIC_SAFE_DRIVE).await?;
    let sub_estop = session.declare_subscriber(TOPIC_MCU_ESTOP).await?;
    let pub_encoders = session.declare_publisher(TOPIC_ENCODERS).await?;
    let pub_mcu_status = session.declare_publisher(TOPIC_MCU_STATUS).await?;
    let mut pub_motors = Vec::new();
    for wheel in Wheel::ALL {
        pub_motors.push(session.declare_publisher(motor_status_topic(wheel)).await?);
    }

    let mut wheels = WheelVector::zero();
    // Follows the latest e-stop from the supervisor, standing in for a latch
    // that an operator resets
    let mut estop_latched = false;
    let mut tick = interval(Duration::from_millis(1000 / SIM_HZ));

    loop {
        tick.tick().await;

        while let Ok(Some(sample)) = sub_safe_drive.try_recv() {
            if let Ok(drive) = serde_json::from_slice::<Drive>(&sample.payload().to_bytes()) {
                wheels = drive.wheels();
            }
        }
        while let Ok(Some(sample)) = sub_estop.try_recv() {
            if let Ok(estop) = serde_json::from_slice::<EstopCommand>(&sample.payload().to_bytes()) {
                if estop.data != estop_latched {
                    info!("MCU e-stop {}", if estop.data { "latched" } else { "reset" });
                }
                estop_latched = estop.data;
            }
        }

        let now = now_secs();
        let mut measured = wheels;
        if let Some(wheel) = dead_wheel {
            measured = measured.with_zeroed(wheel);
        }
        pub_encoders
            .put(serde_json::to_string(&Drive::from_wheels(now, measured))?)
            .await?;

        let error = if estop_latched { McuError::ESTOP_RESET } else { McuError::empty() };
        let status = McuStatus { stamp: now, error: error.bits() };
        pub_mcu_status.put(serde_json::to_string(&status)?).await?;

        for publisher in &pub_motors {
            let status = MotorStatus { stamp: now, fault: 0 };
            publisher.put(serde_json::to_string(&status)?).await?;
        }
    }
}
