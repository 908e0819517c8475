// Keyboard teleop: W/S forward/back, A/D turn, R/F speed, E e-stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use motion_safety_runtime::config::{SafetyConfig, TOPIC_CMD_DRIVE, TOPIC_ESTOP};
use motion_safety_runtime::messages::{now_secs, Drive, EstopCommand};
use motion_safety_runtime::motion::twist_to_wheels;

const SPEEDS: [f64; 3] = [0.3, 0.8, 1.5]; // m/s
const TURN_RATES: [f64; 3] = [0.3, 0.6, 1.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pub_estop = session.declare_publisher(TOPIC_ESTOP).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, E=e-stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_drive, &pub_estop).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_drive: &zenoh::pubsub::Publisher<'_>,
    pub_estop: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let vehicle = SafetyConfig::default();
    let mut speed_idx: usize = 0;

    let mut linear = 0.0;
    let mut angular = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        linear = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        linear = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        angular = TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        angular = -TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('e') if pressed => {
                        info!("E-stop!");
                        let msg = serde_json::to_string(&EstopCommand { data: true })?;
                        pub_estop.put(msg).await?;
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            linear = 0.0;
            angular = 0.0;
        }

        // Always publish at ~50Hz
        let wheels = twist_to_wheels(linear, angular, vehicle.vehicle_width, vehicle.wheel_radius);
        let drive = Drive::from_wheels(now_secs(), wheels);
        pub_drive.put(serde_json::to_string(&drive)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
