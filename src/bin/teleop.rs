// Keyboard teleop: WASD move, Z/X rotate, R/F speed, Q quit
// Drive modes: M major axis only, B both axes, E encoders on, O encoders off, V swap sides
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use mecanum_drive_runtime::config::{TOPIC_CMD_BASE, TOPIC_CMD_MODE};
use mecanum_drive_runtime::messages::{BaseCommand, ModeCommand};

const SPEEDS: [f32; 3] = [0.25, 0.5, 1.0]; // normalized
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_base = session.declare_publisher(TOPIC_CMD_BASE).await?;
    let pub_mode = session.declare_publisher(TOPIC_CMD_MODE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    info!("Modes: M=major axis, B=both axes, E=encoders on, O=encoders off, V=swap sides");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_base, &pub_mode).await;
    disable_raw_mode()?;

    result
}

fn mode_for_key(code: KeyCode) -> Option<ModeCommand> {
    match code {
        KeyCode::Char('m') => Some(ModeCommand::MajorAxisOnly),
        KeyCode::Char('b') => Some(ModeCommand::BothAxes),
        KeyCode::Char('e') => Some(ModeCommand::EncodersOn),
        KeyCode::Char('o') => Some(ModeCommand::EncodersOff),
        KeyCode::Char('v') => Some(ModeCommand::SwapSides),
        _ => None,
    }
}

async fn run_teleop(
    pub_base: &zenoh::pubsub::Publisher<'_>,
    pub_mode: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent command state
    let mut cmd = BaseCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let speed = SPEEDS[speed_idx];

                match code {
                    // Movement - update command and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        cmd.x_vel = speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.x_vel = -speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        cmd.y_vel = speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.y_vel = -speed;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        cmd.theta_vel = speed;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        cmd.theta_vel = -speed;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    // Drive mode triggers fire once per press
                    other if kind == KeyEventKind::Press => {
                        if let Some(mode) = mode_for_key(other) {
                            info!("Drive mode: {:?}", mode);
                            pub_mode.put(serde_json::to_string(&mode)?).await?;
                        }
                    }

                    _ => {}
                }
            }
        }

        // Reset command if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = BaseCommand::default();
        }

        // Always publish at ~50Hz
        pub_base.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
