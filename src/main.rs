use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mecanum_drive_runtime::config::{DriveConfig, LOOP_HZ};
use mecanum_drive_runtime::runtime::{self, RunOptions};

/// Mecanum drivetrain runtime
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Drive configuration file (TOML); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control loop rate
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match DriveConfig::load(path) {
            Ok(config) => {
                info!("Loaded drive config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error ({}): {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => DriveConfig::default(),
    };

    let options = RunOptions {
        config,
        loop_hz: args.loop_hz,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
