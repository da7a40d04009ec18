// Timeouts, topics, drivetrain constants and the loadable drive configuration
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::drive::ControlMode;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog (matches the drive safety expiration)
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_BASE: &str = "mecanum/cmd/base"; // velocity commands
pub const TOPIC_CMD_MODE: &str = "mecanum/cmd/mode"; // drive mode triggers
pub const TOPIC_CMD_PARAM: &str = "mecanum/cmd/param"; // tunable updates
pub const TOPIC_TELEMETRY: &str = "mecanum/state/telemetry"; // key/value samples
pub const TOPIC_HEALTH: &str = "mecanum/state/health"; // health status

// Liveness debounce: countdown ceiling and sub-sample factor (in ticks)
pub const LIVENESS_CEILING: u8 = 10;
pub const LIVENESS_SUBSAMPLE: u64 = 5;

// Telemetry publish cadence (in ticks)
pub const TELEMETRY_EVERY: u64 = 5;

// Quadrature encoder resolution on each wheel
pub const ENCODER_PULSES_PER_REV: u16 = 360;

// Robot has a 12V battery
pub const MAX_DRIVE_VOLTAGE: f32 = 12.0;

// Setpoint ceiling for SPEED mode, the controllers read encoder speed in rpm
pub const MAX_DRIVE_RPM: f32 = 500.0;

// Fixed gains for SPEED mode
pub const SPEED_P: f32 = 0.50;
pub const SPEED_I: f32 = 0.01;
pub const SPEED_D: f32 = 0.00;

// Tunable keys for POSITION mode gains
pub const KEY_DRIVE_P: &str = "drive_p";
pub const KEY_DRIVE_I: &str = "drive_i";
pub const KEY_DRIVE_D: &str = "drive_d";

// CAN channel ids of the four wheel controllers
pub const CHANNEL_FRONT_LEFT: u8 = 4;
pub const CHANNEL_FRONT_RIGHT: u8 = 2;
pub const CHANNEL_BACK_LEFT: u8 = 3;
pub const CHANNEL_BACK_RIGHT: u8 = 1;

/// Error loading a drive configuration file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cannot load the config file: {0}")]
    FileLoad(#[from] std::io::Error),

    #[error("Cannot read the config file: {0}")]
    Deserialise(#[from] toml::de::Error),
}

/// Drive configuration, loaded from TOML or defaulted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Channel ids as [front_left, front_right, back_left, back_right]
    pub channels: [u8; 4],

    /// Control mode entered when the subsystem is constructed
    pub initial_mode: ControlMode,

    /// Ceiling used when the closed-loop trigger fires
    pub closed_loop_max_output: f32,

    /// Liveness countdown ceiling
    pub liveness_ceiling: u8,

    /// Liveness sub-sample factor in ticks
    pub liveness_subsample: u64,

    /// Telemetry cadence in ticks
    pub telemetry_every: u64,

    /// Seed values for the tunable table
    pub tunables: HashMap<String, f32>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            channels: [
                CHANNEL_FRONT_LEFT,
                CHANNEL_FRONT_RIGHT,
                CHANNEL_BACK_LEFT,
                CHANNEL_BACK_RIGHT,
            ],
            initial_mode: ControlMode::OpenLoop,
            closed_loop_max_output: MAX_DRIVE_RPM,
            liveness_ceiling: LIVENESS_CEILING,
            liveness_subsample: LIVENESS_SUBSAMPLE,
            telemetry_every: TELEMETRY_EVERY,
            tunables: HashMap::new(),
        }
    }
}

impl DriveConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(text)?)
    }
}

/// Source of tunable scalar values, looked up by key
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<f32>;
}

/// In-memory tunable table, updated live from the bus
#[derive(Debug, Clone, Default)]
pub struct ParamTable {
    values: HashMap<String, f32>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: f32) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<f32> {
        self.values.remove(key)
    }
}

impl From<HashMap<String, f32>> for ParamTable {
    fn from(values: HashMap<String, f32>) -> Self {
        Self { values }
    }
}

impl ConfigSource for ParamTable {
    fn get(&self, key: &str) -> Option<f32> {
        self.values.get(key).copied()
    }
}
