// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drive::{DriveControl, DriveError};

// Command from teleop/scripts -> runtime
// Normalized to [-1, 1]: x forward, y left, theta counter-clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    pub x_vel: f32,
    pub y_vel: f32,
    pub theta_vel: f32,
}

/// Drive mode triggers, each an instantaneous action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeCommand {
    MajorAxisOnly,
    BothAxes,
    EncodersOn,
    EncodersOff,
    SwapSides,
}

impl ModeCommand {
    pub fn apply(self, drive: &mut impl DriveControl) -> Result<(), DriveError> {
        match self {
            ModeCommand::MajorAxisOnly => drive.set_major_axis_mode(true),
            ModeCommand::BothAxes => drive.set_major_axis_mode(false),
            ModeCommand::EncodersOn => drive.enable_closed_loop()?,
            ModeCommand::EncodersOff => drive.enter_open_loop()?,
            ModeCommand::SwapSides => drive.flip(),
        }
        Ok(())
    }
}

// Tunable update from a dashboard/script -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamUpdate {
    pub key: String,
    pub value: f32,
}

// Scalar telemetry runtime -> dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub key: String,
    pub value: f32,
}

impl From<(String, f32)> for TelemetrySample {
    fn from((key, value): (String, f32)) -> Self {
        Self { key, value }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Degraded,
}
