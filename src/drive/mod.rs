// Drive control for the mecanum base
//
// Provides:
// - Actuator capability trait and an in-memory channel
// - Mecanum inverse kinematics (body command -> wheel commands)
// - Open-loop / closed-loop mode transitions
// - Debounced actuator liveness
// - The per-tick drive subsystem

pub mod actuator;
pub mod kinematics;
pub mod liveness;
pub mod mode;
pub mod sim;
mod subsystem;

pub use actuator::{Actuator, ActuatorError, FeedbackSource, OutputMode, Wheel};
pub use kinematics::{mecanum_mix, DriveFlags, WheelCommands};
pub use liveness::{LivenessRecord, LivenessTracker};
pub use mode::{ControlMode, Gains};
pub use sim::SimActuator;
pub use subsystem::{DriveControl, DriveState, DriveSubsystem, TelemetrySink};

/// Errors raised by drive-level operations
///
/// Only mode transitions fail; the per-tick path never does.
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Unsupported closed-loop mode: {0:?}")]
    UnsupportedMode(OutputMode),

    #[error("Configuration value {key} is unavailable")]
    ConfigurationUnavailable { key: &'static str },

    #[error("Invalid output ceiling: {0}")]
    InvalidCeiling(f32),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),
}
