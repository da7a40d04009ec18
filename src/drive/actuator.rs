// Actuator capability set for one wheel's motor-controller channel
//
// The physical driver layer lives behind this trait. The drive subsystem owns
// four implementors and is the only thing that mutates them.

use serde::{Deserialize, Serialize};

/// Output modes supported by the motor-controller family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    PercentOutput,
    Voltage,
    Current,
    Speed,
    Position,
}

/// Feedback source for closed-loop control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSource {
    QuadEncoder,
}

/// The four wheels of the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Wheel {
    /// All wheels, in the order used by every `[T; 4]` in the drive module
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::BackLeft,
        Wheel::BackRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Motor label used in telemetry keys
    pub fn label(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "M4",
            Wheel::FrontRight => "M2",
            Wheel::BackLeft => "M3",
            Wheel::BackRight => "M1",
        }
    }

    /// Inversion when running open-loop (percent output)
    pub fn open_loop_inverted(self) -> bool {
        matches!(self, Wheel::FrontLeft | Wheel::BackLeft)
    }

    /// Inversion when running closed-loop. Encoder control needs the
    /// opposite motor-lead polarity on this hardware.
    pub fn closed_loop_inverted(self) -> bool {
        !self.open_loop_inverted()
    }
}

/// Error types for actuator channels
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuatorError {
    #[error("Channel {channel} is not a valid controller id")]
    InvalidChannel { channel: u8 },

    #[error("Channel {channel} is unavailable")]
    Unavailable { channel: u8 },

    #[error("Channel {channel} rejected {what}")]
    Rejected { channel: u8, what: &'static str },
}

/// Capability set of one motor-controller channel
///
/// `command` is interpreted per the current output mode: a fraction of
/// available output in `PercentOutput`, a physical setpoint otherwise.
pub trait Actuator {
    fn channel(&self) -> u8;

    fn set_inversion(&mut self, inverted: bool) -> Result<(), ActuatorError>;
    fn set_output_mode(&mut self, mode: OutputMode) -> Result<(), ActuatorError>;
    fn set_gains(&mut self, p: f32, i: f32, d: f32) -> Result<(), ActuatorError>;
    fn set_output_ceiling(&mut self, ceiling: f32) -> Result<(), ActuatorError>;
    fn set_max_output_voltage(&mut self, volts: f32) -> Result<(), ActuatorError>;
    fn set_feedback_source(&mut self, source: FeedbackSource) -> Result<(), ActuatorError>;
    fn set_encoder_scale(&mut self, pulses_per_rev: u16) -> Result<(), ActuatorError>;
    fn set_closed_loop_enabled(&mut self, enabled: bool) -> Result<(), ActuatorError>;

    fn command(&mut self, value: f32) -> Result<(), ActuatorError>;

    /// Currently communicating
    fn is_live(&self) -> bool;

    /// Power-cycled since the last query
    fn was_power_cycled(&mut self) -> bool;

    /// Observed wheel rate (speed feedback)
    fn observed_rate(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheel_order_matches_index() {
        for (i, wheel) in Wheel::ALL.iter().enumerate() {
            assert_eq!(wheel.index(), i);
        }
    }

    #[test]
    fn test_polarities_are_complements() {
        for wheel in Wheel::ALL {
            assert_ne!(wheel.open_loop_inverted(), wheel.closed_loop_inverted());
        }
        // Left side is inverted for percent output
        assert!(Wheel::FrontLeft.open_loop_inverted());
        assert!(Wheel::BackLeft.open_loop_inverted());
        assert!(!Wheel::FrontRight.open_loop_inverted());
        assert!(!Wheel::BackRight.open_loop_inverted());
    }

    #[test]
    fn test_labels() {
        let labels: Vec<_> = Wheel::ALL.iter().map(|w| w.label()).collect();
        assert_eq!(labels, ["M4", "M2", "M3", "M1"]);
    }
}
