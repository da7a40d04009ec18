// Control-mode transitions for the four wheel actuators
//
// Both transitions reconfigure all four channels in one call. Everything that
// can be rejected up front (mode kind, ceiling, gain lookup) is checked before
// the first channel is touched, so a rejected request leaves the drive running
// in its previous mode.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::actuator::{Actuator, ActuatorError, FeedbackSource, OutputMode, Wheel};
use super::DriveError;
use crate::config::{
    ConfigSource, ENCODER_PULSES_PER_REV, KEY_DRIVE_D, KEY_DRIVE_I, KEY_DRIVE_P,
    MAX_DRIVE_VOLTAGE, SPEED_D, SPEED_I, SPEED_P,
};

/// Drive-level control mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    #[default]
    OpenLoop,
    ClosedLoopSpeed,
    ClosedLoopPosition,
}

impl ControlMode {
    /// Closed-loop mode for a requested output mode
    pub fn closed_loop(kind: OutputMode) -> Result<Self, DriveError> {
        match kind {
            OutputMode::Speed => Ok(ControlMode::ClosedLoopSpeed),
            OutputMode::Position => Ok(ControlMode::ClosedLoopPosition),
            OutputMode::PercentOutput | OutputMode::Voltage | OutputMode::Current => {
                Err(DriveError::UnsupportedMode(kind))
            }
        }
    }

    pub fn output_mode(self) -> OutputMode {
        match self {
            ControlMode::OpenLoop => OutputMode::PercentOutput,
            ControlMode::ClosedLoopSpeed => OutputMode::Speed,
            ControlMode::ClosedLoopPosition => OutputMode::Position,
        }
    }

    pub fn is_closed_loop(self) -> bool {
        self != ControlMode::OpenLoop
    }
}

/// PID gain triple
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl Gains {
    pub const SPEED: Gains = Gains {
        p: SPEED_P,
        i: SPEED_I,
        d: SPEED_D,
    };

    /// This controller family expects gains with the opposite sign
    pub fn negated(self) -> Self {
        Self {
            p: -self.p,
            i: -self.i,
            d: -self.d,
        }
    }

    /// Gains for a closed-loop mode. POSITION pulls from the tunable table.
    pub fn for_mode(mode: ControlMode, source: &impl ConfigSource) -> Result<Self, DriveError> {
        match mode {
            ControlMode::ClosedLoopSpeed => Ok(Gains::SPEED),
            ControlMode::ClosedLoopPosition => {
                let lookup = |key: &'static str| {
                    source
                        .get(key)
                        .ok_or(DriveError::ConfigurationUnavailable { key })
                };
                Ok(Gains {
                    p: lookup(KEY_DRIVE_P)?,
                    i: lookup(KEY_DRIVE_I)?,
                    d: lookup(KEY_DRIVE_D)?,
                })
            }
            ControlMode::OpenLoop => Err(DriveError::UnsupportedMode(OutputMode::PercentOutput)),
        }
    }
}

fn for_each<A: Actuator>(
    actuators: &mut [A; 4],
    mut f: impl FnMut(Wheel, &mut A) -> Result<(), ActuatorError>,
) -> Result<(), ActuatorError> {
    for (wheel, actuator) in Wheel::ALL.into_iter().zip(actuators.iter_mut()) {
        f(wheel, actuator)?;
    }
    Ok(())
}

/// Put all four channels under encoder control
///
/// Returns the mode that is now active. `max_output` becomes the setpoint
/// ceiling (rpm in SPEED mode, revolutions in POSITION mode).
pub fn enter_closed_loop<A: Actuator>(
    actuators: &mut [A; 4],
    kind: OutputMode,
    max_output: f32,
    source: &impl ConfigSource,
) -> Result<ControlMode, DriveError> {
    let mode = ControlMode::closed_loop(kind)?;
    if !(max_output.is_finite() && max_output > 0.0) {
        return Err(DriveError::InvalidCeiling(max_output));
    }
    let gains = Gains::for_mode(mode, source)?.negated();

    info!(
        "Entering {:?}: ceiling={}, gains={:?}",
        mode, max_output, gains
    );

    // Disable first in case control is already enabled
    for_each(actuators, |_, a| a.set_closed_loop_enabled(false))?;

    for_each(actuators, |wheel, a| {
        a.set_output_ceiling(max_output)?;
        a.set_inversion(wheel.closed_loop_inverted())?;
        a.set_max_output_voltage(MAX_DRIVE_VOLTAGE)?;
        a.set_output_mode(kind)?;
        a.set_gains(gains.p, gains.i, gains.d)?;
        a.set_feedback_source(FeedbackSource::QuadEncoder)?;
        a.set_encoder_scale(ENCODER_PULSES_PER_REV)
    })?;

    for_each(actuators, |wheel, a| {
        debug!("Enabling closed-loop on {:?} (channel {})", wheel, a.channel());
        a.set_closed_loop_enabled(true)
    })?;

    Ok(mode)
}

/// Return all four channels to percent output
///
/// Every channel is visited even if an earlier one fails; the first failure
/// is reported.
pub fn enter_open_loop<A: Actuator>(actuators: &mut [A; 4]) -> Result<(), DriveError> {
    info!("Entering OpenLoop");

    let mut first_error = None;
    for (wheel, a) in Wheel::ALL.into_iter().zip(actuators.iter_mut()) {
        let result = a
            .set_inversion(wheel.open_loop_inverted())
            .and_then(|_| a.set_output_ceiling(1.0))
            .and_then(|_| a.set_closed_loop_enabled(false))
            .and_then(|_| a.set_output_mode(OutputMode::PercentOutput));

        if let Err(e) = result {
            warn!("Failed to return {:?} to open loop: {}", wheel, e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
