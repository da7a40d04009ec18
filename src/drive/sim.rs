// In-memory actuator channel
//
// Stands in for the motor-controller bus when hardware is disabled. It keeps
// the configuration it was given and reports the last applied output as its
// observed rate.

use tracing::debug;

use super::actuator::{Actuator, ActuatorError, FeedbackSource, OutputMode};

/// Controller ids are 6 bits on the bus, 0 is reserved
const MAX_CHANNEL: u8 = 63;

/// Configuration held by a channel, comparable for tests and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub inverted: bool,
    pub mode: OutputMode,
    pub gains: (f32, f32, f32),
    pub ceiling: f32,
    pub max_voltage: f32,
    pub feedback: Option<FeedbackSource>,
    pub encoder_scale: u16,
    pub closed_loop_enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            inverted: false,
            mode: OutputMode::PercentOutput,
            gains: (0.0, 0.0, 0.0),
            ceiling: 1.0,
            max_voltage: 12.0,
            feedback: None,
            encoder_scale: 0,
            closed_loop_enabled: false,
        }
    }
}

#[derive(Debug)]
pub struct SimActuator {
    channel: u8,
    config: ChannelConfig,
    last_command: f32,
    output: f32,
    live: bool,
    power_cycled: bool,
}

impl SimActuator {
    /// Open a channel by controller id
    pub fn open(channel: u8) -> Result<Self, ActuatorError> {
        if channel == 0 || channel > MAX_CHANNEL {
            return Err(ActuatorError::InvalidChannel { channel });
        }
        Ok(Self {
            channel,
            config: ChannelConfig::default(),
            last_command: 0.0,
            output: 0.0,
            live: true,
            // Controllers report a power cycle on first contact
            power_cycled: true,
        })
    }

    /// Placeholder for a channel that failed to open. Never live.
    pub fn detached(channel: u8) -> Self {
        Self {
            channel,
            config: ChannelConfig::default(),
            last_command: 0.0,
            output: 0.0,
            live: false,
            power_cycled: false,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn last_command(&self) -> f32 {
        self.last_command
    }

    /// Simulate the channel dropping off (or rejoining) the bus
    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    /// Simulate a brown-out of the controller
    pub fn power_cycle(&mut self) {
        self.power_cycled = true;
        self.config = ChannelConfig::default();
        self.output = 0.0;
    }

    fn ensure_live(&self, what: &'static str) -> Result<(), ActuatorError> {
        if self.live {
            Ok(())
        } else {
            debug!("Channel {} offline, dropping {}", self.channel, what);
            Err(ActuatorError::Unavailable {
                channel: self.channel,
            })
        }
    }
}

impl Actuator for SimActuator {
    fn channel(&self) -> u8 {
        self.channel
    }

    fn set_inversion(&mut self, inverted: bool) -> Result<(), ActuatorError> {
        self.config.inverted = inverted;
        Ok(())
    }

    fn set_output_mode(&mut self, mode: OutputMode) -> Result<(), ActuatorError> {
        self.ensure_live("output mode")?;
        self.config.mode = mode;
        Ok(())
    }

    fn set_gains(&mut self, p: f32, i: f32, d: f32) -> Result<(), ActuatorError> {
        self.ensure_live("gains")?;
        self.config.gains = (p, i, d);
        Ok(())
    }

    fn set_output_ceiling(&mut self, ceiling: f32) -> Result<(), ActuatorError> {
        if !(ceiling.is_finite() && ceiling > 0.0) {
            return Err(ActuatorError::Rejected {
                channel: self.channel,
                what: "output ceiling",
            });
        }
        self.config.ceiling = ceiling;
        Ok(())
    }

    fn set_max_output_voltage(&mut self, volts: f32) -> Result<(), ActuatorError> {
        self.ensure_live("max voltage")?;
        self.config.max_voltage = volts;
        Ok(())
    }

    fn set_feedback_source(&mut self, source: FeedbackSource) -> Result<(), ActuatorError> {
        self.ensure_live("feedback source")?;
        self.config.feedback = Some(source);
        Ok(())
    }

    fn set_encoder_scale(&mut self, pulses_per_rev: u16) -> Result<(), ActuatorError> {
        self.ensure_live("encoder scale")?;
        self.config.encoder_scale = pulses_per_rev;
        Ok(())
    }

    fn set_closed_loop_enabled(&mut self, enabled: bool) -> Result<(), ActuatorError> {
        self.ensure_live("closed-loop enable")?;
        self.config.closed_loop_enabled = enabled;
        Ok(())
    }

    fn command(&mut self, value: f32) -> Result<(), ActuatorError> {
        self.last_command = value;
        self.ensure_live("command")?;

        let ceiling = self.config.ceiling;
        let signed = if self.config.inverted { -value } else { value };
        self.output = signed.clamp(-ceiling, ceiling);
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn was_power_cycled(&mut self) -> bool {
        std::mem::take(&mut self.power_cycled)
    }

    fn observed_rate(&self) -> f32 {
        self.output
    }
}
