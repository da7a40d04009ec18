// Drive subsystem for the mecanum base
//
// Owns the four wheel actuators and the drive state. One `tick` per control
// period mixes the body command, dispatches the wheel commands, samples
// liveness and emits telemetry. Mode changes go through `DriveControl`.

use tracing::{debug, error, info, warn};

use super::actuator::{Actuator, OutputMode, Wheel};
use super::kinematics::{mecanum_mix, DriveFlags, WheelCommands};
use super::liveness::LivenessTracker;
use super::mode::{self, ControlMode};
use super::DriveError;
use crate::config::{ConfigSource, DriveConfig, ParamTable};

/// Fire-and-forget scalar telemetry
pub trait TelemetrySink {
    fn publish(&mut self, key: &str, value: f32);
}

impl TelemetrySink for Vec<(String, f32)> {
    fn publish(&mut self, key: &str, value: f32) {
        self.push((key.to_string(), value));
    }
}

/// Drive-level commands, as issued by the mode-change command surface
pub trait DriveControl {
    fn set_major_axis_mode(&mut self, on: bool);
    fn flip(&mut self);
    fn enter_closed_loop(&mut self, kind: OutputMode, max_output: f32) -> Result<(), DriveError>;
    fn enter_open_loop(&mut self) -> Result<(), DriveError>;

    /// Closed-loop SPEED at the configured ceiling
    fn enable_closed_loop(&mut self) -> Result<(), DriveError>;
}

/// Subsystem-scoped drive state
#[derive(Debug, Clone, PartialEq)]
pub struct DriveState {
    pub flags: DriveFlags,
    /// 1.0 in open loop, the setpoint ceiling in closed loop
    pub ceiling: f32,
    pub mode: ControlMode,
    pub ticks: u64,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            flags: DriveFlags::default(),
            ceiling: 1.0,
            mode: ControlMode::OpenLoop,
            ticks: 0,
        }
    }
}

pub struct DriveSubsystem<A: Actuator, C: ConfigSource = ParamTable> {
    actuators: [A; 4], // [front_left, front_right, back_left, back_right]
    state: DriveState,
    liveness: LivenessTracker,
    telemetry_every: u64,
    closed_loop_max_output: f32,
    tunables: C,
    degraded: bool,
}

impl<A: Actuator, C: ConfigSource> DriveSubsystem<A, C> {
    /// Build the subsystem and enter the configured initial mode
    ///
    /// A failed initial transition is logged and leaves the subsystem
    /// degraded; it is still returned and `tick` keeps running.
    pub fn new(actuators: [A; 4], config: &DriveConfig, tunables: C) -> Self {
        let mut drive = Self {
            actuators,
            state: DriveState::default(),
            liveness: LivenessTracker::new(config.liveness_ceiling, config.liveness_subsample),
            telemetry_every: config.telemetry_every.max(1),
            closed_loop_max_output: config.closed_loop_max_output,
            tunables,
            degraded: false,
        };

        info!(
            "Initializing drive on channels {:?}, initial mode {:?}",
            drive.actuators.each_ref().map(|a| a.channel()),
            config.initial_mode
        );

        // Open-loop configuration first, closed-loop layered on top
        let mut result = drive.enter_open_loop();
        if result.is_ok() && config.initial_mode.is_closed_loop() {
            let max_output = drive.closed_loop_max_output;
            result = drive.enter_closed_loop(config.initial_mode.output_mode(), max_output);
        }
        if let Err(e) = result {
            error!("Drive initialization failed, running degraded: {}", e);
            drive.degraded = true;
        }

        drive
    }

    /// Run one control period
    ///
    /// `x` forward, `y` strafe (left), `w` rotation (counter-clockwise), all
    /// normalized to [-1, 1]. Never fails: dispatch errors are logged and the
    /// liveness tracker picks up dead channels.
    pub fn tick(&mut self, x: f32, y: f32, w: f32, sink: &mut impl TelemetrySink) {
        let wheels = mecanum_mix(x, y, w, self.state.flags, self.state.ceiling);
        self.dispatch(wheels);

        self.state.ticks = self.state.ticks.wrapping_add(1);
        let ticks = self.state.ticks;

        if self.liveness.is_sample_tick(ticks) {
            self.sample_liveness();
        }
        if ticks % self.telemetry_every == 0 {
            self.publish_telemetry(sink);
        }
    }

    fn dispatch(&mut self, wheels: WheelCommands) {
        for ((wheel, actuator), value) in Wheel::ALL
            .into_iter()
            .zip(self.actuators.iter_mut())
            .zip(wheels.as_array())
        {
            if let Err(e) = actuator.command(value) {
                debug!("Dropped command {} for {:?}: {}", value, wheel, e);
            }
        }
    }

    fn sample_liveness(&mut self) {
        let before = self.liveness.alive();
        let pulses = self
            .actuators
            .each_mut()
            .map(|a| a.is_live() || a.was_power_cycled());
        self.liveness.sample(pulses);

        for ((wheel, was), now) in Wheel::ALL.into_iter().zip(before).zip(self.liveness.alive()) {
            match (was, now) {
                (true, false) => warn!("{:?} ({}) is no longer responding", wheel, wheel.label()),
                (false, true) => info!("{:?} ({}) is responding again", wheel, wheel.label()),
                _ => {}
            }
        }
    }

    fn publish_telemetry(&self, sink: &mut impl TelemetrySink) {
        for (wheel, actuator) in Wheel::ALL.into_iter().zip(self.actuators.iter()) {
            let label = wheel.label();
            let alive = self.liveness.record(wheel.index()).is_alive();
            sink.publish(&format!("{label} Output"), actuator.observed_rate());
            sink.publish(&format!("{label} Alive"), if alive { 1.0 } else { 0.0 });
        }
    }

    /// Change the closed-loop setpoint ceiling without a full transition
    pub fn set_max_output(&mut self, ceiling: f32) -> Result<(), DriveError> {
        if !self.state.mode.is_closed_loop() {
            return Err(DriveError::UnsupportedMode(OutputMode::PercentOutput));
        }
        if !(ceiling.is_finite() && ceiling > 0.0) {
            return Err(DriveError::InvalidCeiling(ceiling));
        }

        // Actuator limits must equal the scaling ceiling
        let previous = self.state.ceiling;
        for (wheel, actuator) in Wheel::ALL.into_iter().zip(self.actuators.iter_mut()) {
            if let Err(e) = actuator.set_output_ceiling(ceiling) {
                warn!("Failed to set ceiling {} on {:?}: {}", ceiling, wheel, e);
                for actuator in self.actuators.iter_mut() {
                    let _ = actuator.set_output_ceiling(previous);
                }
                return Err(e.into());
            }
        }

        info!("Output ceiling {} -> {}", previous, ceiling);
        self.state.ceiling = ceiling;
        Ok(())
    }

    pub fn state(&self) -> &DriveState {
        &self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.state.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Debounced liveness, ordered like `Wheel::ALL`
    pub fn alive(&self) -> [bool; 4] {
        self.liveness.alive()
    }

    pub fn actuator(&self, wheel: Wheel) -> &A {
        &self.actuators[wheel.index()]
    }

    pub fn tunables(&self) -> &C {
        &self.tunables
    }

    pub fn tunables_mut(&mut self) -> &mut C {
        &mut self.tunables
    }

    #[cfg(test)]
    pub(crate) fn actuator_mut(&mut self, wheel: Wheel) -> &mut A {
        &mut self.actuators[wheel.index()]
    }
}

impl<A: Actuator, C: ConfigSource> DriveControl for DriveSubsystem<A, C> {
    fn set_major_axis_mode(&mut self, on: bool) {
        info!("Major-axis mode {}", if on { "on" } else { "off" });
        self.state.flags.major_axis_only = on;
    }

    fn flip(&mut self) {
        self.state.flags.flipped = !self.state.flags.flipped;
        info!("Drive direction flipped: {}", self.state.flags.flipped);
    }

    fn enter_closed_loop(&mut self, kind: OutputMode, max_output: f32) -> Result<(), DriveError> {
        match mode::enter_closed_loop(&mut self.actuators, kind, max_output, &self.tunables) {
            Ok(mode) => {
                self.state.mode = mode;
                self.state.ceiling = max_output;
                Ok(())
            }
            Err(e @ DriveError::Actuator(_)) => {
                // Channels may be half-configured; fall back to a known state
                error!("Closed-loop transition failed midway: {}", e);
                if let Err(fallback) = self.enter_open_loop() {
                    error!("Open-loop fallback also failed: {}", fallback);
                }
                Err(e)
            }
            Err(e) => {
                warn!("Closed-loop transition rejected, staying in {:?}: {}", self.state.mode, e);
                Err(e)
            }
        }
    }

    fn enter_open_loop(&mut self) -> Result<(), DriveError> {
        // Channels are visited even on failure, so the state follows regardless
        let result = mode::enter_open_loop(&mut self.actuators);
        self.state.mode = ControlMode::OpenLoop;
        self.state.ceiling = 1.0;
        result
    }

    fn enable_closed_loop(&mut self) -> Result<(), DriveError> {
        self.enter_closed_loop(OutputMode::Speed, self.closed_loop_max_output)
    }
}

impl<A: Actuator, C: ConfigSource> Drop for DriveSubsystem<A, C> {
    fn drop(&mut self) {
        // Try to stop motors when the subsystem is dropped (safety measure)
        self.dispatch(WheelCommands::zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KEY_DRIVE_D, KEY_DRIVE_I, KEY_DRIVE_P, MAX_DRIVE_RPM};
    use crate::drive::sim::SimActuator;

    fn drive() -> DriveSubsystem<SimActuator> {
        drive_with(&DriveConfig::default())
    }

    fn drive_with(config: &DriveConfig) -> DriveSubsystem<SimActuator> {
        let actuators = config.channels.map(|ch| SimActuator::open(ch).unwrap());
        DriveSubsystem::new(actuators, config, ParamTable::new())
    }

    fn configs(drive: &DriveSubsystem<SimActuator>) -> Vec<crate::drive::sim::ChannelConfig> {
        Wheel::ALL
            .iter()
            .map(|&w| drive.actuator(w).config().clone())
            .collect()
    }

    fn sink() -> Vec<(String, f32)> {
        Vec::new()
    }

    fn commands(drive: &DriveSubsystem<SimActuator>) -> [f32; 4] {
        Wheel::ALL.map(|w| drive.actuator(w).last_command())
    }

    #[test]
    fn test_initial_state_is_open_loop() {
        let drive = drive();
        assert_eq!(drive.mode(), ControlMode::OpenLoop);
        assert_eq!(drive.state().ceiling, 1.0);
        assert_eq!(drive.state().flags, DriveFlags::default());
        assert!(!drive.is_degraded());
        for wheel in Wheel::ALL {
            let cfg = drive.actuator(wheel).config();
            assert_eq!(cfg.inverted, wheel.open_loop_inverted());
            assert_eq!(cfg.mode, OutputMode::PercentOutput);
            assert!(!cfg.closed_loop_enabled);
        }
    }

    #[test]
    fn test_initial_mode_is_configurable() {
        let config = DriveConfig {
            initial_mode: ControlMode::ClosedLoopSpeed,
            ..DriveConfig::default()
        };
        let drive = drive_with(&config);
        assert_eq!(drive.mode(), ControlMode::ClosedLoopSpeed);
        assert_eq!(drive.state().ceiling, MAX_DRIVE_RPM);
    }

    #[test]
    fn test_failed_initial_mode_leaves_subsystem_degraded() {
        // POSITION needs tunables and none are seeded
        let config = DriveConfig {
            initial_mode: ControlMode::ClosedLoopPosition,
            ..DriveConfig::default()
        };
        let mut drive = drive_with(&config);
        assert!(drive.is_degraded());
        assert_eq!(drive.mode(), ControlMode::OpenLoop);

        let mut sink = sink();
        drive.tick(0.5, 0.0, 0.0, &mut sink);
        assert_eq!(commands(&drive), [0.5; 4]);
    }

    #[test]
    fn test_tick_dispatches_mixed_commands() {
        let mut drive = drive();
        let mut sink = sink();
        drive.tick(0.0, 0.0, 0.5, &mut sink);
        assert_eq!(commands(&drive), [-0.5, 0.5, -0.5, 0.5]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_closed_loop_scales_to_ceiling() {
        let mut drive = drive();
        drive.enter_closed_loop(OutputMode::Speed, 500.0).unwrap();
        drive.tick(0.5, 0.0, 0.0, &mut sink());
        for c in commands(&drive) {
            assert!((c - 250.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_flags_shape_commands() {
        let mut drive = drive();
        drive.set_major_axis_mode(true);
        drive.flip();
        drive.tick(0.2, 0.6, 0.0, &mut sink());
        // Strafe dominates, then reversed: pure strafe right
        assert_eq!(commands(&drive), [0.6, -0.6, -0.6, 0.6]);

        drive.flip();
        drive.set_major_axis_mode(false);
        assert_eq!(drive.state().flags, DriveFlags::default());
    }

    #[test]
    fn test_speed_then_open_loop_restores_configuration() {
        let mut drive = drive();
        let before = configs(&drive);

        drive.enter_closed_loop(OutputMode::Speed, 500.0).unwrap();
        assert_eq!(drive.state().ceiling, 500.0);
        drive.enter_open_loop().unwrap();

        assert_eq!(drive.state().ceiling, 1.0);
        assert_eq!(drive.mode(), ControlMode::OpenLoop);
        for (b, a) in before.iter().zip(configs(&drive)) {
            assert_eq!(b.inverted, a.inverted);
            assert_eq!(b.ceiling, a.ceiling);
            assert_eq!(b.mode, a.mode);
            assert_eq!(b.closed_loop_enabled, a.closed_loop_enabled);
        }
    }

    #[test]
    fn test_rejected_transition_keeps_previous_mode() {
        let mut drive = drive();
        drive.enter_closed_loop(OutputMode::Speed, 400.0).unwrap();

        assert!(matches!(
            drive.enter_closed_loop(OutputMode::Position, 1.0),
            Err(DriveError::ConfigurationUnavailable { key: KEY_DRIVE_P })
        ));
        assert_eq!(drive.mode(), ControlMode::ClosedLoopSpeed);
        assert_eq!(drive.state().ceiling, 400.0);
        assert!(Wheel::ALL.iter().all(|&w| drive.actuator(w).config().closed_loop_enabled));

        assert!(matches!(
            drive.enter_closed_loop(OutputMode::Current, 1.0),
            Err(DriveError::UnsupportedMode(OutputMode::Current))
        ));
        assert_eq!(drive.mode(), ControlMode::ClosedLoopSpeed);
    }

    #[test]
    fn test_position_after_tunables_arrive() {
        let mut drive = drive();
        assert!(drive.enter_closed_loop(OutputMode::Position, 2.0).is_err());

        let tunables = drive.tunables_mut();
        tunables.set(KEY_DRIVE_P, 20.0);
        tunables.set(KEY_DRIVE_I, 0.0);
        tunables.set(KEY_DRIVE_D, 0.0);

        drive.enter_closed_loop(OutputMode::Position, 2.0).unwrap();
        assert_eq!(drive.mode(), ControlMode::ClosedLoopPosition);
        assert_eq!(drive.actuator(Wheel::BackRight).config().gains.0, -20.0);
    }

    #[test]
    fn test_midway_failure_falls_back_to_open_loop() {
        let mut drive = drive();
        drive.actuator_mut(Wheel::BackLeft).set_live(false);

        let err = drive.enable_closed_loop().unwrap_err();
        assert!(matches!(err, DriveError::Actuator(_)));
        assert_eq!(drive.mode(), ControlMode::OpenLoop);
        assert_eq!(drive.state().ceiling, 1.0);
        assert!(!drive.actuator(Wheel::FrontLeft).config().closed_loop_enabled);
    }

    #[test]
    fn test_set_max_output_only_in_closed_loop() {
        let mut drive = drive();
        assert!(drive.set_max_output(300.0).is_err());

        drive.enable_closed_loop().unwrap();
        drive.set_max_output(300.0).unwrap();
        assert_eq!(drive.state().ceiling, 300.0);
        assert!(matches!(
            drive.set_max_output(f32::INFINITY),
            Err(DriveError::InvalidCeiling(_))
        ));
    }

    #[test]
    fn test_raised_ceiling_keeps_wheel_ratios() {
        let mut drive = drive();
        drive.enter_closed_loop(OutputMode::Speed, 500.0).unwrap();
        drive.set_max_output(1000.0).unwrap();
        for wheel in Wheel::ALL {
            assert_eq!(drive.actuator(wheel).config().ceiling, 1000.0);
        }

        drive.tick(1.0, 0.5, 0.0, &mut sink());
        let cmds = commands(&drive);
        assert!((cmds[1] - 1000.0).abs() < 1e-3);
        assert!((cmds[0] - 1000.0 / 3.0).abs() < 1e-2);

        // Nothing clipped: every wheel outputs exactly its command
        for wheel in Wheel::ALL {
            let act = drive.actuator(wheel);
            assert!((act.observed_rate().abs() - act.last_command().abs()).abs() < 1e-3);
        }
        let observed = Wheel::ALL.map(|w| drive.actuator(w).observed_rate().abs());
        assert!((observed[1] / observed[0] - cmds[1] / cmds[0]).abs() < 1e-3);
    }

    #[test]
    fn test_telemetry_every_fifth_tick() {
        let mut drive = drive();
        let mut sink = sink();
        for _ in 0..4 {
            drive.tick(1.0, 0.0, 0.0, &mut sink);
        }
        assert!(sink.is_empty());

        drive.tick(1.0, 0.0, 0.0, &mut sink);
        assert_eq!(sink.len(), 8);
        let keys: Vec<_> = sink.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            [
                "M4 Output", "M4 Alive", "M2 Output", "M2 Alive", "M3 Output", "M3 Alive",
                "M1 Output", "M1 Alive",
            ]
        );
        // Front-left is inverted in open loop
        assert_eq!(sink[0].1, -1.0);
        assert_eq!(sink[2].1, 1.0);
        assert!(sink.iter().filter(|(k, _)| k.ends_with("Alive")).all(|(_, v)| *v == 1.0));
    }

    #[test]
    fn test_dead_channel_debounced_over_fifty_ticks() {
        let mut drive = drive();
        let mut sink = sink();
        drive.actuator_mut(Wheel::FrontRight).set_live(false);
        // Clear the power-on pulse
        let _ = drive.actuator_mut(Wheel::FrontRight).was_power_cycled();

        for tick in 1..=50 {
            drive.tick(0.3, 0.0, 0.0, &mut sink);
            if tick < 50 {
                assert!(drive.alive()[1], "alive until the tenth missed sample");
            }
        }
        assert_eq!(drive.alive(), [true, false, true, true]);
        assert_eq!(sink.last().map(|(k, v)| (k.as_str(), *v)), Some(("M1 Alive", 1.0)));
        assert!(sink.contains(&("M2 Alive".to_string(), 0.0)));

        // Power cycle counts as a pulse even while not communicating
        drive.actuator_mut(Wheel::FrontRight).power_cycle();
        for _ in 0..5 {
            drive.tick(0.3, 0.0, 0.0, &mut sink);
        }
        assert!(drive.alive()[1]);
    }
}
