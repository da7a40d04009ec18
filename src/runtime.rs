// Fixed-rate drive loop with command watchdog
// Note: the watchdog stops the base if teleop stops sending commands. The
// hardware-side safety cutoff is separate and lives outside this process.

use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

// local imports
use crate::config::{
    DriveConfig, ParamTable, CMD_TIMEOUT, LOOP_HZ, TOPIC_CMD_BASE, TOPIC_CMD_MODE,
    TOPIC_CMD_PARAM, TOPIC_HEALTH, TOPIC_TELEMETRY,
};
use crate::drive::{Actuator, DriveSubsystem, SimActuator};
use crate::messages::{BaseCommand, ModeCommand, ParamUpdate, RuntimeHealth, TelemetrySample};
use crate::schedule::{period_for_hz, Schedulable};

/// Runtime options, usually from the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: DriveConfig,
    pub loop_hz: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: DriveConfig::default(),
            loop_hz: LOOP_HZ,
        }
    }
}

/// The drive subsystem plus the bus-facing state around it
pub struct DriveLoop<A: Actuator> {
    drive: DriveSubsystem<A>,
    latest_cmd: Option<BaseCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    telemetry: Vec<(String, f32)>,
}

impl<A: Actuator> DriveLoop<A> {
    pub fn new(drive: DriveSubsystem<A>) -> Self {
        Self {
            drive,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            telemetry: Vec::new(),
        }
    }

    /// Process incoming velocity command
    pub fn on_command(&mut self, cmd: BaseCommand) {
        self.on_command_at(cmd, Instant::now());
    }

    fn on_command_at(&mut self, cmd: BaseCommand, at: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = at;
    }

    /// Apply a mode trigger between ticks
    pub fn on_mode(&mut self, cmd: ModeCommand) {
        info!("Setting drive mode: {:?}", cmd);
        if let Err(e) = cmd.apply(&mut self.drive) {
            warn!("Drive mode {:?} failed: {}", cmd, e);
        }
    }

    /// Update a tunable value
    pub fn on_param(&mut self, update: ParamUpdate) {
        info!("Tunable {} = {}", update.key, update.value);
        self.drive.tunables_mut().set(update.key, update.value);
    }

    /// Command to drive with, after the watchdog
    fn compute_command(&mut self, now: Instant) -> BaseCommand {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);

        match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(_) => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                BaseCommand::default()
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                BaseCommand::default()
            }
        }
    }

    fn step(&mut self, now: Instant) {
        let cmd = self.compute_command(now);
        self.drive
            .tick(cmd.x_vel, cmd.y_vel, cmd.theta_vel, &mut self.telemetry);

        if self.drive.is_degraded() || self.drive.alive().contains(&false) {
            self.health = RuntimeHealth::Degraded;
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drive(&self) -> &DriveSubsystem<A> {
        &self.drive
    }

    /// Take the telemetry emitted since the last call
    pub fn drain_telemetry(&mut self) -> Vec<TelemetrySample> {
        self.telemetry.drain(..).map(TelemetrySample::from).collect()
    }
}

impl<A: Actuator> Schedulable for DriveLoop<A> {
    fn execute(&mut self) {
        self.step(Instant::now());
    }
}

/// Open the four wheel channels; a channel that fails is replaced by a
/// detached placeholder so the drive still comes up (degraded)
pub fn open_actuators(channels: [u8; 4]) -> [SimActuator; 4] {
    channels.map(|channel| match SimActuator::open(channel) {
        Ok(actuator) => actuator,
        Err(e) => {
            error!("Failed to open channel {}: {}", channel, e);
            SimActuator::detached(channel)
        }
    })
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Option<T> {
    match serde_json::from_slice::<T>(payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!("Failed to parse message on {}: {}", topic, e);
            None
        }
    }
}

/// Outbound bus endpoint taking JSON payloads
trait JsonPublisher {
    async fn put_json(
        &self,
        payload: String,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl JsonPublisher for zenoh::pubsub::Publisher<'_> {
    async fn put_json(
        &self,
        payload: String,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.put(payload).await?;
        Ok(())
    }
}

/// Publish one message; failures are logged and dropped
async fn publish<T: Serialize>(publisher: &impl JsonPublisher, topic: &str, msg: &T) -> bool {
    let payload = match serde_json::to_string(msg) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode message for {}: {}", topic, e);
            return false;
        }
    };
    match publisher.put_json(payload).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to publish on {}: {}", topic, e);
            false
        }
    }
}

async fn publish_outputs<A: Actuator>(
    drive_loop: &mut DriveLoop<A>,
    pub_telemetry: &impl JsonPublisher,
    pub_health: &impl JsonPublisher,
) {
    for sample in drive_loop.drain_telemetry() {
        publish(pub_telemetry, TOPIC_TELEMETRY, &sample).await;
    }
    publish(pub_health, TOPIC_HEALTH, &drive_loop.health()).await;
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_base = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_mode = session.declare_subscriber(TOPIC_CMD_MODE).await?;
    let sub_param = session.declare_subscriber(TOPIC_CMD_PARAM).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let config = options.config;
    let actuators = open_actuators(config.channels);
    let tunables = ParamTable::from(config.tunables.clone());
    let mut drive_loop = DriveLoop::new(DriveSubsystem::new(actuators, &config, tunables));
    let period = period_for_hz(options.loop_hz);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        options.loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_BASE, TOPIC_CMD_MODE, TOPIC_CMD_PARAM
    );
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain pending mode triggers and tunables before the tick, so a
        //    transition is never interleaved with one
        while let Ok(Some(sample)) = sub_param.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Some(update) = decode::<ParamUpdate>(TOPIC_CMD_PARAM, &payload) {
                drive_loop.on_param(update);
            }
        }
        while let Ok(Some(sample)) = sub_mode.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Some(cmd) = decode::<ModeCommand>(TOPIC_CMD_MODE, &payload) {
                drive_loop.on_mode(cmd);
            }
        }

        // 2. Drain all pending velocity commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_base.try_recv() {
            let payload = sample.payload().to_bytes();
            if let Some(cmd) = decode::<BaseCommand>(TOPIC_CMD_BASE, &payload) {
                drive_loop.on_command(cmd);
            }
        }

        // 3. Tick the drive (includes watchdog logic)
        drive_loop.execute();

        // 4. Publish telemetry and health (fire-and-forget)
        publish_outputs(&mut drive_loop, &pub_telemetry, &pub_health).await;
    }
}
