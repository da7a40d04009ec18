// Mecanum drivetrain runtime
//
// - drive: kinematics, control-mode transitions, liveness, per-tick orchestration
// - runtime: fixed-rate host loop wired to zenoh

pub mod config;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod schedule;
