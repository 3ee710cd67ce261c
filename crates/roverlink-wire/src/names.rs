//! Well-known record names.

/// Liveness marker, sent by the station heartbeat and echoed by the executor.
pub const PING: &str = "ping";
/// Distance telemetry (centimetres, string-encoded).
pub const IR: &str = "ir";
/// Battery telemetry (volts, string-encoded).
pub const POWER: &str = "power";

pub const SPEAK: &str = "speak";
pub const LED: &str = "led";
pub const RESTART: &str = "restart";
pub const UPDATE: &str = "update";
pub const SHUTDOWN: &str = "shutdown";
pub const XY: &str = "xy";
pub const ARM: &str = "arm";
pub const GEAR: &str = "gear";
pub const ARM_OPEN: &str = "arm_open";
pub const ARM_CLOSE: &str = "arm_close";
pub const DRIVE: &str = "drive";

// Accepted by the executor but only logged.
pub const MOTOR_A: &str = "motorA";
pub const MOTOR_B: &str = "motorB";
pub const SMALL_MOTOR: &str = "smallMotor";
