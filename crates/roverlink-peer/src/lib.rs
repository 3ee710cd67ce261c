//! Both ends of the robot link above the transport.
//!
//! Station side: [`ControlStation`] runs the operator control loop on top of
//! the transport, the heartbeat and a [`LivenessMonitor`], fed by an
//! [`InputSource`].
//!
//! Robot side: [`ExecutorServer`] accepts one peer per endpoint, parses
//! records into [`RobotCommand`]s and drives a [`HardwareDriver`].

pub mod command;
pub mod driver;
pub mod error;
pub mod executor;
pub mod input;
pub mod liveness;
pub mod station;

pub use command::{RobotCommand, MAX_GEAR};
pub use driver::{DriverResult, HardwareDriver, LedColor, Motor, SimulatedDriver};
pub use error::{DriverError, PeerError, Result};
pub use executor::{ExecutorOptions, ExecutorServer, StopReason, ARM_GRIP_SPEED, DEFAULT_TICK};
pub use input::{
    parse_script_line, quantize_axis, AxisInput, InputSource, ScriptInput, ScriptLine,
    AXIS_DEAD_ZONE, SPEAK_PHRASE,
};
pub use liveness::{
    ChannelStatus, LivenessMonitor, LivenessReport, LivenessState, TelemetrySnapshot,
};
pub use station::{
    ControlStation, CycleReport, Frame, FrameSource, StationSummary, RECONNECT_REQUEST_INTERVAL,
};
