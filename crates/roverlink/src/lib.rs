//! Command/telemetry link between a robot control station and the robot.
//!
//! The robot exposes two TCP endpoints: channel A for peripherals (arm,
//! camera, LEDs) and channel B for the drive unit. Short `name:value;`
//! records flow both ways; the station keeps the link alive with pings and
//! reconnects on request.
//!
//! # Crate Structure
//!
//! - [`wire`]: Record type and the delimited `name:value` codec
//! - [`transport`]: Background worker multiplexing both channels, heartbeat
//! - [`config`]: TOML configuration (behind `peer` feature)
//! - [`peer`]: Control station, liveness monitor and executor (behind `peer` feature)

/// Re-export record and codec types.
pub mod wire {
    pub use roverlink_wire::*;
}

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export configuration types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod config {
    pub use roverlink_config::*;
}

/// Re-export station and executor types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use roverlink_peer::*;
}
