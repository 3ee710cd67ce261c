//! Dual-channel TCP transport between a control station and a robot.
//!
//! The robot exposes two endpoints: channel A for peripherals and channel B
//! for the drive unit. A single background [`TransportWorker`] owns both
//! sockets and multiplexes them with readiness polling:
//! - Outbound records wait in one FIFO and go out on the first writable
//!   channel their [`Destination`](roverlink_wire::Destination) allows
//! - Inbound records and channel faults arrive as [`TransportEvent`]s
//! - Reconnects happen only on request, gated by a [`ReconnectPolicy`]
//!
//! [`HeartbeatEmitter`] keeps the robot's liveness check fed with pings.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod queue;
pub mod reconnect;
pub mod worker;

pub use config::{
    TransportConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_READ_CHUNK,
};
pub use connection::{ChannelConnection, ChannelState, Endpoint, SendOutcome};
pub use error::{Result, TransportError};
pub use event::{ChannelFault, TransportEvent};
pub use heartbeat::{HeartbeatEmitter, HEARTBEAT_MARGIN};
pub use queue::{CommandQueue, EventQueue, FifoQueue, Outbox, SendPolicy};
pub use reconnect::{ReconnectPolicy, DEFAULT_RECONNECT_COOLDOWN};
pub use worker::{ControlRequest, Transport, TransportWorker, WorkerStats};
