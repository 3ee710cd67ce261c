use roverlink_wire::{ChannelId, CommandRecord};

use crate::error::TransportError;

/// Why a channel went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFault {
    /// A connection attempt failed (resolution, refusal, timeout).
    ConnectFailed,
    /// The peer closed the stream.
    PeerClosed,
    /// Reading failed with an I/O error.
    ReadFailed,
    /// Writing failed with an I/O error or went out partially.
    WriteFailed,
    /// The worker's readiness wait failed; the worker has stopped.
    PollFailed,
}

impl ChannelFault {
    /// Classify an error surfaced by a read on a connected channel.
    pub fn from_read(err: &TransportError) -> Self {
        match err {
            TransportError::PeerClosed => ChannelFault::PeerClosed,
            _ => ChannelFault::ReadFailed,
        }
    }

    /// Classify an error surfaced by a write on a connected channel.
    pub fn from_write(err: &TransportError) -> Self {
        match err {
            TransportError::PeerClosed => ChannelFault::PeerClosed,
            _ => ChannelFault::WriteFailed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelFault::ConnectFailed => "connect_failed",
            ChannelFault::PeerClosed => "peer_closed",
            ChannelFault::ReadFailed => "read_failed",
            ChannelFault::WriteFailed => "write_failed",
            ChannelFault::PollFailed => "poll_failed",
        }
    }
}

/// Everything the worker reports to the application, in arrival order.
///
/// Faults never escape the worker loop as errors; they show up here instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A record parsed from `channel`.
    Record {
        channel: ChannelId,
        record: CommandRecord,
    },
    /// `channel` finished connecting.
    ChannelUp { channel: ChannelId },
    /// `channel` is disconnected.
    ChannelDown {
        channel: ChannelId,
        fault: ChannelFault,
    },
}

impl TransportEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            TransportEvent::Record { channel, .. }
            | TransportEvent::ChannelUp { channel }
            | TransportEvent::ChannelDown { channel, .. } => *channel,
        }
    }

    /// The record carried by this event, if any.
    pub fn record(&self) -> Option<&CommandRecord> {
        match self {
            TransportEvent::Record { record, .. } => Some(record),
            _ => None,
        }
    }
}
