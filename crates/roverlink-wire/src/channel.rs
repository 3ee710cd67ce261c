//! Robot endpoints and outbound routing tags.
//!
//! Each robot exposes two independent stream endpoints. Channel A carries
//! peripheral/actuator commands (arm, camera, laser, LEDs); channel B carries
//! drive motors, speech, shutdown and gear. Routing never appears on the wire.

use std::fmt;

/// One of the two robot endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelId {
    /// Peripheral/actuator endpoint.
    A,
    /// Drive-unit endpoint.
    B,
}

impl ChannelId {
    /// Both channels, in servicing order.
    pub const ALL: [ChannelId; 2] = [ChannelId::A, ChannelId::B];

    /// Dense index for per-channel arrays.
    pub const fn index(self) -> usize {
        match self {
            ChannelId::A => 0,
            ChannelId::B => 1,
        }
    }

    /// Inverse of [`ChannelId::index`].
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ChannelId::A),
            1 => Some(ChannelId::B),
            _ => None,
        }
    }

    /// Human-readable channel name.
    pub const fn name(self) -> &'static str {
        match self {
            ChannelId::A => "A",
            ChannelId::B => "B",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an outbound record may be written.
///
/// `Any` means "whichever channel is writable first", not broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Any,
    ChannelA,
    ChannelB,
}

impl Destination {
    /// Returns true if a record with this destination may go out on `channel`.
    pub fn matches(self, channel: ChannelId) -> bool {
        match self {
            Destination::Any => true,
            Destination::ChannelA => channel == ChannelId::A,
            Destination::ChannelB => channel == ChannelId::B,
        }
    }

    /// The single channel this destination names, if any. Inbound records
    /// carry the channel they arrived on.
    pub fn channel(self) -> Option<ChannelId> {
        match self {
            Destination::Any => None,
            Destination::ChannelA => Some(ChannelId::A),
            Destination::ChannelB => Some(ChannelId::B),
        }
    }
}

impl From<ChannelId> for Destination {
    fn from(channel: ChannelId) -> Self {
        match channel {
            ChannelId::A => Destination::ChannelA,
            ChannelId::B => Destination::ChannelB,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Any => f.write_str("any"),
            Destination::ChannelA => f.write_str("A"),
            Destination::ChannelB => f.write_str("B"),
        }
    }
}
