use std::time::Duration;

use roverlink_wire::{ChannelId, Delimiter, RecordConfig, DEFAULT_MAX_RECORD_LEN};

use crate::connection::Endpoint;
use crate::error::{Result, TransportError};
use crate::reconnect::DEFAULT_RECONNECT_COOLDOWN;

/// Default readiness wait when nothing is ready.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on a single blocking connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of bytes requested per read.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Everything the worker needs to drive both channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub host: String,
    pub port_a: u16,
    pub port_b: u16,
    pub delimiter: Delimiter,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub reconnect_cooldown: Duration,
    pub read_chunk: usize,
    pub max_record_len: usize,
    /// Drop-oldest bound on the outbound queue; `None` is unbounded.
    pub outbound_capacity: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_a: 2001,
            port_b: 2000,
            delimiter: Delimiter::Semicolon,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_cooldown: DEFAULT_RECONNECT_COOLDOWN,
            read_chunk: DEFAULT_READ_CHUNK,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            outbound_capacity: None,
        }
    }
}

impl TransportConfig {
    pub fn endpoint(&self, channel: ChannelId) -> Endpoint {
        let port = match channel {
            ChannelId::A => self.port_a,
            ChannelId::B => self.port_b,
        };
        Endpoint::new(self.host.clone(), port)
    }

    pub fn record_config(&self) -> RecordConfig {
        RecordConfig {
            delimiter: self.delimiter,
            max_record_len: self.max_record_len,
            ..RecordConfig::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(TransportError::InvalidConfig(msg.to_string()));

        if self.host.is_empty() {
            return invalid("host must not be empty");
        }
        if self.port_a == self.port_b {
            return invalid("channel A and channel B ports must differ");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be non-zero");
        }
        if self.connect_timeout.is_zero() {
            return invalid("connect timeout must be non-zero");
        }
        if self.read_chunk == 0 {
            return invalid("read chunk must be non-zero");
        }
        if self.max_record_len == 0 {
            return invalid("max record length must be non-zero");
        }
        if self.outbound_capacity == Some(0) {
            return invalid("outbound capacity must be positive when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        TransportConfig::default().validate().unwrap();
    }

    #[test]
    fn endpoints_follow_channel_ports() {
        let config = TransportConfig {
            host: "rover.local".to_string(),
            ..TransportConfig::default()
        };
        assert_eq!(config.endpoint(ChannelId::A).to_string(), "rover.local:2001");
        assert_eq!(config.endpoint(ChannelId::B).to_string(), "rover.local:2000");
    }

    #[test]
    fn rejects_shared_port() {
        let config = TransportConfig {
            port_a: 2000,
            port_b: 2000,
            ..TransportConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig(msg)) if msg.contains("ports")
        ));
    }

    #[test]
    fn rejects_zero_limits() {
        let zero_poll = TransportConfig {
            poll_interval: Duration::ZERO,
            ..TransportConfig::default()
        };
        assert!(zero_poll.validate().is_err());

        let zero_capacity = TransportConfig {
            outbound_capacity: Some(0),
            ..TransportConfig::default()
        };
        assert!(zero_capacity.validate().is_err());
    }
}
