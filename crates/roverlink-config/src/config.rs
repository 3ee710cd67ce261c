use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use roverlink_transport::{SendPolicy, TransportConfig, DEFAULT_READ_CHUNK};
use roverlink_wire::{Delimiter, DEFAULT_MAX_RECORD_LEN};
use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Largest configuration file accepted by [`Config::from_path`].
pub const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Complete startup configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub robot: RobotConfig,
    pub link: LinkConfig,
    pub telemetry: TelemetryConfig,
    pub station: StationConfig,
    pub executor: ExecutorConfig,
}

/// Where the robot's two endpoints live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotConfig {
    pub host: String,
    /// Peripheral/actuator endpoint.
    pub channel_a_port: u16,
    /// Drive-unit endpoint; heartbeats and telemetry travel here.
    pub channel_b_port: u16,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.120".to_string(),
            channel_a_port: 2001,
            channel_b_port: 2000,
        }
    }
}

/// Transport behaviour shared by both channels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Robot counts as alive while the last ping is younger than this.
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub alive_after: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub reconnect_cooldown: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: Delimiter,
    pub max_record_len: usize,
    pub outbound_capacity: Option<usize>,
    #[serde(deserialize_with = "deserialize_send_policy")]
    pub send_policy: SendPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            alive_after: Duration::from_secs(5),
            reconnect_cooldown: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
            delimiter: Delimiter::Semicolon,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            outbound_capacity: None,
            send_policy: SendPolicy::IfChanged,
        }
    }
}

/// Thresholds applied to incoming telemetry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub low_battery_volts: f64,
    pub obstacle_distance_cm: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            low_battery_volts: 7.0,
            obstacle_distance_cm: 20.0,
        }
    }
}

/// Control loop pacing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub frame_interval: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_secs_f64(1.0 / 60.0),
        }
    }
}

/// Robot-side server settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Address both endpoints bind to; ports come from `[robot]`.
    pub bind: String,
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub telemetry_interval: Duration,
    /// Suppress per-command info logs.
    pub quiet: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            telemetry_interval: Duration::from_secs(1),
            quiet: false,
        }
    }
}

impl Config {
    /// Load and validate a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let read_err = |source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        };
        let size = std::fs::metadata(path).map_err(read_err)?.len();
        if size > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                path: path.to_path_buf(),
                size,
                max: MAX_CONFIG_FILE_SIZE,
            });
        }

        let text = std::fs::read_to_string(path).map_err(read_err)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.robot.host.trim().is_empty() {
            return invalid("robot.host must not be empty".to_string());
        }
        if self.robot.channel_a_port == self.robot.channel_b_port {
            return invalid(format!(
                "robot.channel_a_port and robot.channel_b_port must differ (both {})",
                self.robot.channel_a_port
            ));
        }
        if self.link.alive_after <= Duration::from_secs(1) {
            return invalid(format!(
                "link.alive_after must be greater than 1s, got {:?}",
                self.link.alive_after
            ));
        }
        if self.link.poll_interval.is_zero() {
            return invalid("link.poll_interval must be non-zero".to_string());
        }
        if self.link.connect_timeout.is_zero() {
            return invalid("link.connect_timeout must be non-zero".to_string());
        }
        if self.link.max_record_len == 0 {
            return invalid("link.max_record_len must be non-zero".to_string());
        }
        if self.link.outbound_capacity == Some(0) {
            return invalid("link.outbound_capacity must be positive when set".to_string());
        }
        if self.station.frame_interval.is_zero() {
            return invalid("station.frame_interval must be non-zero".to_string());
        }
        if self.executor.telemetry_interval.is_zero() {
            return invalid("executor.telemetry_interval must be non-zero".to_string());
        }
        if !self.telemetry.low_battery_volts.is_finite()
            || !self.telemetry.obstacle_distance_cm.is_finite()
        {
            return invalid("telemetry thresholds must be finite".to_string());
        }
        Ok(())
    }

    /// Transport settings for the station side.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            host: self.robot.host.clone(),
            port_a: self.robot.channel_a_port,
            port_b: self.robot.channel_b_port,
            delimiter: self.link.delimiter,
            poll_interval: self.link.poll_interval,
            connect_timeout: self.link.connect_timeout,
            reconnect_cooldown: self.link.reconnect_cooldown,
            read_chunk: DEFAULT_READ_CHUNK,
            max_record_len: self.link.max_record_len,
            outbound_capacity: self.link.outbound_capacity,
        }
    }

    /// Executor listen address for one port.
    pub fn executor_addr(&self, port: u16) -> Result<SocketAddr> {
        let text = format!("{}:{port}", self.executor.bind);
        text.parse()
            .map_err(|err| ConfigError::Invalid(format!("executor.bind {text:?}: {err}")))
    }
}

fn deserialize_delimiter<'de, D>(deserializer: D) -> std::result::Result<Delimiter, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(D::Error::custom)
}

fn deserialize_send_policy<'de, D>(deserializer: D) -> std::result::Result<SendPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_str() {
        "always" => Ok(SendPolicy::Always),
        "if_changed" => Ok(SendPolicy::IfChanged),
        other => Err(D::Error::custom(format!(
            "unknown send policy {other:?} (expected \"always\" or \"if_changed\")"
        ))),
    }
}
