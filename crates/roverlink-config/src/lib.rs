//! Startup configuration for roverlink.
//!
//! One [`Config`] value is built at startup (defaults, then an optional TOML
//! file, then CLI overrides), validated once and passed by reference.

pub mod config;
pub mod duration;
pub mod error;

pub use config::{
    Config, ExecutorConfig, LinkConfig, RobotConfig, StationConfig, TelemetryConfig,
    MAX_CONFIG_FILE_SIZE,
};
pub use error::{ConfigError, Result};
