use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::{Args, Subcommand, ValueEnum};
use roverlink_config::Config;
use roverlink_wire::ChannelId;

use crate::exit::{config_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod drive;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the robot-side executor with a simulated driver.
    Serve(ServeArgs),
    /// Run the control station, reading a command script from stdin.
    Drive(DriveArgs),
    /// Send records on one channel and optionally print what comes back.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, stop: &AtomicBool) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format, stop),
        Command::Drive(args) => drive::run(args, format, stop),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    A,
    B,
}

impl From<ChannelArg> for ChannelId {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::A => ChannelId::A,
            ChannelArg::B => ChannelId::B,
        }
    }
}

/// Where the configuration comes from, plus per-invocation overrides.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// TOML configuration file.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Robot host (overrides `robot.host`).
    #[arg(long)]
    pub host: Option<String>,
    /// Channel A port (overrides `robot.channel_a_port`).
    #[arg(long, value_name = "PORT")]
    pub port_a: Option<u16>,
    /// Channel B port (overrides `robot.channel_b_port`).
    #[arg(long, value_name = "PORT")]
    pub port_b: Option<u16>,
}

impl ConnectionArgs {
    pub fn port(&self, config: &Config, channel: ChannelId) -> u16 {
        match channel {
            ChannelId::A => self.port_a.unwrap_or(config.robot.channel_a_port),
            ChannelId::B => self.port_b.unwrap_or(config.robot.channel_b_port),
        }
    }
}

pub fn load_config(args: &ConnectionArgs) -> CliResult<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_path(path)
            .map_err(|err| config_error(&format!("loading {}", path.display()), err))?,
        None => Config::default(),
    };
    if let Some(host) = &args.host {
        config.robot.host = host.clone();
    }
    config.robot.channel_a_port = args.port(&config, ChannelId::A);
    config.robot.channel_b_port = args.port(&config, ChannelId::B);
    config
        .validate()
        .map_err(|err| config_error("invalid configuration", err))?;
    Ok(config)
}

/// Parse a seconds argument such as `2`, `0.5` or `250ms`.
pub fn parse_seconds(input: &str) -> CliResult<std::time::Duration> {
    let input = input.trim();
    let (number, scale) = match input.strip_suffix("ms") {
        Some(ms) => (ms, 1e-3),
        None => (input.strip_suffix('s').unwrap_or(input), 1.0),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    std::time::Duration::try_from_secs_f64(value * scale)
        .map_err(|_| CliError::new(USAGE, format!("duration out of range: {input:?}")))
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Address to bind both endpoints on (overrides `executor.bind`).
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
    /// Telemetry period in seconds (overrides `executor.telemetry_interval`).
    #[arg(long, value_name = "SECS")]
    pub telemetry_interval: Option<String>,
    /// Simulated distance sensor reading in cm.
    #[arg(long, default_value_t = 100.0)]
    pub distance: f64,
    /// Simulated battery voltage.
    #[arg(long, default_value_t = 8.0)]
    pub voltage: f64,
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// After stdin ends, how long to wait for queued records to go out.
    #[arg(long, value_name = "SECS", default_value = "3")]
    pub linger: String,
    /// Send every record even if it repeats the previous one.
    #[arg(long)]
    pub always_send: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
    /// Channel to send on.
    #[arg(long, value_enum, default_value = "b")]
    pub channel: ChannelArg,
    /// Records to send, as `name:value`.
    #[arg(value_name = "RECORD", required_unless_present = "wait")]
    pub records: Vec<String>,
    /// Print records received back until `--count` arrive or the timeout.
    #[arg(long)]
    pub wait: bool,
    /// Number of records to wait for.
    #[arg(long, default_value_t = 1)]
    pub count: usize,
    /// Maximum time to wait for replies (e.g. 5, 500ms).
    #[arg(long, default_value = "5")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
