mod cmd;
mod exit;
mod logging;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "roverlink",
    version,
    about = "Robot command/telemetry link: control station, executor and probe tools"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    if let Err(err) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Release)) {
        tracing::warn!(error = %err, "could not install interrupt handler");
    }

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format, &stop) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "send",
            "--channel",
            "a",
            "--port-a",
            "4001",
            "led:green",
            "arm:40",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.records, ["led:green", "arm:40"]);
        assert_eq!(args.connection.port_a, Some(4001));
    }

    #[test]
    fn send_requires_a_record_or_wait() {
        let err = Cli::try_parse_from(["roverlink", "send"]).expect_err("needs records");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_drive_with_global_flags() {
        let cli = Cli::try_parse_from([
            "roverlink",
            "drive",
            "--host",
            "127.0.0.1",
            "--linger",
            "2.5",
            "--format",
            "pretty",
            "--log-level",
            "off",
        ])
        .expect("drive args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert_eq!(cli.log_level, LogLevel::Off);
        assert!(matches!(cli.command, Command::Drive(_)));
    }

    #[test]
    fn rejects_unknown_channel() {
        let err = Cli::try_parse_from(["roverlink", "send", "--channel", "c", "ping"])
            .expect_err("channel c does not exist");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
