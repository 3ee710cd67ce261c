use std::sync::atomic::AtomicBool;

use roverlink_peer::{ExecutorOptions, ExecutorServer, SimulatedDriver, StopReason};
use roverlink_wire::ChannelId;
use serde::Serialize;
use tracing::info;

use crate::cmd::{load_config, parse_seconds, ServeArgs};
use crate::exit::{config_error, peer_error, CliResult, SUCCESS, UPDATE_REQUESTED};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct StoppedOutput {
    kind: &'static str,
    reason: &'static str,
}

pub fn run(args: ServeArgs, format: OutputFormat, stop: &AtomicBool) -> CliResult<i32> {
    let mut config = load_config(&args.connection)?;
    if let Some(bind) = &args.bind {
        config.executor.bind = bind.clone();
    }
    if let Some(interval) = &args.telemetry_interval {
        config.executor.telemetry_interval = parse_seconds(interval)?;
    }
    config
        .validate()
        .map_err(|err| config_error("invalid configuration", err))?;

    let options =
        ExecutorOptions::from_config(&config).map_err(|err| peer_error("invalid options", err))?;
    let driver = SimulatedDriver::new().with_sensors(args.distance, args.voltage);
    let server =
        ExecutorServer::bind(options, driver).map_err(|err| peer_error("bind failed", err))?;

    for channel in ChannelId::ALL {
        let addr = server
            .local_addr(channel)
            .map_err(|err| peer_error("local address", err))?;
        info!(channel = %channel, %addr, "listening");
    }

    let reason = server
        .run(stop)
        .map_err(|err| peer_error("executor failed", err))?;

    let label = match reason {
        StopReason::Interrupted => "interrupted",
        StopReason::Shutdown => "shutdown",
        StopReason::Update => "update",
    };
    match format {
        OutputFormat::Json => print_json(&StoppedOutput {
            kind: "stopped",
            reason: label,
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("executor stopped: {label}"),
        OutputFormat::Raw => {}
    }

    Ok(match reason {
        StopReason::Update => UPDATE_REQUESTED,
        StopReason::Interrupted | StopReason::Shutdown => SUCCESS,
    })
}
