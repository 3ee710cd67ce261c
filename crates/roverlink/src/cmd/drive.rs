use std::io::BufReader;
use std::sync::atomic::AtomicBool;

use roverlink_peer::{ControlStation, CycleReport, ScriptInput};
use roverlink_transport::SendPolicy;
use roverlink_wire::ChannelId;
use tracing::{info, warn};

use crate::cmd::{load_config, parse_seconds, DriveArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_record, print_status, print_summary, OutputFormat};

pub fn run(args: DriveArgs, format: OutputFormat, stop: &AtomicBool) -> CliResult<i32> {
    let mut config = load_config(&args.connection)?;
    if args.always_send {
        config.link.send_policy = SendPolicy::Always;
    }
    let linger = parse_seconds(&args.linger)?;

    let mut input = ScriptInput::from_reader(BufReader::new(std::io::stdin()))
        .map_err(|err| peer_error("reading stdin", err))?;
    let mut station =
        ControlStation::start(&config).map_err(|err| peer_error("station start failed", err))?;

    station.run(&mut input, stop, linger, |report| {
        print_cycle(report, format)
    });

    if input.rejected() > 0 {
        warn!(rejected = input.rejected(), "some script lines were skipped");
    }
    let summary = station.stop();
    info!(
        sent = summary.sent,
        written = summary.worker.records_sent,
        "drive finished"
    );
    print_summary(&summary, format);
    Ok(SUCCESS)
}

fn print_cycle(report: &CycleReport, format: OutputFormat) {
    if report.status_changed {
        print_status(&report.liveness, format);
    }
    for record in &report.received {
        let channel = record.destination().channel().unwrap_or(ChannelId::B);
        print_record(channel, record, format);
    }
}
