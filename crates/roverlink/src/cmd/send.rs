use std::net::TcpStream;
use std::time::{Duration, Instant};

use roverlink_wire::{
    is_timeout, ChannelId, CommandRecord, Destination, RecordReader, RecordWriter, SEPARATOR,
};
use tracing::debug;

use crate::cmd::{load_config, parse_seconds, SendArgs};
use crate::exit::{io_error, transport_error, wire_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_record, OutputFormat};

/// Read timeout while waiting for replies; bounds how late the deadline is
/// noticed.
const REPLY_POLL: Duration = Duration::from_millis(100);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args.connection)?;
    let channel = ChannelId::from(args.channel);
    let destination = Destination::from(channel);
    let wait_timeout = parse_seconds(&args.wait_timeout)?;

    let records = args
        .records
        .iter()
        .map(|raw| parse_arg_record(raw, destination))
        .collect::<CliResult<Vec<_>>>()?;

    let transport = config.transport();
    let endpoint = transport.endpoint(channel);
    let addr = endpoint
        .resolve()
        .map_err(|err| transport_error("resolve failed", err))?;
    let stream = TcpStream::connect_timeout(&addr, transport.connect_timeout)
        .map_err(|err| io_error(&format!("connect to {endpoint} failed"), err))?;
    debug!(%endpoint, channel = %channel, "connected");

    let read_half = stream
        .try_clone()
        .map_err(|err| io_error("clone stream failed", err))?;
    let mut writer = RecordWriter::with_config_tcp(stream, transport.record_config())
        .map_err(|err| wire_error("configure stream failed", err))?;
    writer
        .send_all(&records)
        .map_err(|err| wire_error("send failed", err))?;
    debug!(count = records.len(), "records sent");

    if !args.wait {
        return Ok(SUCCESS);
    }

    let reader_config = roverlink_wire::RecordConfig {
        read_timeout: Some(REPLY_POLL),
        ..transport.record_config()
    };
    let mut reader = RecordReader::with_config_tcp(read_half, reader_config, destination)
        .map_err(|err| wire_error("configure stream failed", err))?;

    let deadline = Instant::now() + wait_timeout;
    let mut received = 0;
    while received < args.count {
        match reader.read_record() {
            Ok(record) => {
                print_record(channel, &record, format);
                received += 1;
            }
            Err(err) if is_timeout(&err) => {
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!(
                            "timed out after {received} of {} records on channel {channel}",
                            args.count
                        ),
                    ));
                }
            }
            Err(err) => return Err(wire_error("receive failed", err)),
        }
    }

    Ok(SUCCESS)
}

/// `name:value`, or a bare `name` for value-less commands such as `restart`.
fn parse_arg_record(raw: &str, destination: Destination) -> CliResult<CommandRecord> {
    let (name, value) = raw.split_once(SEPARATOR).unwrap_or((raw, ""));
    CommandRecord::new(name, value, destination)
        .map_err(|err| wire_error(&format!("invalid record {raw:?}"), err))
}
