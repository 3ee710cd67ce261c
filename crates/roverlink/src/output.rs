use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use roverlink_peer::{LivenessReport, StationSummary};
use roverlink_wire::{ChannelId, CommandRecord};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    kind: &'static str,
    channel: &'static str,
    name: &'a str,
    value: &'a str,
    timestamp: String,
}

pub fn print_record(channel: ChannelId, record: &CommandRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RecordOutput {
                kind: "record",
                channel: channel.name(),
                name: record.name(),
                value: record.value(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "NAME", "VALUE"])
                .add_row(vec![
                    channel.name().to_string(),
                    record.name().to_string(),
                    record.value().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} name={} value={}",
                channel,
                record.name(),
                record.value()
            );
        }
        OutputFormat::Raw => {
            print_raw(format!("{record};").as_bytes());
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    kind: &'static str,
    #[serde(flatten)]
    report: &'a LivenessReport,
    timestamp: String,
}

pub fn print_status(report: &LivenessReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&StatusOutput {
            kind: "status",
            report,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let optional = |v: Option<f64>, unit: &str| match v {
                Some(v) => format!("{v:.1}{unit}"),
                None => "-".to_string(),
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROBOT", "DISTANCE", "POWER", "A", "B"])
                .add_row(vec![
                    if report.alive { "ready" } else { "lost" }.to_string(),
                    optional(report.telemetry.distance_cm, "cm"),
                    optional(report.telemetry.voltage, "V"),
                    report.channel_a.as_str().to_string(),
                    report.channel_b.as_str().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!("{}", report.status_line()),
    }
}

#[derive(Serialize)]
struct SummaryOutput {
    kind: &'static str,
    cycles: u64,
    sent: u64,
    skipped: u64,
    pings: u64,
    reconnect_requests: u64,
    records_written: u64,
    records_read: u64,
    malformed: u64,
    oversized: u64,
    faults: u64,
    dropped_at_shutdown: u64,
}

impl From<&StationSummary> for SummaryOutput {
    fn from(s: &StationSummary) -> Self {
        Self {
            kind: "summary",
            cycles: s.cycles,
            sent: s.sent,
            skipped: s.skipped,
            pings: s.pings,
            reconnect_requests: s.reconnect_requests,
            records_written: s.worker.records_sent,
            records_read: s.worker.records_received,
            malformed: s.worker.malformed,
            oversized: s.worker.oversized,
            faults: s.worker.faults,
            dropped_at_shutdown: s.worker.dropped_at_shutdown,
        }
    }
}

pub fn print_summary(summary: &StationSummary, format: OutputFormat) {
    let out = SummaryOutput::from(summary);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (metric, value) in [
                ("cycles", out.cycles),
                ("sent", out.sent),
                ("skipped", out.skipped),
                ("pings", out.pings),
                ("reconnect_requests", out.reconnect_requests),
                ("records_written", out.records_written),
                ("records_read", out.records_read),
                ("malformed", out.malformed),
                ("oversized", out.oversized),
                ("faults", out.faults),
                ("dropped_at_shutdown", out.dropped_at_shutdown),
            ] {
                table.add_row(vec![metric.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "cycles={} sent={} skipped={} written={} read={} faults={} dropped={}",
            out.cycles,
            out.sent,
            out.skipped,
            out.records_written,
            out.records_read,
            out.faults,
            out.dropped_at_shutdown
        ),
        OutputFormat::Raw => {}
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
