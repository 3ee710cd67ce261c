//! Loopback example: an executor with a simulated driver and a control
//! station talking to it over localhost.
//!
//! Run with:
//!   cargo run --example loopback --features peer

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use roverlink::config::Config;
use roverlink::peer::{
    AxisInput, ControlStation, ExecutorOptions, ExecutorServer, InputSource, SimulatedDriver,
    DEFAULT_TICK,
};
use roverlink::wire::{names, ChannelId, CommandRecord, Destination, Delimiter};

/// Pushes the stick forward, turns on the LED, then lets go.
struct Joyride {
    axis: AxisInput,
    started: Option<Instant>,
    step: usize,
}

impl InputSource for Joyride {
    fn poll(&mut self, now: Instant) -> Vec<CommandRecord> {
        let started = *self.started.get_or_insert(now);
        let due = (now - started).as_millis() / 300;
        let mut out = Vec::new();
        while (self.step as u128) <= due && self.step < 3 {
            match self.step {
                0 => out.extend(self.axis.sample(0.0, 0.8, true)),
                1 => out.extend(CommandRecord::new(names::LED, "green", Destination::ChannelA)),
                _ => out.extend(self.axis.sample(0.0, 0.0, false)),
            }
            self.step += 1;
        }
        out
    }

    fn is_exhausted(&self) -> bool {
        self.step >= 3
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let localhost = |port| SocketAddr::from(([127, 0, 0, 1], port));
    let options = ExecutorOptions {
        addr_a: localhost(0),
        addr_b: localhost(0),
        delimiter: Delimiter::Semicolon,
        telemetry_interval: Duration::from_millis(250),
        quiet: false,
        tick: DEFAULT_TICK,
    };
    let server = ExecutorServer::bind(options, SimulatedDriver::new())?;

    let mut config = Config::default();
    config.robot.host = "127.0.0.1".to_string();
    config.robot.channel_a_port = server.local_addr(ChannelId::A)?.port();
    config.robot.channel_b_port = server.local_addr(ChannelId::B)?.port();
    config.link.alive_after = Duration::from_secs(2);

    // Both listeners are bound, so the station can connect before the
    // executor starts accepting.
    let mut station = ControlStation::start(&config)?;
    let stop = AtomicBool::new(false);
    thread::scope(|scope| -> Result<(), Box<dyn std::error::Error>> {
        let executor = scope.spawn(|| server.run(&stop));

        let mut input = Joyride {
            axis: AxisInput::new(),
            started: None,
            step: 0,
        };
        let station_stop = AtomicBool::new(false);
        let deadline = Instant::now() + Duration::from_secs(3);
        station.run(&mut input, &station_stop, Duration::from_secs(1), |report| {
            if report.status_changed {
                eprintln!("[station] {}", report.liveness.status_line());
            }
            for record in &report.received {
                eprintln!("[station] received {record}");
            }
            if Instant::now() >= deadline {
                station_stop.store(true, Ordering::Release);
            }
        });
        let summary = station.stop();
        eprintln!(
            "[station] sent={} written={} read={}",
            summary.sent, summary.worker.records_sent, summary.worker.records_received
        );

        stop.store(true, Ordering::Release);
        let reason = executor
            .join()
            .map_err(|_| "executor thread panicked")??;
        server.with_driver(|driver| {
            eprintln!(
                "[executor] stopped ({reason:?}); led={:?} spoken={:?}",
                driver.led(),
                driver.spoken()
            );
        });
        Ok(())
    })
}
