//! The operator-side control loop.
//!
//! Each cycle drains transport events into the [`LivenessMonitor`], forwards
//! the monitor's reconnect list to the transport, and enqueues whatever the
//! [`InputSource`] produced. The loop never touches a socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use roverlink_config::Config;
use roverlink_transport::{
    HeartbeatEmitter, Outbox, SendPolicy, Transport, TransportEvent, WorkerStats,
};
use roverlink_wire::{ChannelId, CommandRecord};
use tracing::{debug, info};

use crate::error::Result;
use crate::input::InputSource;
use crate::liveness::{LivenessMonitor, LivenessReport};

/// Minimum spacing between reconnect requests the station forwards for one
/// channel. The transport applies its own cooldown on top.
pub const RECONNECT_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// One still image from the robot's camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub captured_at: Instant,
}

/// Supplier of the most recent camera frame.
pub trait FrameSource: Send {
    fn latest_frame(&self) -> Option<Frame>;
}

/// What happened during one control cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub liveness: LivenessReport,
    /// Non-ping records received this cycle.
    pub received: Vec<CommandRecord>,
    /// Records enqueued this cycle.
    pub sent: usize,
    /// Records the send policy skipped as repeats.
    pub skipped: usize,
    /// Reconnect requests forwarded this cycle.
    pub reconnects: Vec<ChannelId>,
    /// Set when the status line differs from the previous cycle's.
    pub status_changed: bool,
    pub frame: Option<Frame>,
}

/// Totals reported when the station stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StationSummary {
    pub cycles: u64,
    pub sent: u64,
    pub skipped: u64,
    pub reconnect_requests: u64,
    pub pings: u64,
    pub worker: WorkerStats,
}

/// Transport, heartbeat and liveness monitor driven from one thread.
pub struct ControlStation {
    transport: Transport,
    heartbeat: Option<HeartbeatEmitter>,
    outbox: Outbox,
    monitor: LivenessMonitor,
    frames: Option<Box<dyn FrameSource>>,
    frame_interval: Duration,
    last_request: [Option<Instant>; 2],
    last_status: Option<String>,
    summary: StationSummary,
}

impl ControlStation {
    /// Start the transport and the heartbeat.
    pub fn start(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = Transport::start(&config.transport())?;
        let interval = HeartbeatEmitter::interval_for(config.link.alive_after)?;
        let heartbeat = HeartbeatEmitter::start(&transport.outbox(SendPolicy::Always), interval)?;
        let outbox = transport.outbox(config.link.send_policy);

        info!(
            host = %config.robot.host,
            alive_after_ms = config.link.alive_after.as_millis() as u64,
            "control station started"
        );
        Ok(Self {
            transport,
            heartbeat: Some(heartbeat),
            outbox,
            monitor: LivenessMonitor::new(config.link.alive_after, config.telemetry.clone()),
            frames: None,
            frame_interval: config.station.frame_interval,
            last_request: [None; 2],
            last_status: None,
            summary: StationSummary::default(),
        })
    }

    pub fn with_frame_source(mut self, frames: Box<dyn FrameSource>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// Enqueue one record through the station's send policy.
    pub fn send(&mut self, record: CommandRecord) -> bool {
        let sent = self.outbox.send(record);
        if sent {
            self.summary.sent += 1;
        } else {
            self.summary.skipped += 1;
        }
        sent
    }

    /// Run one control cycle at `now`.
    pub fn tick(&mut self, input: &mut dyn InputSource, now: Instant) -> CycleReport {
        self.summary.cycles += 1;

        let events = self.transport.events();
        self.monitor.observe_all(&events, now);
        let received: Vec<CommandRecord> = events
            .iter()
            .filter_map(TransportEvent::record)
            .filter(|record| {
                let is_ping = record.name() == roverlink_wire::names::PING;
                if is_ping {
                    self.summary.pings += 1;
                }
                !is_ping
            })
            .cloned()
            .collect();

        let liveness = self.monitor.evaluate(now);
        let reconnects = self.forward_reconnects(&liveness.reconnect, now);

        let (mut sent, mut skipped) = (0, 0);
        for record in input.poll(now) {
            if self.send(record) {
                sent += 1;
            } else {
                skipped += 1;
            }
        }

        let status = liveness.status_line();
        let status_changed = self.last_status.as_deref() != Some(status.as_str());
        if status_changed {
            info!(status = %status, "station status");
            self.last_status = Some(status);
        }

        CycleReport {
            liveness,
            received,
            sent,
            skipped,
            reconnects,
            status_changed,
            frame: self.frames.as_ref().and_then(|f| f.latest_frame()),
        }
    }

    /// Cycle every `frame_interval` until `stop` is raised, or until `input`
    /// is exhausted and the outbound queue is empty (waiting at most `linger`
    /// for it to drain).
    pub fn run(
        &mut self,
        input: &mut dyn InputSource,
        stop: &AtomicBool,
        linger: Duration,
        mut on_cycle: impl FnMut(&CycleReport),
    ) {
        let mut exhausted_at: Option<Instant> = None;
        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            let report = self.tick(input, started);
            on_cycle(&report);

            if input.is_exhausted() {
                let since = *exhausted_at.get_or_insert(started);
                if self.transport.pending_outbound() == 0 {
                    debug!("input exhausted and outbound queue drained");
                    break;
                }
                if started.saturating_duration_since(since) >= linger {
                    info!(
                        pending = self.transport.pending_outbound(),
                        "input exhausted; giving up on unsent records"
                    );
                    break;
                }
            }

            std::thread::sleep(self.frame_interval.saturating_sub(started.elapsed()));
        }
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.monitor
    }

    pub fn pending_outbound(&self) -> usize {
        self.transport.pending_outbound()
    }

    /// Stop the heartbeat and the transport.
    pub fn stop(mut self) -> StationSummary {
        if let Some(heartbeat) = self.heartbeat.take() {
            let pings = heartbeat.stop();
            debug!(pings, "heartbeat stopped");
        }
        let mut summary = self.summary;
        summary.worker = self.transport.stop();
        info!(cycles = summary.cycles, sent = summary.sent, "control station stopped");
        summary
    }

    fn forward_reconnects(&mut self, wanted: &[ChannelId], now: Instant) -> Vec<ChannelId> {
        let mut forwarded = Vec::new();
        for &channel in wanted {
            let slot = &mut self.last_request[channel.index()];
            let due = slot.map_or(true, |last| {
                now.saturating_duration_since(last) >= RECONNECT_REQUEST_INTERVAL
            });
            if due {
                *slot = Some(now);
                self.transport.request_reconnect(channel);
                self.summary.reconnect_requests += 1;
                forwarded.push(channel);
            }
        }
        forwarded
    }
}
