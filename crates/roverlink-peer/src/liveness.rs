//! Station-side view of the robot: heartbeat staleness, latest telemetry and
//! which channels need a reconnect.

use std::time::{Duration, Instant};

use roverlink_config::TelemetryConfig;
use roverlink_transport::{ChannelFault, TransportEvent};
use roverlink_wire::{names, ChannelId};
use serde::{Serialize, Serializer};
use tracing::debug;

/// Time of the last received ping and the staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessState {
    last_ping: Option<Instant>,
    alive_after: Duration,
}

impl LivenessState {
    pub fn new(alive_after: Duration) -> Self {
        Self {
            last_ping: None,
            alive_after,
        }
    }

    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    /// Alive iff a ping arrived less than `alive_after` ago.
    pub fn is_alive(&self, now: Instant) -> bool {
        match self.last_ping {
            Some(last) => now.saturating_duration_since(last) < self.alive_after,
            None => false,
        }
    }

    pub fn last_ping(&self) -> Option<Instant> {
        self.last_ping
    }

    pub fn alive_after(&self) -> Duration {
        self.alive_after
    }
}

/// What the station last heard about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// No connection result reported yet.
    Pending,
    Up,
    Down,
}

impl ChannelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelStatus::Pending => "pending",
            ChannelStatus::Up => "up",
            ChannelStatus::Down => "down",
        }
    }
}

/// Latest telemetry as presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// `None` when unknown or when the robot is not alive.
    pub distance_cm: Option<f64>,
    pub voltage: Option<f64>,
    /// Set while the robot is not alive.
    pub stale: bool,
}

/// Result of one liveness evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessReport {
    pub alive: bool,
    pub telemetry: TelemetrySnapshot,
    pub low_battery: bool,
    pub obstacle_near: bool,
    pub channel_a: ChannelStatus,
    pub channel_b: ChannelStatus,
    /// Channels the station should ask the transport to reconnect.
    #[serde(serialize_with = "serialize_channels")]
    pub reconnect: Vec<ChannelId>,
}

impl LivenessReport {
    /// One-line operator summary.
    pub fn status_line(&self) -> String {
        let state = if self.alive {
            "robot ready"
        } else {
            "connection lost"
        };
        let distance = match self.telemetry.distance_cm {
            Some(cm) => format!("{cm:.0}cm"),
            None => "ERROR".to_string(),
        };
        let voltage = match self.telemetry.voltage {
            Some(v) => format!("{v:.2}V"),
            None => "-".to_string(),
        };
        let mut line = format!(
            "{state} | distance: {distance} | power: {voltage} | A: {} | B: {}",
            self.channel_a.as_str(),
            self.channel_b.as_str()
        );
        if self.low_battery {
            line.push_str(" | LOW BATTERY");
        }
        if self.obstacle_near {
            line.push_str(" | OBSTACLE");
        }
        line
    }
}

fn serialize_channels<S: Serializer>(channels: &[ChannelId], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(channels.iter().map(|c| c.name()))
}

/// Consumes transport events and decides liveness and reconnects.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    state: LivenessState,
    thresholds: TelemetryConfig,
    distance_cm: Option<f64>,
    voltage: Option<f64>,
    channels: [ChannelStatus; 2],
    last_fault: [Option<ChannelFault>; 2],
}

impl LivenessMonitor {
    pub fn new(alive_after: Duration, thresholds: TelemetryConfig) -> Self {
        Self {
            state: LivenessState::new(alive_after),
            thresholds,
            distance_cm: None,
            voltage: None,
            channels: [ChannelStatus::Pending; 2],
            last_fault: [None; 2],
        }
    }

    /// Fold one event into the view.
    pub fn observe(&mut self, event: &TransportEvent, now: Instant) {
        match event {
            TransportEvent::Record { record, .. } => match record.name() {
                names::PING => self.state.record_ping(now),
                names::IR => match record.value().trim().parse::<f64>() {
                    Ok(cm) if cm.is_finite() => self.distance_cm = Some(cm),
                    _ => debug!(value = record.value(), "ignoring unparsable distance"),
                },
                names::POWER => match record.value().trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => self.voltage = Some(v),
                    _ => debug!(value = record.value(), "ignoring unparsable voltage"),
                },
                other => debug!(name = other, "ignoring record"),
            },
            TransportEvent::ChannelUp { channel } => {
                self.channels[channel.index()] = ChannelStatus::Up;
                self.last_fault[channel.index()] = None;
            }
            TransportEvent::ChannelDown { channel, fault } => {
                self.channels[channel.index()] = ChannelStatus::Down;
                self.last_fault[channel.index()] = Some(*fault);
            }
        }
    }

    pub fn observe_all<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a TransportEvent>,
        now: Instant,
    ) {
        for event in events {
            self.observe(event, now);
        }
    }

    pub fn evaluate(&self, now: Instant) -> LivenessReport {
        let alive = self.state.is_alive(now);
        let telemetry = TelemetrySnapshot {
            distance_cm: if alive { self.distance_cm } else { None },
            voltage: self.voltage,
            stale: !alive,
        };

        let mut reconnect: Vec<ChannelId> = ChannelId::ALL
            .into_iter()
            .filter(|c| self.channels[c.index()] == ChannelStatus::Down)
            .collect();
        if !alive && !reconnect.contains(&ChannelId::B) {
            reconnect.push(ChannelId::B);
        }

        LivenessReport {
            alive,
            low_battery: telemetry
                .voltage
                .is_some_and(|v| v < self.thresholds.low_battery_volts),
            obstacle_near: telemetry
                .distance_cm
                .is_some_and(|cm| cm < self.thresholds.obstacle_distance_cm),
            telemetry,
            channel_a: self.channels[ChannelId::A.index()],
            channel_b: self.channels[ChannelId::B.index()],
            reconnect,
        }
    }

    pub fn state(&self) -> &LivenessState {
        &self.state
    }

    pub fn channel_status(&self, channel: ChannelId) -> ChannelStatus {
        self.channels[channel.index()]
    }

    /// Why `channel` last went down, if it is down.
    pub fn last_fault(&self, channel: ChannelId) -> Option<ChannelFault> {
        self.last_fault[channel.index()]
    }
}
