use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use roverlink_wire::{CommandRecord, Destination};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::queue::{Outbox, SendPolicy};

/// Margin between the ping period and the liveness threshold.
pub const HEARTBEAT_MARGIN: Duration = Duration::from_secs(1);

/// Background producer of `ping:ping` records on channel B.
///
/// The emitter only enqueues; it never touches a socket. The first ping goes
/// out one interval after [`HeartbeatEmitter::start`].
#[derive(Debug)]
pub struct HeartbeatEmitter {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<u64>>,
    interval: Duration,
}

impl HeartbeatEmitter {
    /// Ping period for a liveness threshold of `alive_after`.
    pub fn interval_for(alive_after: Duration) -> Result<Duration> {
        let interval = alive_after.saturating_sub(HEARTBEAT_MARGIN);
        if interval.is_zero() {
            return Err(TransportError::InvalidConfig(format!(
                "alive_after must exceed {}s, got {:?}",
                HEARTBEAT_MARGIN.as_secs(),
                alive_after
            )));
        }
        Ok(interval)
    }

    pub fn start(outbox: &Outbox, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(TransportError::InvalidConfig(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }

        let mut outbox = outbox.with_policy(SendPolicy::Always);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("roverlink-heartbeat".to_string())
            .spawn(move || {
                let mut sent = 0u64;
                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            outbox.send(CommandRecord::ping(Destination::ChannelB));
                            sent += 1;
                            debug!(sent, "heartbeat ping enqueued");
                            deadline += interval;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                sent
            })
            .map_err(|source| TransportError::Spawn {
                name: "heartbeat",
                source,
            })?;

        info!(interval_ms = interval.as_millis() as u64, "heartbeat started");
        Ok(Self {
            stop_tx,
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the thread and return how many pings it enqueued.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
