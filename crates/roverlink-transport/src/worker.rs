//! Background worker multiplexing both channels, and the handle that owns it.
//!
//! The worker is the only code that touches sockets. The application talks to
//! it through the outbound [`CommandQueue`], the inbound [`EventQueue`], a
//! control channel for reconnect requests and a stop flag.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use mio::{Events, Poll, Token, Waker};
use roverlink_wire::{ChannelId, CommandRecord, RecordDecoder};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::connection::{ChannelConnection, SendOutcome};
use crate::error::{Result, TransportError};
use crate::event::{ChannelFault, TransportEvent};
use crate::queue::{CommandQueue, EventQueue, Outbox, SendPolicy};
use crate::reconnect::ReconnectPolicy;

const WAKE_TOKEN: Token = Token(2);
const EVENT_CAPACITY: usize = 16;

fn channel_token(channel: ChannelId) -> Token {
    Token(channel.index())
}

/// Requests the application may send to a running worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Attempt a (re)connection if the cooldown allows it.
    Reconnect(ChannelId),
}

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub records_sent: u64,
    pub records_received: u64,
    pub malformed: u64,
    /// Outbound records longer than `max_record_len`, dropped unsent.
    pub oversized: u64,
    pub faults: u64,
    /// Outbound records still queued when the worker stopped.
    pub dropped_at_shutdown: u64,
}

/// Single-threaded readiness loop over channel A and channel B.
pub struct TransportWorker {
    config: TransportConfig,
    poll: Poll,
    events: Events,
    channels: [ChannelConnection; 2],
    decoders: [RecordDecoder; 2],
    policy: ReconnectPolicy,
    outbound: CommandQueue,
    inbound: EventQueue,
    control: Receiver<ControlRequest>,
    stop: Arc<AtomicBool>,
    stats: WorkerStats,
}

impl TransportWorker {
    /// Build a worker and the waker that interrupts its readiness wait.
    ///
    /// No connection is attempted until [`TransportWorker::connect_all`] or
    /// [`TransportWorker::run`].
    pub fn new(
        config: TransportConfig,
        outbound: CommandQueue,
        inbound: EventQueue,
        control: Receiver<ControlRequest>,
        stop: Arc<AtomicBool>,
    ) -> Result<(Self, Arc<Waker>)> {
        config.validate()?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        let connection = |channel: ChannelId| -> Result<ChannelConnection> {
            Ok(
                ChannelConnection::new(channel, config.endpoint(channel))
                    .with_registry(poll.registry().try_clone()?, channel_token(channel)),
            )
        };
        let channels = [connection(ChannelId::A)?, connection(ChannelId::B)?];
        let decoders = ChannelId::ALL
            .map(|channel| RecordDecoder::with_config(config.record_config(), channel.into()));

        let worker = Self {
            policy: ReconnectPolicy::new(config.reconnect_cooldown),
            config,
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            channels,
            decoders,
            outbound,
            inbound,
            control,
            stop,
            stats: WorkerStats::default(),
        };
        Ok((worker, waker))
    }

    /// Connect both channels, then loop until the stop flag is raised.
    pub fn run(mut self) -> WorkerStats {
        info!(
            host = %self.config.host,
            port_a = self.config.port_a,
            port_b = self.config.port_b,
            "transport worker started"
        );
        self.connect_all(Instant::now());

        while !self.stop.load(Ordering::Acquire) {
            if let Err(err) = self.cycle() {
                warn!(error = %err, "readiness wait failed; stopping transport worker");
                self.fail_connected(&err);
                break;
            }
        }

        self.shutdown();
        self.stats
    }

    /// Initial connection attempt on every channel.
    pub fn connect_all(&mut self, now: Instant) {
        for channel in ChannelId::ALL {
            self.connect_channel(channel, now);
        }
    }

    /// One pass: control requests, readiness wait, reads, writes.
    pub fn cycle(&mut self) -> Result<()> {
        self.apply_control(Instant::now());

        let timeout = if self.has_ready_write() {
            Duration::ZERO
        } else {
            self.config.poll_interval
        };
        if let Err(err) = self.poll.poll(&mut self.events, Some(timeout)) {
            if err.kind() != ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        let mut readable = [false; 2];
        for event in self.events.iter() {
            let Some(channel) = ChannelId::from_index(event.token().0) else {
                continue;
            };
            if event.is_readable() || event.is_read_closed() || event.is_error() {
                readable[channel.index()] = true;
            }
            if event.is_writable() {
                self.channels[channel.index()].mark_writable();
            }
        }

        if self.stop.load(Ordering::Acquire) {
            return Ok(());
        }

        for channel in ChannelId::ALL {
            if readable[channel.index()] {
                self.service_read(channel);
            }
        }
        for channel in ChannelId::ALL {
            self.service_write(channel);
        }
        Ok(())
    }

    /// Reconnect `channel` if the cooldown allows it. Returns true if an
    /// attempt was made.
    pub fn request_reconnect(&mut self, channel: ChannelId, now: Instant) -> bool {
        let conn = &self.channels[channel.index()];
        let last = conn.last_connect_attempt();
        if !self.policy.permits(last, now) {
            debug!(
                channel = %channel,
                remaining_ms = self.policy.remaining(last, now).as_millis() as u64,
                "reconnect request inside cooldown ignored"
            );
            return false;
        }
        if conn.is_connected() {
            info!(channel = %channel, "closing connected channel for reconnect");
        }
        self.connect_channel(channel, now);
        true
    }

    /// Close everything and discard the outbound backlog.
    pub fn shutdown(&mut self) {
        for conn in &mut self.channels {
            conn.close();
        }
        for decoder in &mut self.decoders {
            decoder.clear();
        }

        let dropped = self.outbound.clear();
        self.stats.dropped_at_shutdown += dropped as u64;
        if dropped > 0 {
            warn!(dropped, "discarded unsent outbound records at shutdown");
        }
        info!(
            sent = self.stats.records_sent,
            received = self.stats.records_received,
            faults = self.stats.faults,
            "transport worker stopped"
        );
    }

    pub fn connection(&self, channel: ChannelId) -> &ChannelConnection {
        &self.channels[channel.index()]
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    fn apply_control(&mut self, now: Instant) {
        loop {
            match self.control.try_recv() {
                Ok(ControlRequest::Reconnect(channel)) => {
                    self.request_reconnect(channel, now);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn connect_channel(&mut self, channel: ChannelId, now: Instant) {
        let idx = channel.index();
        self.decoders[idx].clear();
        match self.channels[idx].connect(self.config.connect_timeout, now) {
            Ok(()) => {
                self.inbound.push(TransportEvent::ChannelUp { channel });
            }
            Err(err) => self.report_fault(channel, ChannelFault::ConnectFailed, &err),
        }
    }

    fn has_ready_write(&self) -> bool {
        ChannelId::ALL.into_iter().any(|channel| {
            self.channels[channel.index()].is_write_ready() && self.outbound.has_pending_for(channel)
        })
    }

    fn service_read(&mut self, channel: ChannelId) {
        let idx = channel.index();
        while self.channels[idx].is_connected() {
            match self.channels[idx].recv(self.config.read_chunk) {
                Ok(Some(bytes)) => {
                    self.decoders[idx].extend(&bytes);
                    self.drain_decoder(channel);
                }
                Ok(None) => break,
                Err(err) => {
                    let fault = ChannelFault::from_read(&err);
                    self.fault(channel, fault, &err);
                }
            }
        }
    }

    fn drain_decoder(&mut self, channel: ChannelId) {
        loop {
            match self.decoders[channel.index()].next_record() {
                Ok(Some(record)) => {
                    debug!(channel = %channel, record = %record, "record received");
                    self.stats.records_received += 1;
                    self.inbound.push(TransportEvent::Record { channel, record });
                }
                Ok(None) => break,
                Err(err) => {
                    self.stats.malformed += 1;
                    debug!(channel = %channel, error = %err, "dropped malformed record");
                }
            }
        }
    }

    fn service_write(&mut self, channel: ChannelId) {
        let idx = channel.index();
        if !self.channels[idx].is_write_ready() {
            return;
        }
        let Some(record) = self.next_sendable(channel) else {
            return;
        };

        match self.channels[idx].send(&record, self.config.delimiter) {
            Ok(SendOutcome::Sent(bytes)) => {
                self.stats.records_sent += 1;
                debug!(channel = %channel, record = %record, bytes, "record sent");
            }
            Ok(SendOutcome::WouldBlock) => {
                if let Some(dropped) = self.outbound.push_front(record) {
                    warn!(
                        channel = %channel,
                        record = %dropped,
                        "outbound queue refilled while blocked; dropped oldest record"
                    );
                }
            }
            Err(err) => {
                debug!(channel = %channel, record = %record, "record lost with channel");
                let fault = ChannelFault::from_write(&err);
                self.fault(channel, fault, &err);
            }
        }
    }

    /// Oldest record for `channel` the peer's decoder will accept. Longer
    /// records are dropped here instead of being written.
    fn next_sendable(&mut self, channel: ChannelId) -> Option<CommandRecord> {
        let max = self.config.max_record_len;
        loop {
            let record = self.outbound.pop_for(channel)?;
            if record.wire_len() <= max {
                return Some(record);
            }
            self.stats.oversized += 1;
            warn!(
                channel = %channel,
                name = record.name(),
                size = record.wire_len(),
                max,
                "outbound record too long; dropped"
            );
        }
    }

    /// Take down every connected channel after the worker loop failed.
    fn fail_connected(&mut self, err: &TransportError) {
        for channel in ChannelId::ALL {
            if self.channels[channel.index()].is_connected() {
                self.fault(channel, ChannelFault::PollFailed, err);
            }
        }
    }

    fn fault(&mut self, channel: ChannelId, fault: ChannelFault, err: &TransportError) {
        self.channels[channel.index()].close();
        self.decoders[channel.index()].clear();
        self.report_fault(channel, fault, err);
    }

    fn report_fault(&mut self, channel: ChannelId, fault: ChannelFault, err: &TransportError) {
        self.stats.faults += 1;
        warn!(channel = %channel, fault = fault.as_str(), error = %err, "channel down");
        self.inbound.push(TransportEvent::ChannelDown { channel, fault });
    }
}

/// Application-side handle to a running transport.
///
/// Dropping the handle stops the worker.
pub struct Transport {
    outbound: CommandQueue,
    inbound: EventQueue,
    control: Sender<ControlRequest>,
    stop: Arc<AtomicBool>,
    waker: Arc<Waker>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl Transport {
    /// Spawn the worker thread. Both channels are connected from that thread.
    pub fn start(config: &TransportConfig) -> Result<Self> {
        let outbound = CommandQueue::with_capacity(config.outbound_capacity);
        let inbound = EventQueue::unbounded();
        let (control, control_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));

        let (worker, waker) = TransportWorker::new(
            config.clone(),
            outbound.clone(),
            inbound.clone(),
            control_rx,
            Arc::clone(&stop),
        )?;

        let handle = std::thread::Builder::new()
            .name("roverlink-transport".to_string())
            .spawn(move || worker.run())
            .map_err(|source| TransportError::Spawn {
                name: "transport",
                source,
            })?;

        Ok(Self {
            outbound,
            inbound,
            control,
            stop,
            waker,
            handle: Some(handle),
        })
    }

    /// New producer handle on the outbound queue.
    pub fn outbox(&self, policy: SendPolicy) -> Outbox {
        Outbox::new(self.outbound.clone(), Some(Arc::clone(&self.waker)), policy)
    }

    /// Everything received since the last call, in arrival order.
    pub fn events(&self) -> Vec<TransportEvent> {
        self.inbound.drain()
    }

    pub fn inbound(&self) -> &EventQueue {
        &self.inbound
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Ask the worker to reconnect `channel`; ignored inside the cooldown.
    pub fn request_reconnect(&self, channel: ChannelId) {
        if self.control.send(ControlRequest::Reconnect(channel)).is_err() {
            warn!(channel = %channel, "transport worker gone; reconnect request dropped");
            return;
        }
        self.wake();
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(mut self) -> WorkerStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> WorkerStats {
        self.stop.store(true, Ordering::Release);
        self.wake();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("transport worker panicked");
                WorkerStats::default()
            }),
            None => WorkerStats::default(),
        }
    }

    fn wake(&self) {
        if let Err(err) = self.waker.wake() {
            warn!(error = %err, "failed to wake transport worker");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
