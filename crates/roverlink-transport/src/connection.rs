use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use roverlink_wire::{encode_record, ChannelId, CommandRecord, Delimiter};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Host and port of one robot endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to the first socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?;
        addrs.next().ok_or_else(|| TransportError::Resolve {
            endpoint: self.to_string(),
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses"),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle of a channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        }
    }
}

/// Result of a single write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The whole encoded record went out.
    Sent(usize),
    /// The socket buffer is full; nothing was written.
    WouldBlock,
}

/// One TCP stream to one robot endpoint.
///
/// Owns at most one live socket. Any fault on the stream closes it; the
/// connection then stays `Disconnected` until the owner calls
/// [`ChannelConnection::connect`] again.
pub struct ChannelConnection {
    channel: ChannelId,
    endpoint: Endpoint,
    state: ChannelState,
    stream: Option<TcpStream>,
    registration: Option<(Registry, Token)>,
    last_connect_attempt: Option<Instant>,
    connect_attempts: u64,
    write_ready: bool,
    encode_buf: BytesMut,
}

impl ChannelConnection {
    pub fn new(channel: ChannelId, endpoint: Endpoint) -> Self {
        Self {
            channel,
            endpoint,
            state: ChannelState::Disconnected,
            stream: None,
            registration: None,
            last_connect_attempt: None,
            connect_attempts: 0,
            write_ready: false,
            encode_buf: BytesMut::new(),
        }
    }

    /// Register every future stream with `registry` under `token`.
    pub fn with_registry(mut self, registry: Registry, token: Token) -> Self {
        self.registration = Some((registry, token));
        self
    }

    /// One blocking connection attempt with Nagle disabled.
    ///
    /// Any existing stream is closed first. The attempt time is recorded even
    /// when it fails.
    pub fn connect(&mut self, timeout: Duration, now: Instant) -> Result<()> {
        self.close();
        self.last_connect_attempt = Some(now);
        self.connect_attempts += 1;
        self.state = ChannelState::Connecting;

        let result = self.open(timeout);
        match result {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ChannelState::Connected;
                info!(channel = %self.channel, endpoint = %self.endpoint, "channel connected");
                Ok(())
            }
            Err(err) => {
                self.state = ChannelState::Disconnected;
                Err(err)
            }
        }
    }

    fn open(&self, timeout: Duration) -> Result<TcpStream> {
        let addr = self.endpoint.resolve()?;
        let connect_err = |source| TransportError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        };

        let stream = std::net::TcpStream::connect_timeout(&addr, timeout).map_err(connect_err)?;
        stream.set_nodelay(true).map_err(connect_err)?;
        stream.set_nonblocking(true).map_err(connect_err)?;

        let mut stream = TcpStream::from_std(stream);
        if let Some((registry, token)) = &self.registration {
            registry
                .register(&mut stream, *token, Interest::READABLE | Interest::WRITABLE)
                .map_err(connect_err)?;
        }
        Ok(stream)
    }

    /// Serialize `record` and write it with a single call.
    ///
    /// A short or zero-length write is a fault: the stream is closed and no
    /// partial-write recovery is attempted.
    pub fn send(&mut self, record: &CommandRecord, delimiter: Delimiter) -> Result<SendOutcome> {
        self.encode_buf.clear();
        encode_record(record, delimiter, &mut self.encode_buf);
        let expected = self.encode_buf.len();

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let result = loop {
            match stream.write(&self.encode_buf) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(n) if n == expected => Ok(SendOutcome::Sent(n)),
            Ok(0) => {
                self.close();
                Err(TransportError::PeerClosed)
            }
            Ok(written) => {
                self.close();
                Err(TransportError::PartialWrite { written, expected })
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                self.write_ready = false;
                Ok(SendOutcome::WouldBlock)
            }
            Err(err) => {
                self.close();
                Err(TransportError::Io(err))
            }
        }
    }

    /// Read up to `max_bytes`.
    ///
    /// `Ok(None)` means nothing is available right now. A zero-length read
    /// means the peer closed: the stream is released and `PeerClosed` returned.
    pub fn recv(&mut self, max_bytes: usize) -> Result<Option<Bytes>> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = vec![0u8; max_bytes.max(1)];

        let result = loop {
            match stream.read(&mut buf) {
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(0) => {
                debug!(channel = %self.channel, "peer closed channel");
                self.close();
                Err(TransportError::PeerClosed)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => {
                self.close();
                Err(TransportError::Io(err))
            }
        }
    }

    /// Release the socket. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Some((registry, _)) = &self.registration {
                let _ = registry.deregister(&mut stream);
            }
            let _ = stream.shutdown(std::net::Shutdown::Both);
            debug!(channel = %self.channel, "channel closed");
        }
        self.state = ChannelState::Disconnected;
        self.write_ready = false;
    }

    /// Record a writable readiness notification.
    pub fn mark_writable(&mut self) {
        if self.stream.is_some() {
            self.write_ready = true;
        }
    }

    /// True when connected and the last readiness said the socket accepts writes.
    pub fn is_write_ready(&self) -> bool {
        self.write_ready && self.is_connected()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn last_connect_attempt(&self) -> Option<Instant> {
        self.last_connect_attempt
    }

    /// Connection attempts made so far, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }
}

impl Drop for ChannelConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("channel", &self.channel)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}
