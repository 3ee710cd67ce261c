use roverlink_wire::WireError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint host name could not be resolved.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// The peer closed the connection (zero-length read or write).
    #[error("peer closed the connection")]
    PeerClosed,

    /// A write went out only partially; the stream is no longer in sync.
    #[error("partial write ({written} of {expected} bytes)")]
    PartialWrite { written: usize, expected: usize },

    /// The operation needs a connected channel.
    #[error("channel is not connected")]
    NotConnected,

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record-level error.
    #[error("record error: {0}")]
    Wire(#[from] WireError),

    /// The configuration cannot drive a transport.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
