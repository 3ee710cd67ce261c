/// Errors a hardware driver reports back to the executor.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The device is missing or was already shut down.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// A requested setting is outside what the device accepts.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: f64 },

    /// The device reported a failure.
    #[error("device error: {0}")]
    Device(String),
}

/// Errors that can occur in station and executor operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] roverlink_transport::TransportError),

    /// Record-level error.
    #[error("record error: {0}")]
    Wire(#[from] roverlink_wire::WireError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] roverlink_config::ConfigError),

    /// A record names a known command with an unusable value.
    #[error("invalid {name} command {value:?}: {reason}")]
    InvalidCommand {
        name: String,
        value: String,
        reason: String,
    },

    /// The hardware driver rejected a command.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// An input line could not be turned into a record.
    #[error("invalid input line {line:?}: {reason}")]
    InvalidInput { line: String, reason: String },

    /// A listening endpoint could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error outside the transport worker.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PeerError>;
