use std::fmt;
use std::io;

use roverlink_config::ConfigError;
use roverlink_peer::PeerError;
use roverlink_transport::TransportError;
use roverlink_wire::WireError;

// Process exit codes; 64 follows sysexits EX_USAGE.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
/// The executor stopped on an `update` command; a supervisor should update
/// and relaunch it.
pub const UPDATE_REQUESTED: i32 = 10;
pub const PERMISSION_DENIED: i32 = 50;
pub const CONFIG_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidConfig(_) => CliError::new(CONFIG_INVALID, format!("{context}: {err}")),
        TransportError::Spawn { source, .. } => io_error(context, source),
        TransportError::Wire(err) => wire_error(context, err),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn wire_error(context: &str, err: WireError) -> CliError {
    match err {
        WireError::Io(source) => io_error(context, source),
        WireError::ConnectionClosed | WireError::ShortWrite { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        WireError::EmptyName
        | WireError::ReservedCharacter { .. }
        | WireError::Malformed { .. }
        | WireError::RecordTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {source}"))
        }
        other => CliError::new(CONFIG_INVALID, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Wire(err) => wire_error(context, err),
        PeerError::Config(err) => config_error(context, err),
        PeerError::Bind { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        PeerError::Io(source) => io_error(context, source),
        PeerError::InvalidInput { .. } | PeerError::InvalidCommand { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        PeerError::Driver(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
