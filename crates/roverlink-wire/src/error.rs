/// Errors that can occur while building, encoding or decoding records.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A record name was empty.
    #[error("record name must not be empty")]
    EmptyName,

    /// A name or value contained a character reserved by the wire format.
    #[error("{field} contains reserved character {ch:?}")]
    ReservedCharacter { field: &'static str, ch: char },

    /// A chunk could not be parsed into a record.
    #[error("malformed record {raw:?}: {reason}")]
    Malformed { raw: String, reason: &'static str },

    /// No delimiter arrived before the buffered bytes exceeded the limit.
    #[error("record too long ({size} bytes, max {max})")]
    RecordTooLong { size: usize, max: usize },

    /// An I/O error occurred while reading or writing records.
    #[error("record I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted fewer bytes than the encoded record.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
