//! Delimited command records for the robot link.
//!
//! Every unit on the wire is a `name:value` record terminated by a single
//! delimiter (`;` canonically, `|` for the legacy protocol revision):
//! - Names are non-empty; names and values never contain `:`, `;` or `|`
//! - Routing (`Destination`) is metadata and is never serialized
//!
//! Decoding is incremental: partial records stay buffered until their
//! delimiter arrives, malformed chunks are reported and skipped.

pub mod channel;
pub mod codec;
pub mod error;
pub mod names;
pub mod reader;
pub mod record;
pub mod writer;

pub use channel::{ChannelId, Destination};
pub use codec::{
    decode_record, encode_record, encode_records, parse_record, Delimiter, RecordConfig,
    DEFAULT_MAX_RECORD_LEN, SEPARATOR,
};
pub use error::{Result, WireError};
pub use reader::{is_timeout, RecordDecoder, RecordReader};
pub use record::{CommandRecord, RESERVED};
pub use writer::RecordWriter;
