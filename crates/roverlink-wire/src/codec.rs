use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};

use crate::channel::Destination;
use crate::error::{Result, WireError};
use crate::record::CommandRecord;

/// Key/value separator inside a record.
pub const SEPARATOR: char = ':';

/// Default upper bound for a single buffered record, delimiter excluded.
pub const DEFAULT_MAX_RECORD_LEN: usize = 4 * 1024;

/// Record terminator.
///
/// `;` is canonical. `|` belongs to an earlier protocol revision and is only
/// used when selected explicitly; a codec never accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Semicolon,
    Pipe,
}

impl Delimiter {
    pub const fn as_char(self) -> char {
        match self {
            Delimiter::Semicolon => ';',
            Delimiter::Pipe => '|',
        }
    }

    pub const fn as_byte(self) -> u8 {
        self.as_char() as u8
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Semicolon => f.write_str("semicolon"),
            Delimiter::Pipe => f.write_str("pipe"),
        }
    }
}

impl FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            ";" | "semicolon" => Ok(Delimiter::Semicolon),
            "|" | "pipe" => Ok(Delimiter::Pipe),
            other => Err(format!(
                "unknown delimiter {other:?} (expected \"semicolon\" or \"pipe\")"
            )),
        }
    }
}

/// Codec settings shared by the record reader, writer and decoder.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Record terminator on this stream.
    pub delimiter: Delimiter,
    /// Longest record accepted while waiting for a delimiter.
    pub max_record_len: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Semicolon,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Encode one record followed by the delimiter.
///
/// Wire format:
/// ```text
/// name ':' value delimiter
/// ```
pub fn encode_record(record: &CommandRecord, delimiter: Delimiter, dst: &mut BytesMut) {
    dst.reserve(record.wire_len() + 1);
    dst.put_slice(record.name().as_bytes());
    dst.put_u8(SEPARATOR as u8);
    dst.put_slice(record.value().as_bytes());
    dst.put_u8(delimiter.as_byte());
}

/// Encode a batch of records into a freshly allocated buffer.
pub fn encode_records<'a>(
    records: impl IntoIterator<Item = &'a CommandRecord>,
    delimiter: Delimiter,
) -> BytesMut {
    let mut dst = BytesMut::new();
    for record in records {
        encode_record(record, delimiter, &mut dst);
    }
    dst
}

/// Parse one delimiter-free chunk into a record.
///
/// The chunk must contain exactly one separator and a non-empty name.
pub fn parse_record(chunk: &[u8], destination: Destination) -> Result<CommandRecord> {
    let text = std::str::from_utf8(chunk).map_err(|_| WireError::Malformed {
        raw: String::from_utf8_lossy(chunk).into_owned(),
        reason: "not valid UTF-8",
    })?;

    let Some((name, value)) = text.split_once(SEPARATOR) else {
        return Err(WireError::Malformed {
            raw: text.to_string(),
            reason: "missing key/value separator",
        });
    };

    CommandRecord::new(name, value, destination).map_err(|err| match err {
        WireError::EmptyName => WireError::Malformed {
            raw: text.to_string(),
            reason: "empty name",
        },
        WireError::ReservedCharacter { .. } => WireError::Malformed {
            raw: text.to_string(),
            reason: "reserved character in name or value",
        },
        other => other,
    })
}

/// Decode the next record from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a delimiter yet. Empty
/// chunks between consecutive delimiters are skipped. A malformed chunk is
/// consumed before its error is returned, so callers can keep decoding.
pub fn decode_record(
    src: &mut BytesMut,
    delimiter: Delimiter,
    destination: Destination,
) -> Result<Option<CommandRecord>> {
    loop {
        let Some(pos) = src.iter().position(|&b| b == delimiter.as_byte()) else {
            return Ok(None); // Need more data
        };

        let chunk = src.split_to(pos);
        src.advance(1);

        if chunk.is_empty() {
            continue;
        }

        return parse_record(&chunk, destination).map(Some);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, value: &str) -> CommandRecord {
        CommandRecord::new(name, value, Destination::Any).unwrap()
    }

    #[test]
    fn encode_single_record() {
        let mut buf = BytesMut::new();
        encode_record(&rec("led", "green"), Delimiter::Semicolon, &mut buf);
        assert_eq!(buf.as_ref(), b"led:green;");
    }

    #[test]
    fn encode_with_legacy_pipe() {
        let buf = encode_records(
            [&rec("motorA", "10"), &rec("motorB", "-10")],
            Delimiter::Pipe,
        );
        assert_eq!(buf.as_ref(), b"motorA:10|motorB:-10|");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let records = [
            rec("speak", "Hello. I am robot."),
            rec("xy", "-2.5,7.0"),
            rec("arm_close", ""),
            rec("gear", "9"),
        ];
        let mut buf = encode_records(&records, Delimiter::Semicolon);

        for expected in &records {
            let got = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any)
                .unwrap()
                .unwrap();
            assert_eq!(&got, expected);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_two_records_in_order() {
        let mut buf = BytesMut::from(&b"ping:ok;ir:42;"[..]);

        let first = decode_record(&mut buf, Delimiter::Semicolon, Destination::ChannelB)
            .unwrap()
            .unwrap();
        let second = decode_record(&mut buf, Delimiter::Semicolon, Destination::ChannelB)
            .unwrap()
            .unwrap();

        assert_eq!((first.name(), first.value()), ("ping", "ok"));
        assert_eq!((second.name(), second.value()), ("ir", "42"));
        assert_eq!(second.destination(), Destination::ChannelB);
        assert!(decode_record(&mut buf, Delimiter::Semicolon, Destination::ChannelB)
            .unwrap()
            .is_none());
    }

    #[test]
    fn decode_pipe_delimited_stream() {
        let mut buf = BytesMut::from(&b"speak:hi|gear:3|"[..]);
        let first = decode_record(&mut buf, Delimiter::Pipe, Destination::Any)
            .unwrap()
            .unwrap();
        let second = decode_record(&mut buf, Delimiter::Pipe, Destination::Any)
            .unwrap()
            .unwrap();
        assert_eq!(first.to_string(), "speak:hi");
        assert_eq!(second.to_string(), "gear:3");
    }

    #[test]
    fn semicolon_codec_does_not_split_on_pipe() {
        let mut buf = BytesMut::from(&b"speak:hi|gear:3;"[..]);
        let err = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any).unwrap_err();
        assert!(matches!(err, WireError::Malformed { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn pipe_codec_does_not_split_on_semicolon() {
        let mut buf = BytesMut::from(&b"ping:ok;ir:42;"[..]);
        assert!(decode_record(&mut buf, Delimiter::Pipe, Destination::Any)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), 14);
    }

    #[test]
    fn decode_incomplete_record() {
        let mut buf = BytesMut::from(&b"ir:4"[..]);
        let result = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.as_ref(), b"ir:4");
    }

    #[test]
    fn decode_skips_empty_chunks() {
        let mut buf = BytesMut::from(&b";;power:7.4;"[..]);
        let record = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any)
            .unwrap()
            .unwrap();
        assert_eq!(record.to_string(), "power:7.4");
    }

    #[test]
    fn malformed_chunk_is_consumed() {
        let mut buf = BytesMut::from(&b"garbage;ir:42;"[..]);
        let err = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any).unwrap_err();
        assert!(matches!(
            err,
            WireError::Malformed {
                reason: "missing key/value separator",
                ..
            }
        ));

        let next = decode_record(&mut buf, Delimiter::Semicolon, Destination::Any)
            .unwrap()
            .unwrap();
        assert_eq!(next.to_string(), "ir:42");
    }

    #[test]
    fn extra_separator_is_malformed() {
        let result = parse_record(b"a:b:c", Destination::Any);
        assert!(matches!(result, Err(WireError::Malformed { .. })));
    }

    #[test]
    fn empty_name_is_malformed() {
        let result = parse_record(b":value", Destination::Any);
        assert!(matches!(
            result,
            Err(WireError::Malformed {
                reason: "empty name",
                ..
            })
        ));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let result = parse_record(&[b'i', b'r', b':', 0xFF], Destination::Any);
        assert!(matches!(
            result,
            Err(WireError::Malformed {
                reason: "not valid UTF-8",
                ..
            })
        ));
    }

    #[test]
    fn delimiter_from_str() {
        assert_eq!(";".parse::<Delimiter>().unwrap(), Delimiter::Semicolon);
        assert_eq!("semicolon".parse::<Delimiter>().unwrap(), Delimiter::Semicolon);
        assert_eq!("|".parse::<Delimiter>().unwrap(), Delimiter::Pipe);
        assert_eq!("pipe".parse::<Delimiter>().unwrap(), Delimiter::Pipe);
        assert!("comma".parse::<Delimiter>().is_err());
    }
}
