use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::BytesMut;
use tracing::debug;

use crate::channel::Destination;
use crate::codec::{decode_record, Delimiter, RecordConfig};
use crate::error::{Result, WireError};
use crate::record::CommandRecord;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Incremental record decoder for a single stream.
///
/// Bytes are appended as they arrive; complete records are handed out in
/// arrival order and a trailing partial record stays buffered. When the buffer
/// grows past `max_record_len` without a delimiter, the bytes are dropped and
/// the decoder skips everything up to the next delimiter.
#[derive(Debug)]
pub struct RecordDecoder {
    buf: BytesMut,
    config: RecordConfig,
    destination: Destination,
    discarding: bool,
}

impl RecordDecoder {
    /// Decoder with default limits; decoded records are tagged `destination`.
    pub fn new(delimiter: Delimiter, destination: Destination) -> Self {
        Self::with_config(
            RecordConfig {
                delimiter,
                ..RecordConfig::default()
            },
            destination,
        )
    }

    pub fn with_config(config: RecordConfig, destination: Destination) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            destination,
            discarding: false,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete record, `Ok(None)` if more bytes are needed.
    ///
    /// Errors are per record: the offending bytes are already consumed and the
    /// next call continues with the rest of the buffer.
    pub fn next_record(&mut self) -> Result<Option<CommandRecord>> {
        let delimiter = self.config.delimiter.as_byte();

        if self.discarding {
            match self.buf.iter().position(|&b| b == delimiter) {
                Some(pos) => {
                    let _ = self.buf.split_to(pos + 1);
                    self.discarding = false;
                    debug!(skipped = pos, "resynchronised after oversized record");
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        match decode_record(&mut self.buf, self.config.delimiter, self.destination)? {
            Some(record) if record.wire_len() > self.config.max_record_len => {
                Err(WireError::RecordTooLong {
                    size: record.wire_len(),
                    max: self.config.max_record_len,
                })
            }
            Some(record) => Ok(Some(record)),
            None if self.buf.len() > self.config.max_record_len => {
                let size = self.buf.len();
                self.buf.clear();
                self.discarding = true;
                Err(WireError::RecordTooLong {
                    size,
                    max: self.config.max_record_len,
                })
            }
            None => Ok(None),
        }
    }

    /// Drain every complete record, collecting per-record errors separately.
    pub fn drain(&mut self) -> (Vec<CommandRecord>, Vec<WireError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        loop {
            match self.next_record() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(err) => errors.push(err),
            }
        }
        (records, errors)
    }

    /// Bytes held back waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget buffered bytes, e.g. after the stream was replaced.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }
}

/// Reads complete records from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete records.
pub struct RecordReader<T> {
    inner: T,
    decoder: RecordDecoder,
}

impl<T: Read> RecordReader<T> {
    /// Create a new record reader with default configuration.
    pub fn new(inner: T, destination: Destination) -> Self {
        Self::with_config(inner, RecordConfig::default(), destination)
    }

    /// Create a new record reader with explicit configuration.
    pub fn with_config(inner: T, config: RecordConfig, destination: Destination) -> Self {
        Self {
            inner,
            decoder: RecordDecoder::with_config(config, destination),
        }
    }

    /// Read the next complete record (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached. A read
    /// timeout surfaces as `WireError::Io` with `WouldBlock` or `TimedOut`.
    pub fn read_record(&mut self) -> Result<CommandRecord> {
        loop {
            if let Some(record) = self.decoder.next_record()? {
                return Ok(record);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.decoder.extend(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl RecordReader<TcpStream> {
    /// Create a record reader for a TCP stream and apply the read timeout from config.
    pub fn with_config_tcp(
        inner: TcpStream,
        config: RecordConfig,
        destination: Destination,
    ) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config, destination))
    }
}

/// Returns true for the I/O error kinds a read timeout produces.
pub fn is_timeout(err: &WireError) -> bool {
    matches!(err, WireError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn decoder() -> RecordDecoder {
        RecordDecoder::new(Delimiter::Semicolon, Destination::ChannelB)
    }

    #[test]
    fn decoder_holds_partial_record_across_reads() {
        let mut dec = decoder();
        dec.extend(b"ping:ok;ir:4");
        let first = dec.next_record().unwrap().unwrap();
        assert_eq!(first.to_string(), "ping:ok");
        assert!(dec.next_record().unwrap().is_none());
        assert_eq!(dec.buffered(), 4);

        dec.extend(b"2;");
        let second = dec.next_record().unwrap().unwrap();
        assert_eq!(second.to_string(), "ir:42");
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn decoder_keeps_split_utf8_intact() {
        let mut dec = decoder();
        let bytes = "speak:héllo;".as_bytes();
        dec.extend(&bytes[..8]);
        assert!(dec.next_record().unwrap().is_none());
        dec.extend(&bytes[8..]);
        let record = dec.next_record().unwrap().unwrap();
        assert_eq!(record.value(), "héllo");
    }

    #[test]
    fn decoder_drain_separates_errors() {
        let mut dec = decoder();
        dec.extend(b"ping:ok;junk;ir:42;");
        let (records, errors) = dec.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].to_string(), "ping:ok");
        assert_eq!(records[1].to_string(), "ir:42");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], WireError::Malformed { .. }));
    }

    #[test]
    fn oversized_record_is_skipped_to_next_delimiter() {
        let config = RecordConfig {
            max_record_len: 8,
            ..RecordConfig::default()
        };
        let mut dec = RecordDecoder::with_config(config, Destination::Any);

        dec.extend(b"speak:aaaaaaaa");
        let err = dec.next_record().unwrap_err();
        assert!(matches!(err, WireError::RecordTooLong { size: 14, max: 8 }));
        assert_eq!(dec.buffered(), 0);

        dec.extend(b"aaaa;ir:1;");
        let record = dec.next_record().unwrap().unwrap();
        assert_eq!(record.to_string(), "ir:1");
    }

    #[test]
    fn oversized_complete_record_is_rejected() {
        let config = RecordConfig {
            max_record_len: 4,
            ..RecordConfig::default()
        };
        let mut dec = RecordDecoder::with_config(config, Destination::Any);
        dec.extend(b"speak:hello;ir:1;");
        assert!(matches!(
            dec.next_record(),
            Err(WireError::RecordTooLong { .. })
        ));
        assert_eq!(dec.next_record().unwrap().unwrap().to_string(), "ir:1");
    }

    #[test]
    fn clear_resets_state() {
        let mut dec = decoder();
        dec.extend(b"partial");
        dec.clear();
        assert_eq!(dec.buffered(), 0);
        dec.extend(b"ir:3;");
        assert_eq!(dec.next_record().unwrap().unwrap().value(), "3");
    }

    #[test]
    fn read_multiple_records() {
        let mut reader = RecordReader::new(Cursor::new(b"led:red;arm:-0.5;".to_vec()), Destination::ChannelA);

        let first = reader.read_record().unwrap();
        let second = reader.read_record().unwrap();

        assert_eq!(first.to_string(), "led:red");
        assert_eq!(first.destination(), Destination::ChannelA);
        assert_eq!(second.to_string(), "arm:-0.5");
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: b"gear:9;".to_vec(),
            pos: 0,
        };
        let mut reader = RecordReader::new(byte_reader, Destination::Any);

        let record = reader.read_record().unwrap();
        assert_eq!(record.to_string(), "gear:9");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = RecordReader::new(Cursor::new(Vec::<u8>::new()), Destination::Any);
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_record() {
        let mut reader = RecordReader::new(Cursor::new(b"speak:hel".to_vec()), Destination::Any);
        let err = reader.read_record().unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn malformed_record_then_valid_record() {
        let mut reader = RecordReader::new(Cursor::new(b"nope;ir:5;".to_vec()), Destination::Any);
        assert!(matches!(
            reader.read_record(),
            Err(WireError::Malformed { .. })
        ));
        assert_eq!(reader.read_record().unwrap().to_string(), "ir:5");
    }

    #[test]
    fn read_would_block_is_a_timeout() {
        let mut reader = RecordReader::new(WouldBlockReader, Destination::Any);
        let err = reader.read_record().unwrap_err();
        assert!(is_timeout(&err));
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let config = RecordConfig {
                read_timeout: Some(std::time::Duration::from_secs(5)),
                ..RecordConfig::default()
            };
            let mut reader =
                RecordReader::with_config_tcp(stream, config, Destination::ChannelB).unwrap();
            reader.read_record().unwrap()
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = crate::writer::RecordWriter::new(stream, Delimiter::Semicolon);
        let record = CommandRecord::new("drive", "50,-50", Destination::ChannelB).unwrap();
        writer.send(&record).unwrap();

        let received = server.join().unwrap();
        assert_eq!(received, record);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
