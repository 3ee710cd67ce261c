use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::codec::{encode_record, Delimiter, RecordConfig};
use crate::error::{Result, WireError};
use crate::record::CommandRecord;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete records to any blocking `Write` stream.
pub struct RecordWriter<T> {
    inner: T,
    buf: BytesMut,
    config: RecordConfig,
}

impl<T: Write> RecordWriter<T> {
    /// Create a new record writer using `delimiter`.
    pub fn new(inner: T, delimiter: Delimiter) -> Self {
        Self::with_config(
            inner,
            RecordConfig {
                delimiter,
                ..RecordConfig::default()
            },
        )
    }

    /// Create a new record writer with explicit configuration.
    pub fn with_config(inner: T, config: RecordConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one record (blocking).
    pub fn send(&mut self, record: &CommandRecord) -> Result<()> {
        if record.wire_len() > self.config.max_record_len {
            return Err(WireError::RecordTooLong {
                size: record.wire_len(),
                max: self.config.max_record_len,
            });
        }

        self.buf.clear();
        encode_record(record, self.config.delimiter, &mut self.buf);
        self.write_buffer()
    }

    /// Encode several records and write them with one buffer.
    pub fn send_all<'a>(&mut self, records: impl IntoIterator<Item = &'a CommandRecord>) -> Result<()> {
        self.buf.clear();
        for record in records {
            if record.wire_len() > self.config.max_record_len {
                return Err(WireError::RecordTooLong {
                    size: record.wire_len(),
                    max: self.config.max_record_len,
                });
            }
            encode_record(record, self.config.delimiter, &mut self.buf);
        }
        self.write_buffer()
    }

    fn write_buffer(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &RecordConfig {
        &self.config
    }
}

impl RecordWriter<TcpStream> {
    /// Create a record writer for a TCP stream and apply the write timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: RecordConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::channel::Destination;

    fn rec(name: &str, value: &str) -> CommandRecord {
        CommandRecord::new(name, value, Destination::Any).unwrap()
    }

    #[test]
    fn write_single_record() {
        let mut writer = RecordWriter::new(Cursor::new(Vec::<u8>::new()), Delimiter::Semicolon);
        writer.send(&rec("led", "green")).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"led:green;");
    }

    #[test]
    fn write_multiple_records_with_pipe() {
        let mut writer = RecordWriter::new(Cursor::new(Vec::<u8>::new()), Delimiter::Pipe);
        writer
            .send_all([&rec("speak", "hi"), &rec("gear", "2")])
            .unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"speak:hi|gear:2|");
    }

    #[test]
    fn record_too_long_rejected() {
        let cfg = RecordConfig {
            max_record_len: 4,
            ..RecordConfig::default()
        };
        let mut writer = RecordWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(&rec("speak", "oversized")).unwrap_err();
        assert!(matches!(err, WireError::RecordTooLong { .. }));
    }

    #[test]
    fn short_writes_are_completed() {
        let sink = OneByteWriter::default();
        let mut writer = RecordWriter::new(sink, Delimiter::Semicolon);
        writer.send(&rec("ir", "42")).unwrap();
        assert_eq!(writer.get_ref().bytes, b"ir:42;");
    }

    #[test]
    fn zero_write_means_closed() {
        let mut writer = RecordWriter::new(ZeroWriter, Delimiter::Semicolon);
        let err = writer.send(&rec("ir", "42")).unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = RecordWriter::new(sink, Delimiter::Semicolon);

        writer.send(&rec("ping", "ping")).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[derive(Default)]
    struct OneByteWriter {
        bytes: Vec<u8>,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            self.bytes.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
