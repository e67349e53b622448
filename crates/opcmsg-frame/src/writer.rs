use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use opcmsg_codec::{Message, HEADER_SIZE};

use crate::error::{FrameError, Result};
use crate::framer::{hex, FrameConfig};

/// Writes serialized messages to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Serialize and write a complete message (blocking).
    pub fn write_message(&mut self, message: &Message) -> Result<()> {
        let bytes = message.serialize()?;
        tracing::trace!(
            message_type = %message.message_type(),
            correlation_id = message.correlation_id(),
            len = bytes.len(),
            "write message"
        );
        self.write_frame_bytes(&bytes)
    }

    /// Write an already serialized frame.
    pub fn write_frame_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let body = bytes.len().saturating_sub(HEADER_SIZE);
        if body > self.config.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body,
                max: self.config.max_body_size,
            });
        }
        tracing::trace!(len = bytes.len(), bytes = %hex(bytes), "write");

        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
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
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
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

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<TcpStream> {
    /// Create a frame writer for a TCP stream and apply the write timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use opcmsg_codec::{CodecError, ParamId, ParamValue, Status, StatusResponse};

    use super::*;
    use crate::reader::FrameReader;

    fn response() -> Message {
        Message::WriteResponse(StatusResponse::new(3, Status::Success))
    }

    #[test]
    fn write_then_read_back() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_message(&response()).unwrap();
        writer
            .write_message(&Message::read(4, ParamId::numeric(0, 1)))
            .unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = FrameReader::new(Cursor::new(wire));
        assert_eq!(reader.read_message().unwrap(), response());
        assert_eq!(reader.read_frame().unwrap().header.correlation_id, 4);
    }

    #[test]
    fn body_too_large_rejected() {
        let cfg = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let message = Message::write(1, ParamId::numeric(0, 1), ParamValue::from("oversized"));
        let err = writer.write_message(&message).unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn unencodable_message_is_a_codec_error() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let message = Message::write(1, ParamId::numeric(0, 1), ParamValue::from("\u{4E2D}"));
        let err = writer.write_message(&message).unwrap_err();
        assert!(matches!(err, FrameError::Codec(CodecError::Unrepresentable(_))));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);
        writer.write_message(&response()).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        for kind in [ErrorKind::Interrupted, ErrorKind::WouldBlock] {
            let mut writer = FrameWriter::new(FailOnceWriter {
                kind,
                failed_write: false,
                failed_flush: false,
                data: Vec::new(),
            });
            writer.write_message(&response()).unwrap();
            assert_eq!(writer.into_inner().data.len(), 12);
        }
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.write_message(&response()).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailOnceWriter {
        kind: ErrorKind,
        failed_write: bool,
        failed_flush: bool,
        data: Vec<u8>,
    }

    impl Write for FailOnceWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.failed_write {
                self.failed_write = true;
                return Err(std::io::Error::from(self.kind));
            }
            // Short writes exercise the offset loop.
            let n = buf.len().min(5);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.failed_flush {
                self.failed_flush = true;
                return Err(std::io::Error::from(self.kind));
            }
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
}
