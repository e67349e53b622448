use std::io::{ErrorKind, Read};
use std::net::TcpStream;

use bytes::{Buf, BytesMut};
use opcmsg_codec::Message;

use crate::error::{FrameError, Result};
use crate::framer::{hex, Frame, FrameConfig, MessageFramer};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. A `WouldBlock` or `TimedOut` read is
/// returned as [`FrameError::Io`] without losing the partial frame, so the
/// next call resumes where the previous one stopped.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    framer: MessageFramer,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            framer: MessageFramer::new(config.max_body_size),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if !self.buf.is_empty() {
                let mut src = &self.buf[..];
                let outcome = self.framer.push(&mut src);
                let consumed = self.buf.len() - src.len();
                self.buf.advance(consumed);
                if let Some(outcome) = outcome {
                    return outcome;
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if !self.framer.is_idle() {
                    tracing::debug!("stream ended inside a frame");
                }
                return Err(FrameError::ConnectionClosed);
            }

            tracing::trace!(len = read, bytes = %hex(&chunk[..read]), "read");
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next frame and decode it.
    pub fn read_message(&mut self) -> Result<Message> {
        self.read_frame()?.decode()
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

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<TcpStream> {
    /// Create a frame reader for a TCP stream and apply the read timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use opcmsg_codec::{Message, ParamId, ParamValue};

    use super::*;

    fn wire_of(messages: &[Message]) -> Vec<u8> {
        messages
            .iter()
            .flat_map(|m| m.serialize().unwrap().to_vec())
            .collect()
    }

    fn read(id: u32) -> Message {
        Message::read(id, ParamId::string(2, "speed"))
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[read(1)])));
        assert_eq!(reader.read_message().unwrap(), read(1));
    }

    #[test]
    fn read_multiple_messages() {
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[read(1), read(2), read(3)])));
        for id in 1..=3 {
            assert_eq!(reader.read_frame().unwrap().header.correlation_id, id);
        }
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn read_large_body() {
        let message = Message::write(9, ParamId::numeric(0, 1), ParamValue::from("z".repeat(40_000)));
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[message.clone()])));
        assert_eq!(reader.read_message().unwrap(), message);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire_of(&[read(4)]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);
        assert_eq!(reader.read_message().unwrap(), read(4));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut wire = wire_of(&[read(1)]);
        wire.truncate(12);
        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn malformed_frame_then_good_frame() {
        let mut wire = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
        wire.extend(wire_of(&[read(8)]));
        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = reader.read_frame().unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(reader.read_message().unwrap(), read(8));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let cfg = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire_of(&[read(1)])), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { max: 4, .. }));
    }

    #[test]
    fn would_block_keeps_partial_frame() {
        let wire = wire_of(&[read(5)]);
        let reader = StallingReader {
            chunks: vec![wire[..7].to_vec(), wire[7..].to_vec()],
            stalled: false,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(&err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(framed.read_message().unwrap(), read(5));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire_of(&[read(6)])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_message().unwrap(), read(6));
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            let mut writer = crate::writer::FrameWriter::new(stream);
            writer.write_message(&read(11)).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_tcp(stream, cfg).unwrap();
        assert_eq!(reader.read_message().unwrap(), read(11));
        client.join().unwrap();
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

    /// Delivers the first chunk, stalls once with `WouldBlock`, then the rest.
    struct StallingReader {
        chunks: Vec<Vec<u8>>,
        stalled: bool,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.len() == 1 && !self.stalled {
                self.stalled = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
