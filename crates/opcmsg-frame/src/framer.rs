use std::fmt::Write as _;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use opcmsg_codec::{Message, MessageHeader, HEADER_SIZE};

use crate::error::{FrameError, Result};

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

/// One complete header + body unit as read off the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Frame {
    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Decode the body according to the header's message type.
    pub fn decode(&self) -> Result<Message> {
        Ok(Message::decode(&self.header, &self.body)?)
    }
}

/// Configuration for framed readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_body_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    AwaitingHeader,
    AwaitingBody(MessageHeader),
    /// Skipping the body of a rejected frame.
    Discarding(usize),
}

/// Reassembles frames from arbitrarily chunked input.
///
/// Bytes are copied into the header buffer until it holds [`HEADER_SIZE`]
/// bytes, then into the body buffer until it holds the announced body length.
/// A malformed header is reported and its body (when the length is usable)
/// skipped, so the next frame starts on a header boundary.
#[derive(Debug)]
pub struct MessageFramer {
    state: State,
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    body: BytesMut,
    max_body: usize,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY)
    }
}

impl MessageFramer {
    pub fn new(max_body: usize) -> Self {
        Self {
            state: State::AwaitingHeader,
            header: [0; HEADER_SIZE],
            header_filled: 0,
            body: BytesMut::new(),
            max_body,
        }
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitingHeader) && self.header_filled == 0
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.state = State::AwaitingHeader;
        self.header_filled = 0;
        self.body.clear();
    }

    /// Consume bytes from `src` until one frame completes or `src` runs dry.
    ///
    /// Returns `None` when more input is needed. Errors are per frame: the
    /// framer stays usable and unconsumed bytes remain in `src`.
    pub fn push(&mut self, src: &mut &[u8]) -> Option<Result<Frame>> {
        loop {
            match self.state {
                State::AwaitingHeader => {
                    let take = (HEADER_SIZE - self.header_filled).min(src.len());
                    self.header[self.header_filled..self.header_filled + take]
                        .copy_from_slice(&src[..take]);
                    self.header_filled += take;
                    *src = &src[take..];
                    if self.header_filled < HEADER_SIZE {
                        return None;
                    }
                    self.header_filled = 0;
                    if let Some(outcome) = self.on_header() {
                        return Some(outcome);
                    }
                }
                State::AwaitingBody(header) => {
                    if src.is_empty() {
                        return None;
                    }
                    let take = (header.body_len() - self.body.len()).min(src.len());
                    self.body.extend_from_slice(&src[..take]);
                    *src = &src[take..];
                    if self.body.len() < header.body_len() {
                        return None;
                    }
                    self.state = State::AwaitingHeader;
                    return Some(Ok(self.complete(header)));
                }
                State::Discarding(remaining) => {
                    if src.is_empty() {
                        return None;
                    }
                    let take = remaining.min(src.len());
                    *src = &src[take..];
                    self.state = match remaining - take {
                        0 => State::AwaitingHeader,
                        rest => State::Discarding(rest),
                    };
                }
            }
        }
    }

    /// Feed a whole chunk and collect every outcome it completes.
    pub fn push_all(&mut self, mut data: &[u8]) -> Vec<Result<Frame>> {
        let mut out = Vec::new();
        while let Some(outcome) = self.push(&mut data) {
            out.push(outcome);
        }
        out
    }

    fn on_header(&mut self) -> Option<Result<Frame>> {
        let length = u32::from_be_bytes([
            self.header[2],
            self.header[3],
            self.header[4],
            self.header[5],
        ]);
        if (length as usize) < HEADER_SIZE {
            return Some(Err(FrameError::InvalidLength(length)));
        }
        let body_len = length as usize - HEADER_SIZE;

        let skip = |state: &mut State| {
            if body_len > 0 {
                *state = State::Discarding(body_len);
            }
        };
        if body_len > self.max_body {
            skip(&mut self.state);
            return Some(Err(FrameError::BodyTooLarge {
                size: body_len,
                max: self.max_body,
            }));
        }
        let header = match MessageHeader::decode(&self.header) {
            Ok(header) => header,
            Err(err) => {
                skip(&mut self.state);
                return Some(Err(err.into()));
            }
        };

        if body_len == 0 {
            return Some(Ok(self.complete(header)));
        }
        self.body.reserve(body_len);
        self.state = State::AwaitingBody(header);
        None
    }

    fn complete(&mut self, header: MessageHeader) -> Frame {
        let body = self.body.split().freeze();
        tracing::trace!(
            message_type = %header.message_type,
            correlation_id = header.correlation_id,
            len = body.len(),
            "frame reassembled"
        );
        Frame { header, body }
    }
}

/// Space-separated uppercase hex, for trace logging.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use opcmsg_codec::{CodecError, MessageType, ParamId, ParamValue};

    use super::*;

    fn sample() -> Message {
        Message::write(7, ParamId::string(0, "foo"), ParamValue::from("bar"))
    }

    #[test]
    fn single_chunk_yields_one_frame() {
        let wire = sample().serialize().unwrap();
        let mut framer = MessageFramer::default();
        let frames = framer.push_all(&wire);
        assert_eq!(frames.len(), 1);
        let frame = frames.into_iter().next().unwrap().unwrap();
        assert_eq!(frame.wire_size(), wire.len());
        assert_eq!(frame.decode().unwrap(), sample());
        assert!(framer.is_idle());
    }

    #[test]
    fn one_byte_chunks_match_single_chunk() {
        let wire = sample().serialize().unwrap();
        let mut framer = MessageFramer::default();
        let mut decoded = Vec::new();
        for byte in wire.iter() {
            for outcome in framer.push_all(std::slice::from_ref(byte)) {
                decoded.push(outcome.unwrap().decode().unwrap());
            }
        }
        assert_eq!(decoded, vec![sample()]);
    }

    #[test]
    fn header_split_across_chunks() {
        let wire = sample().serialize().unwrap();
        let mut framer = MessageFramer::default();
        assert!(framer.push_all(&wire[..4]).is_empty());
        assert!(!framer.is_idle());
        assert!(framer.push_all(&wire[4..12]).is_empty());
        let frames = framer.push_all(&wire[12..]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn several_frames_in_one_chunk() {
        let mut wire = Vec::new();
        for id in 1..=3 {
            wire.extend_from_slice(&Message::read(id, ParamId::numeric(0, 1)).serialize().unwrap());
        }
        let mut framer = MessageFramer::default();
        let ids: Vec<u32> = framer
            .push_all(&wire)
            .into_iter()
            .map(|f| f.unwrap().header.correlation_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn push_stops_after_one_frame() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&sample().serialize().unwrap());
        wire.extend_from_slice(&sample().serialize().unwrap());
        let mut framer = MessageFramer::default();
        let mut src = &wire[..];
        assert!(framer.push(&mut src).unwrap().is_ok());
        assert_eq!(src.len(), wire.len() / 2);
    }

    #[test]
    fn short_length_is_reported_and_skipped() {
        let mut wire = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01];
        wire.extend_from_slice(&sample().serialize().unwrap());
        let mut framer = MessageFramer::default();
        let outcomes = framer.push_all(&wire);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], Err(FrameError::InvalidLength(4))));
        assert_eq!(outcomes[1].as_ref().unwrap().decode().unwrap(), sample());
    }

    #[test]
    fn oversized_body_is_discarded() {
        let big = Message::write(1, ParamId::numeric(0, 1), ParamValue::from("x".repeat(64)));
        let mut wire = big.serialize().unwrap().to_vec();
        wire.extend_from_slice(&sample().serialize().unwrap());

        let mut framer = MessageFramer::new(32);
        let outcomes = framer.push_all(&wire);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            Err(FrameError::BodyTooLarge { size: 77, max: 32 })
        ));
        assert_eq!(outcomes[1].as_ref().unwrap().decode().unwrap(), sample());
        assert!(framer.is_idle());
    }

    #[test]
    fn unknown_type_skips_its_body() {
        let mut wire = vec![0x00, 0x2A, 0x00, 0x00, 0x00, 0x0D, 0x00, 0x00, 0x00, 0x01, 0xAA, 0xBB, 0xCC];
        wire.extend_from_slice(&sample().serialize().unwrap());
        let mut framer = MessageFramer::default();
        let outcomes = framer.push_all(&wire);
        assert!(matches!(
            outcomes[0],
            Err(FrameError::Codec(CodecError::UnknownMessageType(42)))
        ));
        assert_eq!(outcomes[1].as_ref().unwrap().header.message_type, MessageType::Write);
    }

    #[test]
    fn body_decode_error_does_not_lose_next_frame() {
        // A Read whose body is one byte short of a param id.
        let mut wire = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00];
        wire.extend_from_slice(&sample().serialize().unwrap());
        let mut framer = MessageFramer::default();
        let outcomes = framer.push_all(&wire);
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0].as_ref().unwrap().decode(),
            Err(FrameError::Codec(CodecError::Truncated { .. }))
        ));
        assert_eq!(outcomes[1].as_ref().unwrap().decode().unwrap(), sample());
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00 AB 10");
        assert_eq!(hex(&[]), "");
    }
}
