use opcmsg_codec::CodecError;

/// Errors that can occur while framing or unframing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A complete frame arrived but its header or body did not decode.
    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),

    /// The header announced a total length shorter than the header itself.
    #[error("invalid message length {0} (minimum 10)")]
    InvalidLength(u32),

    /// The announced body exceeds the configured maximum size.
    #[error("message body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the stream is still usable after this error.
    ///
    /// Malformed frames are skipped and the framer resynchronizes on the next
    /// header; I/O failures and EOF end the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Codec(_) | Self::InvalidLength(_) | Self::BodyTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
