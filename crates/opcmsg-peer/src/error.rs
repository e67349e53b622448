use std::time::Duration;

use opcmsg_codec::{CodecError, MessageType, Status};

/// Errors that can occur in client and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] opcmsg_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] opcmsg_frame::FrameError),

    /// A message could not be encoded or a response could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer answered with a non-success status.
    #[error("request failed with status {0}")]
    Status(Status),

    /// A Call failed inside the application.
    #[error("application error {code}: {message}")]
    Application { code: i32, message: String },

    /// The response type does not match the request.
    #[error("expected {expected}, received {actual}")]
    UnexpectedResponse {
        expected: MessageType,
        actual: MessageType,
    },

    /// No response within the receive window and retry limit.
    #[error("no response after {retries} retries of {timeout:?}")]
    Timeout { retries: u32, timeout: Duration },

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// Graceful shutdown failed.
    #[error("shutdown failed: {0}")]
    ShutdownFailed(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;
