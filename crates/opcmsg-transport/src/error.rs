use std::time::Duration;

use opcmsg_codec::CodecError;
use opcmsg_frame::FrameError;

/// Errors that can occur in server transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The readiness mechanism failed.
    #[error("poll failed: {0}")]
    Poll(std::io::Error),

    /// Inbound bytes did not form a valid frame.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// An outbound message could not be serialized.
    #[error("cannot serialize message: {0}")]
    Codec(#[from] CodecError),

    /// The readiness loop did not report itself running in time.
    #[error("server did not start within {0:?}")]
    StartupTimeout(Duration),

    /// The server has not been started or was stopped.
    #[error("server is not running")]
    NotRunning,

    /// No client is connected to receive the message.
    #[error("no client connected")]
    NotConnected,

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
