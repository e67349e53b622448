use std::net::SocketAddr;

use opcmsg_codec::MessageHeader;

use crate::error::TransportError;

/// Callbacks from the server transport to the application.
///
/// `received` runs on the per-connection framing worker; every other
/// callback runs on the readiness loop thread. Implementations must not
/// block for long in either place. Submitting from inside a callback is
/// allowed.
pub trait MessageListener: Send + Sync {
    /// A complete frame arrived.
    fn received(&self, header: &MessageHeader, body: &[u8]);

    /// A submitted buffer was fully written.
    fn sent(&self, _bytes: &[u8]) {}

    /// A client connected and is now being served.
    fn accepted(&self, _peer: SocketAddr) {}

    /// A connection arrived while another client was served and was closed.
    fn rejected(&self, _peer: SocketAddr) {}

    /// The served client went away.
    fn disconnected(&self, _peer: SocketAddr) {}

    /// A non-fatal transport or framing error.
    fn error_occurred(&self, _error: &TransportError) {}
}
