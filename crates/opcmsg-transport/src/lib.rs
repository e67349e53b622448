//! Single-client server transport for the OPC UA message protocol.
//!
//! [`MessageServer`] listens on a TCP port and serves one peer at a time.
//! One thread owns the sockets and a `poll(2)` readiness loop; a second,
//! per-connection thread reassembles frames and hands them to the
//! application's [`MessageListener`]. Outbound messages are queued through
//! [`Outbound`] and drained in submission order.

pub mod config;
pub mod error;
pub mod listener;

#[cfg(unix)]
mod poll;
#[cfg(unix)]
pub mod server;

pub use config::{ServerConfig, DEFAULT_RECV_TIMEOUT, DEFAULT_SERVER_PORT};
pub use error::{Result, TransportError};
pub use listener::MessageListener;

#[cfg(unix)]
pub use server::{MessageServer, Outbound};
