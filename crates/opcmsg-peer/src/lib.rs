//! Request/response layer of the OPC UA message protocol.
//!
//! - [`MessageClient`] connects to a server, correlates responses to
//!   requests by correlation id and hands Notifications and Events to a
//!   [`NotificationHandler`].
//! - [`MessageHandler`] sits behind a
//!   [`MessageServer`](opcmsg_transport::MessageServer) and answers requests
//!   from a [`DataProvider`].

pub mod client;
pub mod error;
#[cfg(unix)]
pub mod handler;
pub mod memory;
pub mod provider;

pub use client::{ClientConfig, MessageClient, NotificationHandler, DEFAULT_CLIENT_PORT};
pub use error::{PeerError, Result};
#[cfg(unix)]
pub use handler::MessageHandler;
pub use memory::MemoryProvider;
pub use provider::{DataProvider, ProviderError, ProviderResult};
