//! OPC UA message protocol over TCP.
//!
//! # Crate Structure
//!
//! - [`codec`]: wire encoding of values, parameter ids and messages
//! - [`frame`]: reassembly of header-prefixed messages from a byte stream
//! - [`transport`]: single-client server with a readiness loop
//! - [`peer`]: correlating client and provider dispatch (behind `peer` feature)

/// Re-export codec types.
pub mod codec {
    pub use opcmsg_codec::*;
}

/// Re-export frame types.
pub mod frame {
    pub use opcmsg_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use opcmsg_transport::*;
}

/// Re-export client and dispatch types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use opcmsg_peer::*;
}
