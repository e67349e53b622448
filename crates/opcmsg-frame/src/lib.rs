//! Header/body framing for the OPC UA message protocol.
//!
//! Every message is a 10-byte header (type, total length, correlation id)
//! followed by `length - 10` body bytes. [`MessageFramer`] rebuilds frames
//! from arbitrarily chunked input; [`FrameReader`] and [`FrameWriter`] wrap
//! blocking streams.

pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

pub use error::{FrameError, Result};
pub use framer::{hex, Frame, FrameConfig, MessageFramer, DEFAULT_MAX_BODY};
pub use opcmsg_codec::HEADER_SIZE;
pub use reader::FrameReader;
pub use writer::FrameWriter;
