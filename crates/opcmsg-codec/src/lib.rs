//! Wire codec and message model for the OPC UA message protocol.
//!
//! All integers are big-endian. Values are tagged with a 2-byte type code;
//! strings are one byte per character and limited to `U+0000..=U+00FF`.
//! Nothing in this crate performs I/O.

pub mod error;
pub mod json;
pub mod message;
pub mod param_id;
pub mod structure;
pub mod types;
pub mod value;
pub mod wire;

pub use error::{CodecError, Result};
pub use json::{from_json, to_json};
pub use message::{
    Call, CallResponse, CallResult, Event, Message, MessageHeader, Notification, ParamRequest,
    ReadResponse, ReadResult, StatusResponse, Write, HEADER_SIZE,
};
pub use param_id::{Identifier, ParamId, NO_NAMESPACE};
pub use structure::{Struct, StructField};
pub use types::{MessageType, ParamType, Status};
pub use value::{ParamArray, ParamValue};
pub use wire::Envelope;
