/// Errors that can occur while encoding or decoding wire values and messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input ended before a complete value could be read.
    #[error("truncated input (needed {needed} bytes, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// The 2-byte type tag is not part of the tag table.
    #[error("unknown param type tag {0}")]
    UnknownParamType(u16),

    /// A scalar `Char` tag was found; chars only appear as string elements.
    #[error("scalar char values are not supported")]
    CharScalar,

    /// An array element tag that cannot appear in that position.
    #[error("invalid array element type {0}")]
    InvalidArrayElement(u16),

    /// The param id kind byte is neither numeric (0x00) nor string (0x01).
    #[error("invalid param id kind 0x{0:02X}")]
    InvalidParamIdKind(u8),

    /// The message header names an unknown message type.
    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    /// A response carries a status code outside the status table.
    #[error("unknown status code {0}")]
    UnknownStatus(u16),

    /// Serialization wrote a different number of bytes than the header announced.
    #[error("serialized length {written} does not match computed length {computed}")]
    LengthMismatch { computed: usize, written: usize },

    /// The value cannot be represented on the wire (char above 0xFF, length above u16).
    #[error("value not representable on the wire: {0}")]
    Unrepresentable(String),

    /// A textual param id could not be parsed.
    #[error("invalid param id: {0}")]
    InvalidParamId(String),

    /// A JSON value has no wire counterpart.
    #[error("unsupported json value: {0}")]
    UnsupportedJson(String),

    /// A message body was longer than its fields.
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;
