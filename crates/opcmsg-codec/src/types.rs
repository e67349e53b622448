//! Tag tables shared by the value codec and the message model.

use std::fmt;

use crate::error::{CodecError, Result};

/// Size of a type tag on the wire.
pub const TAG_SIZE: usize = 2;

/// 2-byte type tags of the value encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ParamType {
    Boolean = 0,
    /// Only valid as the element type of a string (array of char).
    Char = 1,
    Byte = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    Float = 6,
    Double = 7,
    Array = 8,
    Struct = 9,
}

impl ParamType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(tag: u16) -> Result<Self> {
        Ok(match tag {
            0 => Self::Boolean,
            1 => Self::Char,
            2 => Self::Byte,
            3 => Self::Short,
            4 => Self::Int,
            5 => Self::Long,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Array,
            9 => Self::Struct,
            other => return Err(CodecError::UnknownParamType(other)),
        })
    }

    /// Payload width of a fixed-size scalar, `None` for variable-size kinds.
    pub fn scalar_width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Byte => Some(1),
            Self::Short => Some(2),
            Self::Int | Self::Float => Some(4),
            Self::Long | Self::Double => Some(8),
            Self::Char | Self::Array | Self::Struct => None,
        }
    }
}

/// Message type codes carried in the first two header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Read = 0,
    ReadResponse = 1,
    Write = 2,
    WriteResponse = 3,
    Subscribe = 4,
    SubscribeResponse = 5,
    Unsubscribe = 6,
    UnsubscribeResponse = 7,
    Notification = 8,
    Event = 9,
    Call = 10,
    CallResponse = 11,
}

impl MessageType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Result<Self> {
        Ok(match code {
            0 => Self::Read,
            1 => Self::ReadResponse,
            2 => Self::Write,
            3 => Self::WriteResponse,
            4 => Self::Subscribe,
            5 => Self::SubscribeResponse,
            6 => Self::Unsubscribe,
            7 => Self::UnsubscribeResponse,
            8 => Self::Notification,
            9 => Self::Event,
            10 => Self::Call,
            11 => Self::CallResponse,
            other => return Err(CodecError::UnknownMessageType(other)),
        })
    }

    /// The response type answering a request type, `None` for non-requests.
    pub fn response_type(self) -> Option<Self> {
        match self {
            Self::Read => Some(Self::ReadResponse),
            Self::Write => Some(Self::WriteResponse),
            Self::Subscribe => Some(Self::SubscribeResponse),
            Self::Unsubscribe => Some(Self::UnsubscribeResponse),
            Self::Call => Some(Self::CallResponse),
            _ => None,
        }
    }

    pub fn is_request(self) -> bool {
        self.response_type().is_some()
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::ReadResponse
                | Self::WriteResponse
                | Self::SubscribeResponse
                | Self::UnsubscribeResponse
                | Self::CallResponse
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::ReadResponse => "READ_RESPONSE",
            Self::Write => "WRITE",
            Self::WriteResponse => "WRITE_RESPONSE",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubscribeResponse => "SUBSCRIBE_RESPONSE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubscribeResponse => "UNSUBSCRIBE_RESPONSE",
            Self::Notification => "NOTIFICATION",
            Self::Event => "EVENT",
            Self::Call => "CALL",
            Self::CallResponse => "CALL_RESPONSE",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Success = 0,
    InvalidMessage = 100,
    UnsupportedMessage = 101,
    UnexpectedMessage = 102,
    MissingField = 103,
    UnexpectedField = 104,
    UnknownId = 200,
    InvalidParameter = 300,
    InvalidParamType = 301,
    InvalidParamValue = 302,
    ApplicationError = 500,
}

impl Status {
    pub const BYTE_COUNT: usize = 2;

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(code: u16) -> Result<Self> {
        Ok(match code {
            0 => Self::Success,
            100 => Self::InvalidMessage,
            101 => Self::UnsupportedMessage,
            102 => Self::UnexpectedMessage,
            103 => Self::MissingField,
            104 => Self::UnexpectedField,
            200 => Self::UnknownId,
            300 => Self::InvalidParameter,
            301 => Self::InvalidParamType,
            302 => Self::InvalidParamValue,
            500 => Self::ApplicationError,
            other => return Err(CodecError::UnknownStatus(other)),
        })
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::UnsupportedMessage => "UNSUPPORTED_MESSAGE",
            Self::UnexpectedMessage => "UNEXPECTED_MESSAGE",
            Self::MissingField => "MISSING_FIELD",
            Self::UnexpectedField => "UNEXPECTED_FIELD",
            Self::UnknownId => "UNKNOWN_ID",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::InvalidParamType => "INVALID_PARAM_TYPE",
            Self::InvalidParamValue => "INVALID_PARAM_VALUE",
            Self::ApplicationError => "APPLICATION_ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_codes_roundtrip() {
        for code in 0..12u16 {
            let ty = MessageType::from_u16(code).unwrap();
            assert_eq!(ty.as_u16(), code);
        }
        assert_eq!(
            MessageType::from_u16(12),
            Err(CodecError::UnknownMessageType(12))
        );
    }

    #[test]
    fn request_types_map_to_responses() {
        assert_eq!(
            MessageType::Read.response_type(),
            Some(MessageType::ReadResponse)
        );
        assert_eq!(
            MessageType::Call.response_type(),
            Some(MessageType::CallResponse)
        );
        assert_eq!(MessageType::Notification.response_type(), None);
        assert!(MessageType::UnsubscribeResponse.is_response());
        assert!(!MessageType::Event.is_response());
    }

    #[test]
    fn status_codes_match_table() {
        assert_eq!(Status::from_u16(300).unwrap(), Status::InvalidParameter);
        assert_eq!(Status::from_u16(500).unwrap(), Status::ApplicationError);
        assert_eq!(Status::InvalidParamValue.as_u16(), 302);
        assert!(matches!(
            Status::from_u16(42),
            Err(CodecError::UnknownStatus(42))
        ));
    }

    #[test]
    fn char_tag_is_known_but_has_no_scalar_width() {
        assert_eq!(ParamType::from_u16(1).unwrap(), ParamType::Char);
        assert_eq!(ParamType::Char.scalar_width(), None);
        assert_eq!(ParamType::Long.scalar_width(), Some(8));
        assert!(ParamType::from_u16(10).is_err());
    }
}
