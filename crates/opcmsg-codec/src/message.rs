//! The twelve protocol messages.
//!
//! Every message is a 10-byte header followed by a type-specific body:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────┬─────────────────┐
//! │ Type (2B BE) │ Length (4B)  │ Correlation (4B) │ Body            │
//! │              │ header+body  │                  │ (Length - 10 B) │
//! └──────────────┴──────────────┴──────────────────┴─────────────────┘
//! ```
//!
//! The length field is always computed from the live field values at
//! serialization time.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::param_id::ParamId;
use crate::types::{MessageType, Status};
use crate::value::ParamValue;
use crate::wire::{self, Envelope};

/// Header size in bytes: type (2) + length (4) + correlation id (4).
pub const HEADER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    /// Total message length, header included.
    pub length: u32,
    pub correlation_id: u32,
}

impl MessageHeader {
    /// Body length announced by this header.
    pub fn body_len(&self) -> usize {
        (self.length as usize).saturating_sub(HEADER_SIZE)
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.message_type.as_u16());
        dst.put_u32(self.length);
        dst.put_u32(self.correlation_id);
    }

    /// Parse the first [`HEADER_SIZE`] bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut cursor = src;
        let code = wire::get_u16(&mut cursor)?;
        let length = wire::get_u32(&mut cursor)?;
        let correlation_id = wire::get_u32(&mut cursor)?;
        Ok(Self {
            message_type: MessageType::from_u16(code)?,
            length,
            correlation_id,
        })
    }
}

fn encode_params(params: &[(ParamId, ParamValue)], dst: &mut BytesMut) -> Result<()> {
    dst.put_u16(wire::wire_len(params.len(), "parameter list")?);
    for (id, value) in params {
        id.encode(dst)?;
        value.encode(dst)?;
    }
    Ok(())
}

fn decode_params(src: &mut &[u8]) -> Result<Vec<(ParamId, ParamValue)>> {
    let count = wire::get_u16(src)? as usize;
    let mut params = Vec::with_capacity(count.min(src.len()));
    for _ in 0..count {
        let id = ParamId::decode(src)?;
        let value = ParamValue::decode(src)?;
        params.push((id, value));
    }
    Ok(params)
}

fn params_byte_count(params: &[(ParamId, ParamValue)]) -> usize {
    2 + params
        .iter()
        .map(|(id, value)| id.byte_count() + value.byte_count())
        .sum::<usize>()
}

fn encode_values(values: &[ParamValue], dst: &mut BytesMut) -> Result<()> {
    dst.put_u16(wire::wire_len(values.len(), "value list")?);
    for value in values {
        value.encode(dst)?;
    }
    Ok(())
}

fn decode_values(src: &mut &[u8]) -> Result<Vec<ParamValue>> {
    let count = wire::get_u16(src)? as usize;
    let mut values = Vec::with_capacity(count.min(src.len()));
    for _ in 0..count {
        values.push(ParamValue::decode(src)?);
    }
    Ok(values)
}

fn values_byte_count(values: &[ParamValue]) -> usize {
    2 + values.iter().map(ParamValue::byte_count).sum::<usize>()
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[(ParamId, ParamValue)]) -> fmt::Result {
    f.write_str("[")?;
    for (i, (id, value)) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{id}: {value}")?;
    }
    f.write_str("]")
}

/// Body shared by Read, Subscribe and Unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRequest {
    pub correlation_id: u32,
    pub param_id: ParamId,
}

/// Body shared by Write, Subscribe and Unsubscribe responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub correlation_id: u32,
    pub status: Status,
}

impl StatusResponse {
    pub fn new(correlation_id: u32, status: Status) -> Self {
        Self {
            correlation_id,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub correlation_id: u32,
    pub param_id: ParamId,
    pub value: ParamValue,
}

/// Payload of a successful read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub param_id: ParamId,
    pub value: ParamValue,
}

/// Response to a Read. The result is only on the wire when the status is
/// [`Status::Success`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub correlation_id: u32,
    pub status: Status,
    pub result: Option<ReadResult>,
}

impl ReadResponse {
    pub fn success(request: &ParamRequest, value: ParamValue) -> Self {
        Self {
            correlation_id: request.correlation_id,
            status: Status::Success,
            result: Some(ReadResult {
                param_id: request.param_id.clone(),
                value,
            }),
        }
    }

    pub fn failure(correlation_id: u32, status: Status) -> Self {
        Self {
            correlation_id,
            status,
            result: None,
        }
    }

    fn carries_result(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub correlation_id: u32,
    pub method_id: ParamId,
    pub param_id: ParamId,
    pub args: Vec<ParamValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub method_id: ParamId,
    pub param_id: ParamId,
    pub values: Vec<ParamValue>,
}

/// Response to a Call. The result travels with both [`Status::Success`] and
/// [`Status::ApplicationError`]; the latter carries `[Int(code), String(message)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    pub correlation_id: u32,
    pub status: Status,
    pub result: Option<CallResult>,
}

impl CallResponse {
    fn with_result(request: &Call, status: Status, values: Vec<ParamValue>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            status,
            result: Some(CallResult {
                method_id: request.method_id.clone(),
                param_id: request.param_id.clone(),
                values,
            }),
        }
    }

    pub fn success(request: &Call, values: Vec<ParamValue>) -> Self {
        Self::with_result(request, Status::Success, values)
    }

    pub fn application_error(request: &Call, code: i32, message: impl Into<String>) -> Self {
        Self::with_result(
            request,
            Status::ApplicationError,
            vec![ParamValue::Int(code), ParamValue::String(message.into())],
        )
    }

    pub fn failure(correlation_id: u32, status: Status) -> Self {
        Self {
            correlation_id,
            status,
            result: None,
        }
    }

    fn carries_result(&self) -> bool {
        matches!(self.status, Status::Success | Status::ApplicationError)
    }
}

/// Unsolicited parameter updates, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub correlation_id: u32,
    pub params: Vec<(ParamId, ParamValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub correlation_id: u32,
    pub event_type_id: ParamId,
    pub param_id: ParamId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub severity: i32,
    pub message: String,
    pub params: Vec<(ParamId, ParamValue)>,
}

impl Event {
    /// Current wall clock in epoch milliseconds.
    pub fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// A decoded or outbound protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Read(ParamRequest),
    ReadResponse(ReadResponse),
    Write(Write),
    WriteResponse(StatusResponse),
    Subscribe(ParamRequest),
    SubscribeResponse(StatusResponse),
    Unsubscribe(ParamRequest),
    UnsubscribeResponse(StatusResponse),
    Notification(Notification),
    Event(Event),
    Call(Call),
    CallResponse(CallResponse),
}

impl Message {
    pub fn read(correlation_id: u32, param_id: ParamId) -> Self {
        Self::Read(ParamRequest {
            correlation_id,
            param_id,
        })
    }

    pub fn write(correlation_id: u32, param_id: ParamId, value: ParamValue) -> Self {
        Self::Write(Write {
            correlation_id,
            param_id,
            value,
        })
    }

    pub fn subscribe(correlation_id: u32, param_id: ParamId) -> Self {
        Self::Subscribe(ParamRequest {
            correlation_id,
            param_id,
        })
    }

    pub fn unsubscribe(correlation_id: u32, param_id: ParamId) -> Self {
        Self::Unsubscribe(ParamRequest {
            correlation_id,
            param_id,
        })
    }

    pub fn call(
        correlation_id: u32,
        method_id: ParamId,
        param_id: ParamId,
        args: Vec<ParamValue>,
    ) -> Self {
        Self::Call(Call {
            correlation_id,
            method_id,
            param_id,
            args,
        })
    }

    /// Response of the given request type carrying only a status, used to
    /// answer requests that could not be decoded or processed.
    pub fn status_response(
        request_type: MessageType,
        correlation_id: u32,
        status: Status,
    ) -> Option<Self> {
        let plain = StatusResponse::new(correlation_id, status);
        Some(match request_type {
            MessageType::Read => Self::ReadResponse(ReadResponse::failure(correlation_id, status)),
            MessageType::Write => Self::WriteResponse(plain),
            MessageType::Subscribe => Self::SubscribeResponse(plain),
            MessageType::Unsubscribe => Self::UnsubscribeResponse(plain),
            MessageType::Call => Self::CallResponse(CallResponse::failure(correlation_id, status)),
            _ => return None,
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Read(_) => MessageType::Read,
            Self::ReadResponse(_) => MessageType::ReadResponse,
            Self::Write(_) => MessageType::Write,
            Self::WriteResponse(_) => MessageType::WriteResponse,
            Self::Subscribe(_) => MessageType::Subscribe,
            Self::SubscribeResponse(_) => MessageType::SubscribeResponse,
            Self::Unsubscribe(_) => MessageType::Unsubscribe,
            Self::UnsubscribeResponse(_) => MessageType::UnsubscribeResponse,
            Self::Notification(_) => MessageType::Notification,
            Self::Event(_) => MessageType::Event,
            Self::Call(_) => MessageType::Call,
            Self::CallResponse(_) => MessageType::CallResponse,
        }
    }

    pub fn correlation_id(&self) -> u32 {
        match self {
            Self::Read(m) | Self::Subscribe(m) | Self::Unsubscribe(m) => m.correlation_id,
            Self::WriteResponse(m) | Self::SubscribeResponse(m) | Self::UnsubscribeResponse(m) => {
                m.correlation_id
            }
            Self::ReadResponse(m) => m.correlation_id,
            Self::Write(m) => m.correlation_id,
            Self::Notification(m) => m.correlation_id,
            Self::Event(m) => m.correlation_id,
            Self::Call(m) => m.correlation_id,
            Self::CallResponse(m) => m.correlation_id,
        }
    }

    /// Status of a response, `None` for other messages.
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::ReadResponse(m) => Some(m.status),
            Self::WriteResponse(m) | Self::SubscribeResponse(m) | Self::UnsubscribeResponse(m) => {
                Some(m.status)
            }
            Self::CallResponse(m) => Some(m.status),
            _ => None,
        }
    }

    pub fn body_byte_count(&self) -> usize {
        match self {
            Self::Read(m) | Self::Subscribe(m) | Self::Unsubscribe(m) => m.param_id.byte_count(),
            Self::WriteResponse(_) | Self::SubscribeResponse(_) | Self::UnsubscribeResponse(_) => {
                Status::BYTE_COUNT
            }
            Self::ReadResponse(m) => {
                Status::BYTE_COUNT
                    + match (&m.result, m.carries_result()) {
                        (Some(r), true) => r.param_id.byte_count() + r.value.byte_count(),
                        _ => 0,
                    }
            }
            Self::Write(m) => m.param_id.byte_count() + m.value.byte_count(),
            Self::Notification(m) => params_byte_count(&m.params),
            Self::Event(m) => {
                m.event_type_id.byte_count()
                    + m.param_id.byte_count()
                    + 8
                    + 4
                    + wire::string_byte_count(&m.message, Envelope::Omitted)
                    + params_byte_count(&m.params)
            }
            Self::Call(m) => {
                m.method_id.byte_count() + m.param_id.byte_count() + values_byte_count(&m.args)
            }
            Self::CallResponse(m) => {
                Status::BYTE_COUNT
                    + match (&m.result, m.carries_result()) {
                        (Some(r), true) => {
                            r.method_id.byte_count()
                                + r.param_id.byte_count()
                                + values_byte_count(&r.values)
                        }
                        _ => 0,
                    }
            }
        }
    }

    /// Total encoded size, header included.
    pub fn byte_count(&self) -> usize {
        HEADER_SIZE + self.body_byte_count()
    }

    /// Header with the length computed from the current field values.
    pub fn header(&self) -> Result<MessageHeader> {
        let total = self.byte_count();
        let length = u32::try_from(total).map_err(|_| {
            CodecError::Unrepresentable(format!("message length {total} exceeds u32"))
        })?;
        Ok(MessageHeader {
            message_type: self.message_type(),
            length,
            correlation_id: self.correlation_id(),
        })
    }

    fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::Read(m) | Self::Subscribe(m) | Self::Unsubscribe(m) => m.param_id.encode(dst)?,
            Self::WriteResponse(m) | Self::SubscribeResponse(m) | Self::UnsubscribeResponse(m) => {
                dst.put_u16(m.status.as_u16())
            }
            Self::ReadResponse(m) => {
                dst.put_u16(m.status.as_u16());
                if m.carries_result() {
                    let r = m.result.as_ref().ok_or_else(|| {
                        CodecError::Unrepresentable("successful read response without a value".into())
                    })?;
                    r.param_id.encode(dst)?;
                    r.value.encode(dst)?;
                }
            }
            Self::Write(m) => {
                m.param_id.encode(dst)?;
                m.value.encode(dst)?;
            }
            Self::Notification(m) => encode_params(&m.params, dst)?,
            Self::Event(m) => {
                m.event_type_id.encode(dst)?;
                m.param_id.encode(dst)?;
                dst.put_i64(m.timestamp);
                dst.put_i32(m.severity);
                wire::encode_string(&m.message, Envelope::Omitted, dst)?;
                encode_params(&m.params, dst)?;
            }
            Self::Call(m) => {
                m.method_id.encode(dst)?;
                m.param_id.encode(dst)?;
                encode_values(&m.args, dst)?;
            }
            Self::CallResponse(m) => {
                dst.put_u16(m.status.as_u16());
                if m.carries_result() {
                    let r = m.result.as_ref().ok_or_else(|| {
                        CodecError::Unrepresentable(format!(
                            "{} call response without a result",
                            m.status.name()
                        ))
                    })?;
                    r.method_id.encode(dst)?;
                    r.param_id.encode(dst)?;
                    encode_values(&r.values, dst)?;
                }
            }
        }
        Ok(())
    }

    /// Serialize header and body into one buffer.
    ///
    /// The header length is computed first and checked against the number of
    /// bytes actually written.
    pub fn serialize(&self) -> Result<Bytes> {
        let header = self.header()?;
        let computed = header.length as usize;
        let mut buf = BytesMut::with_capacity(computed);
        header.encode(&mut buf);
        self.encode_body(&mut buf)?;
        if buf.len() != computed {
            return Err(CodecError::LengthMismatch {
                computed,
                written: buf.len(),
            });
        }
        Ok(buf.freeze())
    }

    /// Decode a body against an already parsed header.
    ///
    /// The body must be consumed exactly; leftovers are reported as
    /// [`CodecError::TrailingBytes`].
    pub fn decode(header: &MessageHeader, body: &[u8]) -> Result<Self> {
        let mut src = body;
        let id = header.correlation_id;
        let request = |src: &mut &[u8]| -> Result<ParamRequest> {
            Ok(ParamRequest {
                correlation_id: id,
                param_id: ParamId::decode(src)?,
            })
        };
        let status = |src: &mut &[u8]| -> Result<Status> { Status::from_u16(wire::get_u16(src)?) };

        let message = match header.message_type {
            MessageType::Read => Self::Read(request(&mut src)?),
            MessageType::Subscribe => Self::Subscribe(request(&mut src)?),
            MessageType::Unsubscribe => Self::Unsubscribe(request(&mut src)?),
            MessageType::WriteResponse => {
                Self::WriteResponse(StatusResponse::new(id, status(&mut src)?))
            }
            MessageType::SubscribeResponse => {
                Self::SubscribeResponse(StatusResponse::new(id, status(&mut src)?))
            }
            MessageType::UnsubscribeResponse => {
                Self::UnsubscribeResponse(StatusResponse::new(id, status(&mut src)?))
            }
            MessageType::ReadResponse => {
                let mut response = ReadResponse::failure(id, status(&mut src)?);
                if response.carries_result() {
                    response.result = Some(ReadResult {
                        param_id: ParamId::decode(&mut src)?,
                        value: ParamValue::decode(&mut src)?,
                    });
                }
                Self::ReadResponse(response)
            }
            MessageType::Write => Self::Write(Write {
                correlation_id: id,
                param_id: ParamId::decode(&mut src)?,
                value: ParamValue::decode(&mut src)?,
            }),
            MessageType::Notification => Self::Notification(Notification {
                correlation_id: id,
                params: decode_params(&mut src)?,
            }),
            MessageType::Event => Self::Event(Event {
                correlation_id: id,
                event_type_id: ParamId::decode(&mut src)?,
                param_id: ParamId::decode(&mut src)?,
                timestamp: wire::get_i64(&mut src)?,
                severity: wire::get_i32(&mut src)?,
                message: wire::decode_string_body(&mut src, Envelope::Omitted)?,
                params: decode_params(&mut src)?,
            }),
            MessageType::Call => Self::Call(Call {
                correlation_id: id,
                method_id: ParamId::decode(&mut src)?,
                param_id: ParamId::decode(&mut src)?,
                args: decode_values(&mut src)?,
            }),
            MessageType::CallResponse => {
                let mut response = CallResponse::failure(id, status(&mut src)?);
                if response.carries_result() {
                    response.result = Some(CallResult {
                        method_id: ParamId::decode(&mut src)?,
                        param_id: ParamId::decode(&mut src)?,
                        values: decode_values(&mut src)?,
                    });
                }
                Self::CallResponse(response)
            }
        };

        if !src.is_empty() {
            return Err(CodecError::TrailingBytes(src.len()));
        }
        Ok(message)
    }

    /// Decode one complete message (header and body) from `src`.
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        let header = MessageHeader::decode(src)?;
        let total = header.length as usize;
        if total < HEADER_SIZE || src.len() < total {
            return Err(CodecError::Truncated {
                needed: total.max(HEADER_SIZE),
                remaining: src.len(),
            });
        }
        if src.len() > total {
            return Err(CodecError::TrailingBytes(src.len() - total));
        }
        Self::decode(&header, &src[HEADER_SIZE..total])
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.message_type(), self.correlation_id())?;
        match self {
            Self::Read(m) | Self::Subscribe(m) | Self::Unsubscribe(m) => {
                write!(f, " {}", m.param_id)
            }
            Self::WriteResponse(m) | Self::SubscribeResponse(m) | Self::UnsubscribeResponse(m) => {
                write!(f, " {}", m.status)
            }
            Self::ReadResponse(m) => {
                write!(f, " {}", m.status)?;
                match &m.result {
                    Some(r) if m.carries_result() => write!(f, " {} = {}", r.param_id, r.value),
                    _ => Ok(()),
                }
            }
            Self::Write(m) => write!(f, " {} = {}", m.param_id, m.value),
            Self::Notification(m) => {
                f.write_str(" ")?;
                write_params(f, &m.params)
            }
            Self::Event(m) => {
                write!(
                    f,
                    " type={} param={} ts={} severity={} message={:?} ",
                    m.event_type_id, m.param_id, m.timestamp, m.severity, m.message
                )?;
                write_params(f, &m.params)
            }
            Self::Call(m) => {
                write!(f, " {} on {} args={}", m.method_id, m.param_id, m.args.len())
            }
            Self::CallResponse(m) => {
                write!(f, " {}", m.status)?;
                match &m.result {
                    Some(r) if m.carries_result() => {
                        write!(f, " {} on {} results={}", r.method_id, r.param_id, r.values.len())
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}
