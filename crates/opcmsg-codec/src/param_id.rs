use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};
use crate::wire::{self, Envelope};

/// In-memory namespace meaning "none given" (legacy `#<int>` or bare string form).
///
/// Encodes as `0xFFFF`; decoding never yields it back.
pub const NO_NAMESPACE: i32 = -1;

const KIND_NUMERIC: u8 = 0x00;
const KIND_STRING: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(i32),
    String(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "i={n}"),
            Self::String(s) => write!(f, "s={s}"),
        }
    }
}

/// Identifier of a parameter or method.
///
/// Wire layout: `namespace(u16) + kind(u8) + (i32 | len(u16) + latin1 bytes)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamId {
    pub namespace_index: i32,
    pub identifier: Identifier,
}

impl ParamId {
    pub fn new(namespace_index: i32, identifier: Identifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }

    pub fn numeric(namespace_index: i32, id: i32) -> Self {
        Self::new(namespace_index, Identifier::Numeric(id))
    }

    pub fn string(namespace_index: i32, id: impl Into<String>) -> Self {
        Self::new(namespace_index, Identifier::String(id.into()))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.identifier, Identifier::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<i32> {
        match self.identifier {
            Identifier::Numeric(n) => Some(n),
            Identifier::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.identifier {
            Identifier::String(s) => Some(s),
            Identifier::Numeric(_) => None,
        }
    }

    fn wire_namespace(&self) -> Result<u16> {
        if self.namespace_index == NO_NAMESPACE {
            return Ok(u16::MAX);
        }
        u16::try_from(self.namespace_index).map_err(|_| {
            CodecError::Unrepresentable(format!(
                "namespace index {} outside 0-65535",
                self.namespace_index
            ))
        })
    }

    pub fn byte_count(&self) -> usize {
        match &self.identifier {
            Identifier::Numeric(_) => 2 + 1 + 4,
            Identifier::String(s) => 2 + 1 + wire::string_byte_count(s, Envelope::Omitted),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let ns = self.wire_namespace()?;
        match &self.identifier {
            Identifier::Numeric(n) => {
                dst.put_u16(ns);
                dst.put_u8(KIND_NUMERIC);
                dst.put_i32(*n);
            }
            Identifier::String(s) => {
                // Validate before writing so a failure leaves `dst` untouched.
                let raw = wire::latin1_encode(s)?;
                let len = wire::wire_len(raw.len(), "param id")?;
                dst.put_u16(ns);
                dst.put_u8(KIND_STRING);
                dst.put_u16(len);
                dst.put_slice(&raw);
            }
        }
        Ok(())
    }

    /// Decode a param id, advancing `src` only on success.
    pub fn decode(src: &mut &[u8]) -> Result<Self> {
        let mut cursor = *src;
        let namespace_index = i32::from(wire::get_u16(&mut cursor)?);
        let identifier = match wire::get_u8(&mut cursor)? {
            KIND_NUMERIC => Identifier::Numeric(wire::get_i32(&mut cursor)?),
            KIND_STRING => {
                Identifier::String(wire::decode_string_body(&mut cursor, Envelope::Omitted)?)
            }
            other => return Err(CodecError::InvalidParamIdKind(other)),
        };
        *src = cursor;
        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};{}", self.namespace_index, self.identifier)
    }
}

/// Split `ns=<N>;` off the front, if present and well-formed.
fn split_namespace(s: &str) -> Option<(Option<&str>, &str)> {
    let Some(rest) = s.strip_prefix("ns=") else {
        return Some((None, s));
    };
    let (ns, tail) = rest.split_once(';')?;
    let digits = ns.strip_prefix('-').unwrap_or(ns);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((Some(ns), tail))
}

impl FromStr for ParamId {
    type Err = CodecError;

    /// Parses `[ns=<N>;]i=<int>` or `[ns=<N>;]s=<str>`, falling back to the
    /// legacy forms `#<int>` and bare strings (both with [`NO_NAMESPACE`]).
    fn from_str(s: &str) -> Result<Self> {
        if let Some((ns, tail)) = split_namespace(s) {
            let mut chars = tail.chars();
            let kind = chars.next();
            let body = chars.as_str();
            if let (Some(kind @ ('i' | 's' | 'g' | 'b')), Some(value)) =
                (kind, body.strip_prefix('='))
            {
                if !value.is_empty() {
                    let namespace_index = match ns {
                        Some(ns) => ns.parse::<i32>().map_err(|_| {
                            CodecError::InvalidParamId(format!("namespace out of range: {ns}"))
                        })?,
                        None => 0,
                    };
                    let identifier = match kind {
                        'i' => Identifier::Numeric(value.parse().map_err(|_| {
                            CodecError::InvalidParamId(format!("not an integer: {value}"))
                        })?),
                        's' => Identifier::String(value.to_string()),
                        other => {
                            return Err(CodecError::InvalidParamId(format!(
                                "unsupported identifier type '{other}'"
                            )))
                        }
                    };
                    return Ok(Self::new(namespace_index, identifier));
                }
            }
        }

        if let Some(n) = s.strip_prefix('#').and_then(|rest| rest.parse::<i32>().ok()) {
            return Ok(Self::numeric(NO_NAMESPACE, n));
        }
        Ok(Self::string(NO_NAMESPACE, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ParamId {
        s.parse().unwrap()
    }

    #[test]
    fn parses_current_forms() {
        assert_eq!(parse("i=12345"), ParamId::numeric(0, 12345));
        assert_eq!(parse("s=test"), ParamId::string(0, "test"));
        assert_eq!(parse("ns=2;i=12345"), ParamId::numeric(2, 12345));
        assert_eq!(parse("ns=3;s=a=b;c"), ParamId::string(3, "a=b;c"));
    }

    #[test]
    fn parses_legacy_forms() {
        assert_eq!(parse("#1234"), ParamId::numeric(NO_NAMESPACE, 1234));
        assert_eq!(parse("temperature"), ParamId::string(NO_NAMESPACE, "temperature"));
        assert_eq!(parse("#abc"), ParamId::string(NO_NAMESPACE, "#abc"));
        assert_eq!(parse("ns=x;i=1"), ParamId::string(NO_NAMESPACE, "ns=x;i=1"));
    }

    #[test]
    fn rejects_bad_current_forms() {
        assert!(matches!(
            "i=abc".parse::<ParamId>(),
            Err(CodecError::InvalidParamId(_))
        ));
        assert!(matches!(
            "ns=1;g=0000-1111".parse::<ParamId>(),
            Err(CodecError::InvalidParamId(_))
        ));
        assert!(matches!(
            "b=AAAA".parse::<ParamId>(),
            Err(CodecError::InvalidParamId(_))
        ));
    }

    #[test]
    fn display_matches_parse_form() {
        let id = ParamId::string(2, "foo");
        assert_eq!(id.to_string(), "ns=2;s=foo");
        assert_eq!(parse(&id.to_string()), id);
        assert_eq!(ParamId::numeric(0, 7).to_string(), "ns=0;i=7");
    }

    #[test]
    fn numeric_wire_layout() {
        let id = ParamId::numeric(0, -1);
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(id.byte_count(), 7);
    }

    #[test]
    fn string_wire_layout_is_latin1() {
        let id = ParamId::string(2, "\u{80}\u{81}\u{82}");
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x02, 0x01, 0x00, 0x03, 0x80, 0x81, 0x82]
        );
        assert_eq!(id.byte_count(), buf.len());

        let mut cursor = &buf[..];
        assert_eq!(ParamId::decode(&mut cursor).unwrap(), id);
        assert!(cursor.is_empty());
    }

    #[test]
    fn no_namespace_decodes_as_ffff() {
        let id = ParamId::numeric(NO_NAMESPACE, 5);
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        let decoded = ParamId::decode(&mut &buf[..]).unwrap();
        assert_eq!(decoded.namespace_index, 65535);
    }

    #[test]
    fn bad_kind_and_truncation_leave_cursor() {
        let data = [0x00u8, 0x01, 0x07, 0x00];
        let mut cursor = &data[..];
        assert_eq!(
            ParamId::decode(&mut cursor),
            Err(CodecError::InvalidParamIdKind(0x07))
        );
        assert_eq!(cursor.len(), 4);

        let short = [0x00u8, 0x01, 0x01, 0x00, 0x05, b'a'];
        let mut cursor = &short[..];
        assert!(matches!(
            ParamId::decode(&mut cursor),
            Err(CodecError::Truncated { .. })
        ));
        assert_eq!(cursor.len(), short.len());
    }

    #[test]
    fn out_of_range_namespace_is_unrepresentable() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            ParamId::numeric(70_000, 1).encode(&mut buf),
            Err(CodecError::Unrepresentable(_))
        ));
        assert!(buf.is_empty());
    }
}
