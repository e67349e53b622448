//! Tagged parameter values.
//!
//! ```text
//! scalar:        tag(2) + big-endian payload
//! string:        Array(2) + Char(2) + len(2) + len bytes
//! array:         Array(2) + element tag(2) + count(2) + count * payload
//! string array:  Array(2) + Array(2) + count(2) + count * (Char(2) + len(2) + bytes)
//! struct array:  Array(2) + Struct(2) + count(2) + count * struct
//! struct:        Struct(2) + struct body
//! ```

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};
use crate::structure::Struct;
use crate::types::{ParamType, TAG_SIZE};
use crate::wire::{self, Envelope};

/// A single parameter value.
///
/// Arrays hold one element kind and never nest, except that an array of
/// strings is itself an array of char arrays on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Boolean(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Struct(Struct),
    Array(ParamArray),
}

/// Homogeneous array payload of a [`ParamValue::Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamArray {
    Boolean(Vec<bool>),
    Byte(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Struct(Vec<Struct>),
}

impl ParamArray {
    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Struct(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element tag written after the outer `Array` tag.
    pub fn element_type(&self) -> ParamType {
        match self {
            Self::Boolean(_) => ParamType::Boolean,
            Self::Byte(_) => ParamType::Byte,
            Self::Short(_) => ParamType::Short,
            Self::Int(_) => ParamType::Int,
            Self::Long(_) => ParamType::Long,
            Self::Float(_) => ParamType::Float,
            Self::Double(_) => ParamType::Double,
            Self::String(_) => ParamType::Array,
            Self::Struct(_) => ParamType::Struct,
        }
    }

    fn payload_byte_count(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Short(v) => v.len() * 2,
            Self::Int(v) => v.len() * 4,
            Self::Float(v) => v.len() * 4,
            Self::Long(v) => v.len() * 8,
            Self::Double(v) => v.len() * 8,
            Self::String(v) => v
                .iter()
                .map(|s| TAG_SIZE + wire::string_byte_count(s, Envelope::Omitted))
                .sum(),
            Self::Struct(v) => v.iter().map(Struct::byte_count).sum(),
        }
    }

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::Boolean(v) => v.iter().for_each(|b| dst.put_u8(u8::from(*b))),
            Self::Byte(v) => dst.put_slice(v),
            Self::Short(v) => v.iter().for_each(|x| dst.put_i16(*x)),
            Self::Int(v) => v.iter().for_each(|x| dst.put_i32(*x)),
            Self::Long(v) => v.iter().for_each(|x| dst.put_i64(*x)),
            Self::Float(v) => v.iter().for_each(|x| dst.put_f32(*x)),
            Self::Double(v) => v.iter().for_each(|x| dst.put_f64(*x)),
            Self::String(v) => {
                for s in v {
                    wire::put_tag(dst, ParamType::Char);
                    wire::encode_string(s, Envelope::Omitted, dst)?;
                }
            }
            Self::Struct(v) => {
                for s in v {
                    s.encode_body(dst)?;
                }
            }
        }
        Ok(())
    }

    fn decode_payload(element: u16, count: usize, src: &mut &[u8]) -> Result<Self> {
        fn collect<T>(
            count: usize,
            src: &mut &[u8],
            mut get: impl FnMut(&mut &[u8]) -> Result<T>,
        ) -> Result<Vec<T>> {
            // Capacity is bounded by the input so a bogus count cannot over-allocate.
            let mut out = Vec::with_capacity(count.min(src.len()));
            for _ in 0..count {
                out.push(get(src)?);
            }
            Ok(out)
        }

        Ok(match ParamType::from_u16(element)? {
            ParamType::Boolean => {
                Self::Boolean(collect(count, src, |s| Ok(wire::get_u8(s)? != 0))?)
            }
            ParamType::Byte => Self::Byte(wire::get_bytes(src, count)?.to_vec()),
            ParamType::Short => Self::Short(collect(count, src, wire::get_i16)?),
            ParamType::Int => Self::Int(collect(count, src, wire::get_i32)?),
            ParamType::Long => Self::Long(collect(count, src, wire::get_i64)?),
            ParamType::Float => Self::Float(collect(count, src, wire::get_f32)?),
            ParamType::Double => Self::Double(collect(count, src, wire::get_f64)?),
            ParamType::Array => Self::String(collect(count, src, |s| {
                wire::decode_string_body(s, Envelope::Full)
            })?),
            ParamType::Struct => Self::Struct(collect(count, src, Struct::decode_body)?),
            ParamType::Char => return Err(CodecError::InvalidArrayElement(element)),
        })
    }
}

impl ParamValue {
    /// Outer type tag of this value.
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Boolean(_) => ParamType::Boolean,
            Self::Byte(_) => ParamType::Byte,
            Self::Short(_) => ParamType::Short,
            Self::Int(_) => ParamType::Int,
            Self::Long(_) => ParamType::Long,
            Self::Float(_) => ParamType::Float,
            Self::Double(_) => ParamType::Double,
            Self::Struct(_) => ParamType::Struct,
            Self::String(_) | Self::Array(_) => ParamType::Array,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Struct(_) => "struct",
            Self::Array(_) => "array",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of any integral scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ParamArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Encoded size including the outer tag.
    pub fn byte_count(&self) -> usize {
        TAG_SIZE
            + match self {
                Self::Boolean(_) | Self::Byte(_) => 1,
                Self::Short(_) => 2,
                Self::Int(_) | Self::Float(_) => 4,
                Self::Long(_) | Self::Double(_) => 8,
                Self::String(s) => wire::string_byte_count(s, Envelope::Full) - TAG_SIZE,
                Self::Struct(s) => s.byte_count(),
                Self::Array(a) => TAG_SIZE + 2 + a.payload_byte_count(),
            }
    }

    /// Append the encoding to `dst`. On error `dst` is left as it was.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        let result = self.encode_unchecked(dst);
        if result.is_err() {
            dst.truncate(start);
        }
        result
    }

    fn encode_unchecked(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::String(s) => return wire::encode_string(s, Envelope::Full, dst),
            Self::Array(a) => {
                let count = wire::wire_len(a.len(), "array")?;
                wire::put_tag(dst, ParamType::Array);
                wire::put_tag(dst, a.element_type());
                dst.put_u16(count);
                return a.encode_payload(dst);
            }
            _ => {}
        }

        wire::put_tag(dst, self.param_type());
        match self {
            Self::Boolean(b) => dst.put_u8(u8::from(*b)),
            Self::Byte(v) => dst.put_u8(*v),
            Self::Short(v) => dst.put_i16(*v),
            Self::Int(v) => dst.put_i32(*v),
            Self::Long(v) => dst.put_i64(*v),
            Self::Float(v) => dst.put_f32(*v),
            Self::Double(v) => dst.put_f64(*v),
            Self::Struct(s) => s.encode_body(dst)?,
            Self::String(_) | Self::Array(_) => {}
        }
        Ok(())
    }

    /// Decode one value, advancing `src` only on success.
    pub fn decode(src: &mut &[u8]) -> Result<Self> {
        let mut cursor = *src;
        let value = Self::decode_unchecked(&mut cursor)?;
        *src = cursor;
        Ok(value)
    }

    fn decode_unchecked(src: &mut &[u8]) -> Result<Self> {
        Ok(match wire::get_tag(src)? {
            ParamType::Boolean => Self::Boolean(wire::get_u8(src)? != 0),
            ParamType::Char => return Err(CodecError::CharScalar),
            ParamType::Byte => Self::Byte(wire::get_u8(src)?),
            ParamType::Short => Self::Short(wire::get_i16(src)?),
            ParamType::Int => Self::Int(wire::get_i32(src)?),
            ParamType::Long => Self::Long(wire::get_i64(src)?),
            ParamType::Float => Self::Float(wire::get_f32(src)?),
            ParamType::Double => Self::Double(wire::get_f64(src)?),
            ParamType::Struct => Self::Struct(Struct::decode_body(src)?),
            ParamType::Array => {
                let element = wire::get_u16(src)?;
                if element == ParamType::Char.as_u16() {
                    Self::String(wire::decode_string_body(src, Envelope::Omitted)?)
                } else {
                    let count = wire::get_u16(src)? as usize;
                    Self::Array(ParamArray::decode_payload(element, count, src)?)
                }
            }
        })
    }
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut each: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    f.write_str("]")
}

impl fmt::Display for ParamArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::Byte(v) => write_list(f, v, |f, x| write!(f, "0x{x:02X}")),
            Self::Short(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::Int(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::Long(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::Float(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::Double(v) => write_list(f, v, |f, x| write!(f, "{x}")),
            Self::String(v) => write_list(f, v, |f, x| write!(f, "{x:?}")),
            Self::Struct(v) => write_list(f, v, |f, x| write!(f, "{x}")),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "0x{v:02X}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Struct(v) => write!(f, "{v}"),
            Self::Array(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParamValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Boolean,
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Struct => Struct,
    ParamArray => Array,
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param_id::ParamId;

    fn roundtrip(value: ParamValue) {
        let mut buf = BytesMut::new();
        value.encode(&mut buf).unwrap();
        assert_eq!(value.byte_count(), buf.len(), "byte count for {value}");
        let mut cursor = &buf[..];
        assert_eq!(ParamValue::decode(&mut cursor).unwrap(), value);
        assert!(cursor.is_empty());
    }

    #[test]
    fn scalar_layouts() {
        let cases: [(ParamValue, &[u8]); 6] = [
            (ParamValue::Boolean(true), &[0x00, 0x00, 0x01]),
            (ParamValue::Byte(0xAB), &[0x00, 0x02, 0xAB]),
            (ParamValue::Short(-2), &[0x00, 0x03, 0xFF, 0xFE]),
            (ParamValue::Int(42), &[0x00, 0x04, 0x00, 0x00, 0x00, 0x2A]),
            (
                ParamValue::Long(1),
                &[0x00, 0x05, 0, 0, 0, 0, 0, 0, 0, 0x01],
            ),
            (ParamValue::Float(1.0), &[0x00, 0x06, 0x3F, 0x80, 0x00, 0x00]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            value.encode(&mut buf).unwrap();
            assert_eq!(&buf[..], expected, "layout of {value}");
            roundtrip(value);
        }
        roundtrip(ParamValue::Double(-0.5));
    }

    #[test]
    fn string_and_string_array_roundtrip() {
        roundtrip(ParamValue::from("foo"));
        roundtrip(ParamValue::from(""));
        roundtrip(ParamValue::Array(ParamArray::String(vec![
            "a".into(),
            "bcd".into(),
            String::new(),
        ])));
        roundtrip(ParamValue::Array(ParamArray::String(vec![])));
    }

    #[test]
    fn decodes_string_array_bytes() {
        let data = [
            0x00, 0x08, 0x00, 0x08, 0x00, 0x03, // array of arrays, 3 elements
            0x00, 0x01, 0x00, 0x01, b'a', //
            0x00, 0x01, 0x00, 0x03, b'b', b'c', b'd', //
            0x00, 0x01, 0x00, 0x00,
        ];
        let value = ParamValue::decode(&mut &data[..]).unwrap();
        assert_eq!(
            value,
            ParamValue::Array(ParamArray::String(vec![
                "a".into(),
                "bcd".into(),
                String::new()
            ]))
        );
    }

    #[test]
    fn string_array_rejects_non_char_element() {
        let data = [
            0x00, 0x08, 0x00, 0x08, 0x00, 0x01, //
            0x00, 0x04, 0x00, 0x00, 0x00, 0x01,
        ];
        assert_eq!(
            ParamValue::decode(&mut &data[..]),
            Err(CodecError::InvalidArrayElement(4))
        );
    }

    #[test]
    fn typed_arrays_roundtrip() {
        roundtrip(ParamValue::Array(ParamArray::Boolean(vec![true, false])));
        roundtrip(ParamValue::Array(ParamArray::Byte(vec![1, 2, 255])));
        roundtrip(ParamValue::Array(ParamArray::Short(vec![-1, 7])));
        roundtrip(ParamValue::Array(ParamArray::Int(vec![])));
        roundtrip(ParamValue::Array(ParamArray::Long(vec![i64::MIN, i64::MAX])));
        roundtrip(ParamValue::Array(ParamArray::Float(vec![0.25])));
        roundtrip(ParamValue::Array(ParamArray::Double(vec![1e300, -2.5])));
        roundtrip(ParamValue::Array(ParamArray::Struct(vec![
            Struct::new(ParamId::string(0, "a")).with_field("x", 1i32),
            Struct::new(ParamId::numeric(1, 9)),
        ])));
    }

    #[test]
    fn scalar_char_is_rejected() {
        let data = [0x00, 0x01, 0x00, 0x61];
        let mut cursor = &data[..];
        assert_eq!(ParamValue::decode(&mut cursor), Err(CodecError::CharScalar));
        assert_eq!(cursor.len(), data.len());
    }

    #[test]
    fn unknown_tag_and_truncation_fail() {
        assert_eq!(
            ParamValue::decode(&mut &[0x00, 0x0A, 0x00][..]),
            Err(CodecError::UnknownParamType(10))
        );
        assert!(matches!(
            ParamValue::decode(&mut &[0x00, 0x04, 0x00, 0x00][..]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            ParamValue::decode(&mut &[0x00, 0x08, 0x00, 0x04, 0x00, 0x02, 0, 0, 0, 1][..]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn failed_encode_leaves_buffer_untouched() {
        let mut buf = BytesMut::from(&b"keep"[..]);
        let value = ParamValue::Struct(
            Struct::new(ParamId::string(0, "s"))
                .with_field("ok", 1i32)
                .with_field("bad", "\u{263A}"),
        );
        assert!(matches!(
            value.encode(&mut buf),
            Err(CodecError::Unrepresentable(_))
        ));
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn display_forms() {
        assert_eq!(ParamValue::Byte(0xAB).to_string(), "0xAB");
        assert_eq!(
            ParamValue::Array(ParamArray::Int(vec![1, 2])).to_string(),
            "[1, 2]"
        );
        assert_eq!(ParamValue::from("x").to_string(), "\"x\"");
    }
}
