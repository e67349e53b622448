//! Checked big-endian primitives over a byte cursor.
//!
//! Every getter verifies the remaining length before touching the cursor, so
//! a truncated input yields [`CodecError::Truncated`] instead of a panic.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CodecError, Result};
use crate::types::ParamType;

/// Whether the outer type tags of a string are on the wire.
///
/// Struct field names and the Event free-text message are always strings, so
/// their encoding skips the `Array` + `Char` tags and starts at the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Full,
    Omitted,
}

fn ensure(src: &[u8], needed: usize) -> Result<()> {
    if src.remaining() < needed {
        return Err(CodecError::Truncated {
            needed,
            remaining: src.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(src: &mut &[u8]) -> Result<u8> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

pub(crate) fn get_u16(src: &mut &[u8]) -> Result<u16> {
    ensure(src, 2)?;
    Ok(src.get_u16())
}

pub(crate) fn get_i16(src: &mut &[u8]) -> Result<i16> {
    ensure(src, 2)?;
    Ok(src.get_i16())
}

pub(crate) fn get_u32(src: &mut &[u8]) -> Result<u32> {
    ensure(src, 4)?;
    Ok(src.get_u32())
}

pub(crate) fn get_i32(src: &mut &[u8]) -> Result<i32> {
    ensure(src, 4)?;
    Ok(src.get_i32())
}

pub(crate) fn get_i64(src: &mut &[u8]) -> Result<i64> {
    ensure(src, 8)?;
    Ok(src.get_i64())
}

pub(crate) fn get_f32(src: &mut &[u8]) -> Result<f32> {
    ensure(src, 4)?;
    Ok(src.get_f32())
}

pub(crate) fn get_f64(src: &mut &[u8]) -> Result<f64> {
    ensure(src, 8)?;
    Ok(src.get_f64())
}

pub(crate) fn get_bytes<'a>(src: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    ensure(src, len)?;
    let (head, tail) = src.split_at(len);
    *src = tail;
    Ok(head)
}

pub(crate) fn get_tag(src: &mut &[u8]) -> Result<ParamType> {
    ParamType::from_u16(get_u16(src)?)
}

pub(crate) fn put_tag(dst: &mut BytesMut, tag: ParamType) {
    dst.put_u16(tag.as_u16());
}

/// Length of a wire collection, rejecting counts that do not fit the u16 field.
pub(crate) fn wire_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| CodecError::Unrepresentable(format!("{what} length {len} exceeds 65535")))
}

/// One byte per character; anything above U+00FF cannot be written.
pub fn latin1_encode(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                CodecError::Unrepresentable(format!("character {c:?} is outside 0x00-0xFF"))
            })
        })
        .collect()
}

pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Character count as it will appear on the wire.
pub fn latin1_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn encode_string(s: &str, envelope: Envelope, dst: &mut BytesMut) -> Result<()> {
    let raw = latin1_encode(s)?;
    let len = wire_len(raw.len(), "string")?;
    if envelope == Envelope::Full {
        put_tag(dst, ParamType::Array);
        put_tag(dst, ParamType::Char);
    }
    dst.put_u16(len);
    dst.put_slice(&raw);
    Ok(())
}

/// Reads a string. With a full envelope the leading `Array` tag must already
/// have been consumed by the caller; the `Char` element tag is read here.
pub(crate) fn decode_string_body(src: &mut &[u8], envelope: Envelope) -> Result<String> {
    if envelope == Envelope::Full {
        let element = get_u16(src)?;
        if element != ParamType::Char.as_u16() {
            return Err(CodecError::InvalidArrayElement(element));
        }
    }
    let len = get_u16(src)? as usize;
    Ok(latin1_decode(get_bytes(src, len)?))
}

pub(crate) fn string_byte_count(s: &str, envelope: Envelope) -> usize {
    let tags = match envelope {
        Envelope::Full => 4,
        Envelope::Omitted => 0,
    };
    tags + 2 + latin1_len(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_reads_do_not_advance() {
        let data = [0x01u8, 0x02, 0x03];
        let mut cursor = &data[..];
        let err = get_i32(&mut cursor).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                needed: 4,
                remaining: 3
            }
        );
        assert_eq!(cursor.len(), 3);
    }

    #[test]
    fn latin1_rejects_wide_chars() {
        assert_eq!(latin1_encode("\u{80}\u{ff}").unwrap(), vec![0x80, 0xFF]);
        assert!(matches!(
            latin1_encode("\u{100}"),
            Err(CodecError::Unrepresentable(_))
        ));
        assert_eq!(latin1_decode(&[0x61, 0xE9]), "a\u{e9}");
    }

    #[test]
    fn omitted_envelope_string_has_no_tags() {
        let mut buf = BytesMut::new();
        encode_string("ab", Envelope::Omitted, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x02, b'a', b'b']);
        assert_eq!(string_byte_count("ab", Envelope::Omitted), buf.len());

        let mut cursor = &buf[..];
        assert_eq!(
            decode_string_body(&mut cursor, Envelope::Omitted).unwrap(),
            "ab"
        );
        assert!(cursor.is_empty());
    }

    #[test]
    fn full_envelope_string_layout() {
        let mut buf = BytesMut::new();
        encode_string("hi", Envelope::Full, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x08, 0x00, 0x01, 0x00, 0x02, b'h', b'i']
        );
        assert_eq!(string_byte_count("hi", Envelope::Full), buf.len());
    }
}
