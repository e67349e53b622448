use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::Result;
use crate::param_id::ParamId;
use crate::value::ParamValue;
use crate::wire::{self, Envelope};

/// One named member of a [`Struct`]. The name is always encoded as a bare
/// (tag-less) string.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub value: ParamValue,
}

impl StructField {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn byte_count(&self) -> usize {
        wire::string_byte_count(&self.name, Envelope::Omitted) + self.value.byte_count()
    }
}

impl fmt::Display for StructField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Ordered aggregate of named fields.
///
/// Field order is kept as decoded and names may repeat.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    pub id: ParamId,
    pub fields: Vec<StructField>,
}

impl Struct {
    pub fn new(id: ParamId) -> Self {
        Self {
            id,
            fields: Vec::new(),
        }
    }

    /// Builder-style field append.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.push(StructField::new(name, value));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.fields.push(StructField::new(name, value));
    }

    /// First field with the given name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Size of the body (id, field count, fields) without a type tag.
    pub fn byte_count(&self) -> usize {
        self.id.byte_count() + 2 + self.fields.iter().map(StructField::byte_count).sum::<usize>()
    }

    pub(crate) fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        let count = wire::wire_len(self.fields.len(), "struct field")?;
        self.id.encode(dst)?;
        dst.put_u16(count);
        for field in &self.fields {
            wire::encode_string(&field.name, Envelope::Omitted, dst)?;
            field.value.encode(dst)?;
        }
        Ok(())
    }

    pub(crate) fn decode_body(src: &mut &[u8]) -> Result<Self> {
        let id = ParamId::decode(src)?;
        let count = wire::get_u16(src)? as usize;
        let mut fields = Vec::with_capacity(count.min(src.len()));
        for _ in 0..count {
            let name = wire::decode_string_body(src, Envelope::Omitted)?;
            let value = ParamValue::decode(src)?;
            fields.push(StructField { name, value });
        }
        Ok(Self { id, fields })
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{@id={}", self.id)?;
        for field in &self.fields {
            write!(f, ", {field}")?;
        }
        f.write_str("}")
    }
}
