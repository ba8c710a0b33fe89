//! Field-level metadata.
//!
//! Docs and structured parameters that have no native descriptor slot travel
//! in the `confluent.field_meta` extension of `FieldOptions`:
//!
//! ```text
//! message Meta {
//!   string doc = 1;
//!   map<string, string> params = 2;
//! }
//! extend google.protobuf.FieldOptions { Meta field_meta = 1088; }
//! ```
//!
//! The extension is kept as an unknown field, so no generated code for it is
//! needed on either side.

use crate::error::{ConversionError, Result};
use protobuf::descriptor::FieldOptions;
use protobuf::reflect::FieldDescriptor;
use protobuf::UnknownValueRef;
use protobuf::{CodedInputStream, CodedOutputStream};

/// Extension number of `confluent.field_meta`.
pub const FIELD_META_EXTENSION: u32 = 1088;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMeta {
    pub doc: Option<String>,
    /// Parameters in insertion order.
    pub params: Vec<(String, String)>,
}

impl FieldMeta {
    pub fn is_empty(&self) -> bool {
        self.doc.is_none() && self.params.is_empty()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut os = CodedOutputStream::vec(&mut buf);
            if let Some(doc) = &self.doc {
                os.write_string(1, doc)?;
            }
            for (key, value) in &self.params {
                let mut entry = Vec::new();
                {
                    let mut entry_os = CodedOutputStream::vec(&mut entry);
                    entry_os.write_string(1, key)?;
                    entry_os.write_string(2, value)?;
                    entry_os.flush()?;
                }
                os.write_bytes(2, &entry)?;
            }
            os.flush()?;
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut meta = FieldMeta::default();
        let mut is = CodedInputStream::from_bytes(bytes);
        while let Some(tag) = is.read_raw_tag_or_eof()? {
            match (tag >> 3, tag & 7) {
                (1, WIRE_LENGTH_DELIMITED) => meta.doc = Some(is.read_string()?),
                (2, WIRE_LENGTH_DELIMITED) => {
                    let entry = is.read_bytes()?;
                    meta.params.push(decode_entry(&entry)?);
                }
                (_, wire_type) => skip(&mut is, wire_type)?,
            }
        }
        Ok(meta)
    }

    /// Metadata stored on a field's options, if any.
    pub fn read(options: &FieldOptions) -> Result<Option<Self>> {
        match options.special_fields.unknown_fields().get(FIELD_META_EXTENSION) {
            Some(UnknownValueRef::LengthDelimited(bytes)) => Ok(Some(Self::decode(bytes)?)),
            _ => Ok(None),
        }
    }

    pub fn of_field(field: &FieldDescriptor) -> Result<Option<Self>> {
        match field.proto().options.as_ref() {
            Some(options) => Self::read(options),
            None => Ok(None),
        }
    }

    pub fn write(&self, options: &mut FieldOptions) -> Result<()> {
        let bytes = self.encode()?;
        options
            .special_fields
            .mut_unknown_fields()
            .add_length_delimited(FIELD_META_EXTENSION, bytes);
        Ok(())
    }
}

fn decode_entry(bytes: &[u8]) -> Result<(String, String)> {
    let mut key = String::new();
    let mut value = String::new();
    let mut is = CodedInputStream::from_bytes(bytes);
    while let Some(tag) = is.read_raw_tag_or_eof()? {
        match (tag >> 3, tag & 7) {
            (1, WIRE_LENGTH_DELIMITED) => key = is.read_string()?,
            (2, WIRE_LENGTH_DELIMITED) => value = is.read_string()?,
            (_, wire_type) => skip(&mut is, wire_type)?,
        }
    }
    Ok((key, value))
}

fn skip(is: &mut CodedInputStream<'_>, wire_type: u32) -> Result<()> {
    match wire_type {
        WIRE_VARINT => {
            is.read_raw_varint64()?;
        }
        WIRE_FIXED64 => {
            is.read_raw_little_endian64()?;
        }
        WIRE_LENGTH_DELIMITED => {
            is.read_bytes()?;
        }
        WIRE_FIXED32 => {
            is.read_raw_little_endian32()?;
        }
        other => {
            return Err(ConversionError::DescriptorValidation(format!(
                "unsupported wire type {other} in field metadata"
            )))
        }
    }
    Ok(())
}
