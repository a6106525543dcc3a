//! JSON column, string serialisation only.
//!
//! The server prefixes the column with a u64 serialisation version. Version
//! 1 serialises each row as a length-prefixed JSON document string; this is
//! the only version the client materialises. The object serialisations
//! (versions 0 and 3) cannot be decoded without the server's full object
//! format and are rejected with [`Error::UnsupportedJsonSerialization`];
//! callers should enable `output_format_native_write_json_as_string`.

use super::{
    downcast_err,
    Column,
    ColumnRef,
};
use crate::{
    io::buffer_utils,
    types::Type,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::sync::Arc;

const STRING_SERIALIZATION_VERSION: u64 = 1;

/// Column of JSON documents carried as strings.
pub struct ColumnJson {
    type_: Type,
    data: Vec<String>,
}

impl ColumnJson {
    /// Create an empty JSON column.
    pub fn new() -> Self {
        Self { type_: Type::json(), data: Vec::new() }
    }

    /// Append a raw JSON document string. The text is not validated here.
    pub fn append_raw(&mut self, document: impl Into<String>) {
        self.data.push(document.into());
    }

    /// Append a JSON value, serialising it to its compact text form.
    pub fn append(&mut self, value: &serde_json::Value) {
        self.data.push(value.to_string());
    }

    /// Raw document text at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(|s| s.as_str())
    }

    /// Parsed document at `index`.
    pub fn value_at(&self, index: usize) -> Option<Result<serde_json::Value>> {
        let raw = self.data.get(index)?;
        Some(serde_json::from_str(raw).map_err(|e| {
            Error::MalformedWire(format!("invalid JSON document: {}", e))
        }))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for ColumnJson {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnJson {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnJson>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.data.extend(other.data.iter().cloned());
        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        buffer_utils::ensure(buffer, 8, "JSON serialization version")?;
        let version = buffer.get_u64_le();
        if version != STRING_SERIALIZATION_VERSION {
            return Err(Error::UnsupportedJsonSerialization(version));
        }
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        self.data.reserve(rows);
        for _ in 0..rows {
            let len = buffer_utils::read_varint(buffer)? as usize;
            buffer_utils::ensure(buffer, len, "JSON document")?;
            let s = std::str::from_utf8(&buffer[..len])?.to_string();
            self.data.push(s);
            buffer.advance(len);
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(STRING_SERIALIZATION_VERSION);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for s in &self.data {
            buffer_utils::write_varint(buffer, s.len() as u64);
            buffer.put_slice(s.as_bytes());
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnJson::new())
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.data.len() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.data.len()
            )));
        }
        let mut result = ColumnJson::new();
        result.data = self.data[begin..begin + len].to_vec();
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
