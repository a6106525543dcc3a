//! UUID column.
//!
//! ClickHouse stores a UUID as two little-endian u64 halves: each 8-byte
//! half of the RFC 4122 representation is byte-reversed on the wire.

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
use uuid::Uuid;

fn to_wire(uuid: &Uuid) -> [u8; 16] {
    let rfc = uuid.as_bytes();
    let mut wire = [0u8; 16];
    for i in 0..8 {
        wire[i] = rfc[7 - i];
        wire[8 + i] = rfc[15 - i];
    }
    wire
}

fn from_wire(wire: &[u8]) -> Uuid {
    let mut rfc = [0u8; 16];
    for i in 0..8 {
        rfc[i] = wire[7 - i];
        rfc[8 + i] = wire[15 - i];
    }
    Uuid::from_bytes(rfc)
}

/// Column for UUID values.
pub struct ColumnUuid {
    type_: Type,
    data: Vec<Uuid>,
}

impl ColumnUuid {
    /// Create an empty UUID column.
    pub fn new() -> Self {
        Self { type_: Type::uuid(), data: Vec::new() }
    }

    /// Append one value.
    pub fn append(&mut self, value: Uuid) {
        self.data.push(value);
    }

    /// Value at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<Uuid> {
        self.data.get(index).copied()
    }

    /// Value at `index`; panics out of bounds.
    pub fn at(&self, index: usize) -> Uuid {
        self.data[index]
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

impl Default for ColumnUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnUuid {
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
            .downcast_ref::<ColumnUuid>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(buffer, rows * 16, "UUID data")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(from_wire(&buffer[..16]));
            buffer.advance(16);
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for uuid in &self.data {
            buffer.put_slice(&to_wire(uuid));
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnUuid::new())
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
        let mut result = ColumnUuid::new();
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
