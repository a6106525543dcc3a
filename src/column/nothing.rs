//! Nothing column, produced by NULL literals. One placeholder byte per
//! row on the wire.

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
    BytesMut,
};
use std::sync::Arc;

/// Column holding only a row count; every value is NULL.
pub struct ColumnNothing {
    type_: Type,
    rows: usize,
}

impl ColumnNothing {
    /// Create an empty Nothing column.
    pub fn new() -> Self {
        Self { type_: Type::nothing(), rows: 0 }
    }

    /// Append one (null) row.
    pub fn append(&mut self) {
        self.rows += 1;
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

impl Default for ColumnNothing {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnNothing {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        self.rows = 0;
    }

    fn reserve(&mut self, _additional: usize) {}

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnNothing>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.rows += other.rows;
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(buffer, rows, "Nothing data")?;
        buffer.advance(rows);
        self.rows += rows;
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.resize(buffer.len() + self.rows, 0);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnNothing::new())
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.rows {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin, len, self.rows
            )));
        }
        let mut result = ColumnNothing::new();
        result.rows = len;
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
