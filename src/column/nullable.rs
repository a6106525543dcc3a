//! Nullable column.
//!
//! Wire layout: one null-bitmap byte per row (1 = null, 0 = present),
//! followed by the full inner payload. The payload carries real bytes for
//! null slots too (zero-filled placeholders), and is read and written in
//! full.

use super::{
    column_mut,
    column_value::{
        append_column_item,
        append_default_item,
        ColumnValue,
    },
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

/// Column for nullable values: an inner column plus a null bitmap.
pub struct ColumnNullable {
    type_: Type,
    nested: ColumnRef,
    nulls: Vec<u8>,
}

impl ColumnNullable {
    /// Create an empty column from a `Nullable(T)` descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let nested = match &type_ {
            Type::Nullable { nested_type } => {
                crate::io::block_stream::create_column(nested_type)?
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnNullable requires Nullable, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, nested, nulls: Vec::new() })
    }

    /// Wrap an existing inner column.
    pub fn with_nested(nested: ColumnRef) -> Self {
        let nested_type = nested.column_type().clone();
        Self { type_: Type::nullable(nested_type), nested, nulls: Vec::new() }
    }

    /// Append a null row; the inner column receives a zero-filled
    /// placeholder to keep indices aligned.
    pub fn append_null(&mut self) -> Result<()> {
        let inner_type = self.nested.column_type().clone();
        append_default_item(column_mut(&mut self.nested)?, &inner_type)?;
        self.nulls.push(1);
        Ok(())
    }

    /// Append a present value.
    pub fn append_value(&mut self, value: &ColumnValue) -> Result<()> {
        append_column_item(column_mut(&mut self.nested)?, value)?;
        self.nulls.push(0);
        Ok(())
    }

    /// Mark the next row null without touching the inner column. The
    /// caller must keep the inner column aligned.
    pub fn push_null_flag(&mut self, is_null: bool) {
        self.nulls.push(if is_null { 1 } else { 0 });
    }

    /// Whether the row at `index` is null.
    pub fn is_null(&self, index: usize) -> bool {
        index < self.nulls.len() && self.nulls[index] != 0
    }

    /// The inner column, placeholders included.
    pub fn nested(&self) -> &ColumnRef {
        &self.nested
    }

    /// Mutable access to the inner column reference.
    pub fn nested_mut(&mut self) -> &mut ColumnRef {
        &mut self.nested
    }

    /// The null bitmap, one byte per row.
    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }
}

impl Column for ColumnNullable {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.nulls.len()
    }

    fn clear(&mut self) {
        self.nulls.clear();
        // The inner data must go too, or the column would be corrupt.
        if let Ok(nested) = column_mut(&mut self.nested) {
            nested.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.nulls.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnNullable>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.nested.column_type() != other.nested.column_type() {
            return Err(downcast_err(
                self.nested.column_type(),
                other.nested.column_type(),
            ));
        }

        self.nulls.extend_from_slice(&other.nulls);
        column_mut(&mut self.nested)?.append_column(other.nested.clone())?;
        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        column_mut(&mut self.nested)?.load_prefix(buffer)
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(buffer, rows, "null bitmap")?;
        self.nulls.extend_from_slice(&buffer[..rows]);
        buffer.advance(rows);

        if rows > 0 {
            column_mut(&mut self.nested)?.load_from_buffer(buffer, rows)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.nulls);
        self.nested.save_to_buffer(buffer)?;
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnNullable::with_nested(self.nested.clone_empty()))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.nulls.len() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.nulls.len()
            )));
        }

        let mut result =
            ColumnNullable::with_nested(self.nested.slice(begin, len)?);
        result.nulls = self.nulls[begin..begin + len].to_vec();
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::numeric::ColumnUInt32;

    #[test]
    fn bitmap_then_payload() {
        let mut col =
            ColumnNullable::new(Type::nullable(Type::uint32())).unwrap();
        col.append_value(&ColumnValue::from_u32(7)).unwrap();
        col.append_null().unwrap();
        col.append_value(&ColumnValue::from_u32(9)).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        // 3 bitmap bytes + 3 u32 payload slots, placeholder included.
        assert_eq!(buf.len(), 3 + 12);
        assert_eq!(&buf[..3], &[0, 1, 0]);
    }

    #[test]
    fn roundtrip_preserves_nulls() {
        let mut col =
            ColumnNullable::new(Type::nullable(Type::uint32())).unwrap();
        col.append_value(&ColumnValue::from_u32(1)).unwrap();
        col.append_null().unwrap();
        col.append_value(&ColumnValue::from_u32(3)).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 =
            ColumnNullable::new(Type::nullable(Type::uint32())).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 3).unwrap();
        assert!(reader.is_empty());

        assert!(!col2.is_null(0));
        assert!(col2.is_null(1));
        assert!(!col2.is_null(2));

        let inner =
            col2.nested().as_any().downcast_ref::<ColumnUInt32>().unwrap();
        assert_eq!(inner.at(0), 1);
        assert_eq!(inner.at(2), 3);
    }

    #[test]
    fn nullable_string_placeholders_are_empty() {
        let mut col =
            ColumnNullable::new(Type::nullable(Type::string())).unwrap();
        col.append_value(&ColumnValue::from_string("x")).unwrap();
        col.append_null().unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        // bitmap [0, 1], then "x" (varint 1 + byte), then empty string
        // (varint 0).
        assert_eq!(&buf[..], &[0, 1, 1, b'x', 0]);
    }

    #[test]
    fn truncated_bitmap_is_malformed() {
        let buf = [0u8; 2];
        let mut col =
            ColumnNullable::new(Type::nullable(Type::uint8())).unwrap();
        let mut reader = &buf[..];
        assert!(col.load_from_buffer(&mut reader, 5).is_err());
    }
}
