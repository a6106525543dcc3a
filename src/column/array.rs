//! Array column.
//!
//! Wire layout: one u64 cumulative end-offset per row, then the flattened
//! inner elements. Offsets are non-decreasing; the final offset is the
//! total element count.

use super::{
    column_mut,
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

/// Column for variable-length arrays: flattened elements plus offsets.
pub struct ColumnArray {
    type_: Type,
    nested: ColumnRef,
    offsets: Vec<u64>,
}

impl ColumnArray {
    /// Create an empty column from an `Array(T)` descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let nested = match &type_ {
            Type::Array { item_type } => {
                crate::io::block_stream::create_column(item_type)?
            }
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnArray requires Array, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, nested, offsets: Vec::new() })
    }

    /// Wrap an existing inner column.
    pub fn with_nested(nested: ColumnRef) -> Self {
        let nested_type = nested.column_type().clone();
        Self { type_: Type::array(nested_type), nested, offsets: Vec::new() }
    }

    pub(crate) fn from_parts(type_: Type, nested: ColumnRef) -> Self {
        Self { type_, nested, offsets: Vec::new() }
    }

    /// Close the current row after `len` elements were appended to the
    /// inner column.
    pub fn append_len(&mut self, len: u64) {
        let end = self.offsets.last().copied().unwrap_or(0) + len;
        self.offsets.push(end);
    }

    /// Append an entire column's rows as one array row.
    pub fn append_array(&mut self, elements: ColumnRef) -> Result<()> {
        let len = elements.size() as u64;
        column_mut(&mut self.nested)?.append_column(elements)?;
        self.append_len(len);
        Ok(())
    }

    /// Element index range `[start, end)` of the row at `index`.
    pub fn range_at(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.offsets.len() {
            return None;
        }
        let end = self.offsets[index] as usize;
        let start =
            if index == 0 { 0 } else { self.offsets[index - 1] as usize };
        Some((start, end))
    }

    /// Element count of the row at `index`.
    pub fn len_at(&self, index: usize) -> Option<usize> {
        self.range_at(index).map(|(start, end)| end - start)
    }

    /// The row at `index` as a sliced inner column.
    pub fn at(&self, index: usize) -> Result<ColumnRef> {
        let (start, end) = self.range_at(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "array index out of bounds: {}",
                index
            ))
        })?;
        self.nested.slice(start, end - start)
    }

    /// The flattened inner column.
    pub fn nested(&self) -> &ColumnRef {
        &self.nested
    }

    /// Mutable access to the inner column reference.
    pub fn nested_mut(&mut self) -> &mut ColumnRef {
        &mut self.nested
    }

    /// The cumulative offsets.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl Column for ColumnArray {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        if let Ok(nested) = column_mut(&mut self.nested) {
            nested.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnArray>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.nested.column_type() != other.nested.column_type() {
            return Err(downcast_err(
                self.nested.column_type(),
                other.nested.column_type(),
            ));
        }

        let base = self.offsets.last().copied().unwrap_or(0);
        self.offsets.extend(other.offsets.iter().map(|o| base + o));
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
        buffer_utils::ensure(buffer, rows * 8, "array offsets")?;

        if !self.offsets.is_empty() {
            return Err(Error::Validation(
                "loading into a non-empty array column".to_string(),
            ));
        }

        self.offsets.reserve(rows);
        let mut prev = 0u64;
        for _ in 0..rows {
            let offset = buffer.get_u64_le();
            if offset < prev {
                return Err(Error::MalformedWire(format!(
                    "array offsets decrease: {} after {}",
                    offset, prev
                )));
            }
            prev = offset;
            self.offsets.push(offset);
        }

        let total = self.offsets.last().copied().unwrap_or(0) as usize;
        if total > 0 {
            column_mut(&mut self.nested)?.load_from_buffer(buffer, total)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.nested.save_to_buffer(buffer)?;
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnArray::from_parts(
            self.type_.clone(),
            self.nested.clone_empty(),
        ))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.offsets.len() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.offsets.len()
            )));
        }

        let elements_start =
            if begin == 0 { 0 } else { self.offsets[begin - 1] as usize };
        let elements_end = if len == 0 {
            elements_start
        } else {
            self.offsets[begin + len - 1] as usize
        };

        let mut result = ColumnArray::from_parts(
            self.type_.clone(),
            self.nested.slice(elements_start, elements_end - elements_start)?,
        );
        result.offsets = self.offsets[begin..begin + len]
            .iter()
            .map(|o| o - elements_start as u64)
            .collect();
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
    use crate::column::numeric::ColumnInt64;

    fn sample() -> ColumnArray {
        // [[1, 2], [], [3, 4, 5]]
        let mut inner = ColumnInt64::new();
        for v in [1, 2, 3, 4, 5] {
            inner.append(v);
        }
        let mut col = ColumnArray::with_nested(Arc::new(ColumnInt64::new()));
        col.nested = Arc::new(inner);
        col.offsets = vec![2, 2, 5];
        col
    }

    #[test]
    fn offsets_and_ranges() {
        let col = sample();
        assert_eq!(col.range_at(0), Some((0, 2)));
        assert_eq!(col.range_at(1), Some((2, 2)));
        assert_eq!(col.range_at(2), Some((2, 5)));
        assert_eq!(col.len_at(1), Some(0));
    }

    #[test]
    fn roundtrip() {
        let col = sample();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        // 3 offsets * 8 + 5 elements * 8
        assert_eq!(buf.len(), 24 + 40);

        let mut col2 =
            ColumnArray::new(Type::array(Type::int64())).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 3).unwrap();
        assert!(reader.is_empty());

        assert_eq!(col2.offsets(), &[2, 2, 5]);
        let row = col2.at(2).unwrap();
        let row = row.as_any().downcast_ref::<ColumnInt64>().unwrap();
        assert_eq!(row.data(), &[3, 4, 5]);
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(5);
        buf.put_u64_le(3);

        let mut col =
            ColumnArray::new(Type::array(Type::int64())).unwrap();
        let mut reader = &buf[..];
        assert!(matches!(
            col.load_from_buffer(&mut reader, 2),
            Err(Error::MalformedWire(_))
        ));
    }

    #[test]
    fn slice_rebases_offsets() {
        let col = sample();
        let sliced = Column::slice(&col, 1, 2).unwrap();
        let sliced = sliced.as_any().downcast_ref::<ColumnArray>().unwrap();

        assert_eq!(sliced.offsets(), &[0, 3]);
        let row = sliced.at(1).unwrap();
        let row = row.as_any().downcast_ref::<ColumnInt64>().unwrap();
        assert_eq!(row.data(), &[3, 4, 5]);
    }

    #[test]
    fn append_array_builds_offsets() {
        let mut col =
            ColumnArray::new(Type::array(Type::int64())).unwrap();

        let mut row = ColumnInt64::new();
        row.append(10);
        row.append(20);
        col.append_array(Arc::new(row)).unwrap();

        let empty = ColumnInt64::new();
        col.append_array(Arc::new(empty)).unwrap();

        assert_eq!(col.offsets(), &[2, 2]);
        assert_eq!(col.size(), 2);
    }
}
