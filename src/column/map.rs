//! Map column.
//!
//! `Map(K, V)` is wire-identical to `Array(Tuple(K, V))`: one u64
//! cumulative offset per row, then the keys column in full, then the
//! values column in full. Per-row maps are recovered by slicing both
//! inner columns by the offsets.

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

/// Column for key-value maps: offsets plus flattened key and value
/// columns.
pub struct ColumnMap {
    type_: Type,
    keys: ColumnRef,
    values: ColumnRef,
    offsets: Vec<u64>,
}

impl ColumnMap {
    /// Create an empty column from a `Map(K, V)` descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let (keys, values) = match &type_ {
            Type::Map { key_type, value_type } => (
                crate::io::block_stream::create_column(key_type)?,
                crate::io::block_stream::create_column(value_type)?,
            ),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnMap requires Map, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, keys, values, offsets: Vec::new() })
    }

    /// Close the current row after `len` entries were appended to the key
    /// and value columns.
    pub fn append_len(&mut self, len: u64) {
        let end = self.offsets.last().copied().unwrap_or(0) + len;
        self.offsets.push(end);
    }

    /// Entry index range `[start, end)` of the row at `index`.
    pub fn range_at(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.offsets.len() {
            return None;
        }
        let end = self.offsets[index] as usize;
        let start =
            if index == 0 { 0 } else { self.offsets[index - 1] as usize };
        Some((start, end))
    }

    /// The row at `index` as (keys, values) column slices.
    pub fn at(&self, index: usize) -> Result<(ColumnRef, ColumnRef)> {
        let (start, end) = self.range_at(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "map index out of bounds: {}",
                index
            ))
        })?;
        Ok((
            self.keys.slice(start, end - start)?,
            self.values.slice(start, end - start)?,
        ))
    }

    /// The flattened keys column.
    pub fn keys(&self) -> &ColumnRef {
        &self.keys
    }

    /// The flattened values column.
    pub fn values(&self) -> &ColumnRef {
        &self.values
    }

    /// Mutable access to the flattened keys column.
    pub fn keys_mut(&mut self) -> &mut ColumnRef {
        &mut self.keys
    }

    /// Mutable access to the flattened values column.
    pub fn values_mut(&mut self) -> &mut ColumnRef {
        &mut self.values
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

    pub(crate) fn from_parts(
        type_: Type,
        keys: ColumnRef,
        values: ColumnRef,
    ) -> Self {
        Self { type_, keys, values, offsets: Vec::new() }
    }
}

impl Column for ColumnMap {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        if let Ok(keys) = column_mut(&mut self.keys) {
            keys.clear();
        }
        if let Ok(values) = column_mut(&mut self.values) {
            values.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnMap>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.type_ != other.type_ {
            return Err(downcast_err(&self.type_, &other.type_));
        }

        let base = self.offsets.last().copied().unwrap_or(0);
        self.offsets.extend(other.offsets.iter().map(|o| base + o));
        column_mut(&mut self.keys)?.append_column(other.keys.clone())?;
        column_mut(&mut self.values)?.append_column(other.values.clone())?;
        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        column_mut(&mut self.keys)?.load_prefix(buffer)?;
        column_mut(&mut self.values)?.load_prefix(buffer)
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(buffer, rows * 8, "map offsets")?;

        if !self.offsets.is_empty() {
            return Err(Error::Validation(
                "loading into a non-empty map column".to_string(),
            ));
        }

        self.offsets.reserve(rows);
        let mut prev = 0u64;
        for _ in 0..rows {
            let offset = buffer.get_u64_le();
            if offset < prev {
                return Err(Error::MalformedWire(format!(
                    "map offsets decrease: {} after {}",
                    offset, prev
                )));
            }
            prev = offset;
            self.offsets.push(offset);
        }

        let total = self.offsets.last().copied().unwrap_or(0) as usize;
        if total > 0 {
            column_mut(&mut self.keys)?.load_from_buffer(buffer, total)?;
            column_mut(&mut self.values)?.load_from_buffer(buffer, total)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.keys.save_prefix(buffer)?;
        self.values.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.keys.save_to_buffer(buffer)?;
        self.values.save_to_buffer(buffer)?;
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnMap::from_parts(
            self.type_.clone(),
            self.keys.clone_empty(),
            self.values.clone_empty(),
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

        let start =
            if begin == 0 { 0 } else { self.offsets[begin - 1] as usize };
        let end = if len == 0 {
            start
        } else {
            self.offsets[begin + len - 1] as usize
        };

        let mut result = ColumnMap::from_parts(
            self.type_.clone(),
            self.keys.slice(start, end - start)?,
            self.values.slice(start, end - start)?,
        );
        result.offsets = self.offsets[begin..begin + len]
            .iter()
            .map(|o| o - start as u64)
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
