//! Tuple and Nested columns.
//!
//! `Tuple(T1, ..., Tk)` serialises its k inner columns one after another,
//! each in full across all rows; there is no per-row framing. The named
//! tuple form only changes the descriptor. `Nested(n1 T1, ...)` is
//! wire-identical to `Tuple(Array(T1), ...)` and is represented by the
//! same column with Array-wrapped fields.

use super::{
    column_mut,
    downcast_err,
    Column,
    ColumnRef,
};
use crate::{
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// Column of heterogeneous inner columns, concatenated in declaration
/// order.
pub struct ColumnTuple {
    type_: Type,
    columns: Vec<ColumnRef>,
}

impl ColumnTuple {
    /// Create an empty column from a `Tuple(...)` or `Nested(...)`
    /// descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let columns = match &type_ {
            Type::Tuple { item_types, .. } => item_types
                .iter()
                .map(crate::io::block_stream::create_column)
                .collect::<Result<Vec<_>>>()?,
            // Nested fields are implicitly Array-wrapped on the wire.
            Type::Nested { item_types, .. } => item_types
                .iter()
                .map(|t| {
                    crate::io::block_stream::create_column(&Type::array(
                        t.clone(),
                    ))
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnTuple requires Tuple or Nested, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, columns })
    }

    /// Wrap existing element columns with an explicit descriptor.
    pub fn from_columns(type_: Type, columns: Vec<ColumnRef>) -> Self {
        Self { type_, columns }
    }

    /// The element columns.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Element column at `index`.
    pub fn column(&self, index: usize) -> Option<&ColumnRef> {
        self.columns.get(index)
    }

    /// Element column by field name, for named tuples and Nested.
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnRef> {
        let names = match &self.type_ {
            Type::Tuple { field_names, .. } => field_names,
            Type::Nested { field_names, .. } => field_names,
            _ => return None,
        };
        let index = names.iter().position(|n| n == name)?;
        self.columns.get(index)
    }

    /// Mutable access to the element columns.
    pub fn columns_mut(&mut self) -> &mut Vec<ColumnRef> {
        &mut self.columns
    }

    /// Number of element columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

impl Column for ColumnTuple {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.columns.first().map(|c| c.size()).unwrap_or(0)
    }

    fn clear(&mut self) {
        for column in &mut self.columns {
            if let Ok(column) = column_mut(column) {
                column.clear();
            }
        }
    }

    fn reserve(&mut self, additional: usize) {
        for column in &mut self.columns {
            if let Ok(column) = column_mut(column) {
                column.reserve(additional);
            }
        }
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnTuple>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.type_ != other.type_ {
            return Err(downcast_err(&self.type_, &other.type_));
        }

        for (mine, theirs) in self.columns.iter_mut().zip(&other.columns) {
            column_mut(mine)?.append_column(theirs.clone())?;
        }
        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        for column in &mut self.columns {
            column_mut(column)?.load_prefix(buffer)?;
        }
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        for column in &mut self.columns {
            column_mut(column)?.load_from_buffer(buffer, rows)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_prefix(buffer)?;
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_to_buffer(buffer)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnTuple::from_columns(
            self.type_.clone(),
            self.columns.iter().map(|c| c.clone_empty()).collect(),
        ))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.size() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.size()
            )));
        }

        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(begin, len))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(ColumnTuple::from_columns(self.type_.clone(), columns)))
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
    use crate::column::{
        array::ColumnArray,
        numeric::{
            ColumnInt64,
            ColumnUInt8,
        },
        string::ColumnString,
    };

    fn sample_type() -> Type {
        Type::tuple(vec![Type::uint8(), Type::string()])
    }

    fn sample() -> ColumnTuple {
        let mut ids = ColumnUInt8::new();
        ids.append(1);
        ids.append(2);

        let mut names = ColumnString::new();
        names.append("one");
        names.append("two");

        ColumnTuple::from_columns(
            sample_type(),
            vec![Arc::new(ids), Arc::new(names)],
        )
    }

    #[test]
    fn columns_are_concatenated_in_order() {
        let col = sample();
        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        // Both u8 rows first, then both strings.
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(&buf[2..], &[3, b'o', b'n', b'e', 3, b't', b'w', b'o']);
    }

    #[test]
    fn roundtrip() {
        let col = sample();
        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnTuple::new(sample_type()).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();
        assert!(reader.is_empty());
        assert_eq!(col2.size(), 2);

        let names = col2.column(1).unwrap();
        let names = names.as_any().downcast_ref::<ColumnString>().unwrap();
        assert_eq!(names.get(0), Some("one"));
        assert_eq!(names.get(1), Some("two"));
    }

    #[test]
    fn named_field_lookup() {
        let type_ = Type::Tuple {
            item_types: vec![Type::uint8(), Type::string()],
            field_names: vec!["id".into(), "name".into()],
        };
        let col = ColumnTuple::new(type_).unwrap();
        assert!(col.column_by_name("name").is_some());
        assert!(col.column_by_name("missing").is_none());
    }

    #[test]
    fn nested_lowers_to_arrays() {
        let type_ = Type::Nested {
            field_names: vec!["n".into(), "s".into()],
            item_types: vec![Type::int64(), Type::string()],
        };
        let col = ColumnTuple::new(type_).unwrap();
        assert_eq!(col.width(), 2);
        assert!(col.column(0)
            .unwrap()
            .as_any()
            .downcast_ref::<ColumnArray>()
            .is_some());

        // Round-trip one row of [[7], ["x"]].
        let mut col = col;
        {
            let numbers = column_mut(&mut col.columns_mut()[0]).unwrap();
            let numbers =
                numbers.as_any_mut().downcast_mut::<ColumnArray>().unwrap();
            let mut row = ColumnInt64::new();
            row.append(7);
            numbers.append_array(Arc::new(row)).unwrap();
        }
        {
            let strings = column_mut(&mut col.columns_mut()[1]).unwrap();
            let strings =
                strings.as_any_mut().downcast_mut::<ColumnArray>().unwrap();
            let mut row = ColumnString::new();
            row.append("x");
            strings.append_array(Arc::new(row)).unwrap();
        }
        assert_eq!(col.size(), 1);
    }
}
