//! Column buffers for every supported ClickHouse type.
//!
//! Each column type implements [`Column`]: loading from and saving to
//! in-memory byte buffers in the native wire layout, slicing, and erased
//! downcasting. Skipping over columns without materialising them lives in
//! [`skip`].
//!
//! Nesting rules enforced by the server and assumed here:
//! `Nullable(Array(...))` and `Nullable(LowCardinality(...))` are invalid;
//! the valid orders are `Array(Nullable(T))`, `Array(LowCardinality(T))`
//! and `LowCardinality(Nullable(T))`.

/// Array column type (`Array(T)`).
pub mod array;
/// Type-erased scalar values used by dictionaries and bulk insert.
pub mod column_value;
/// Date, Date32, DateTime and DateTime64 column types.
pub mod date;
/// Decimal column type covering all mantissa widths.
pub mod decimal;
/// Enum8 and Enum16 column types.
pub mod enum_column;
/// IPv4 column type.
pub mod ipv4;
/// IPv6 column type.
pub mod ipv6;
/// JSON column type (string serialisation).
pub mod json;
/// LowCardinality column type (dictionary encoding).
pub mod lowcardinality;
/// Map column type (`Map(K, V)`).
pub mod map;
/// Nothing column type.
pub mod nothing;
/// Nullable column type (`Nullable(T)`).
pub mod nullable;
/// Numeric column types (integers up to 256 bits, floats, bool).
pub mod numeric;
/// Skippers: advance past a column without materialising it.
pub mod skip;
/// String and FixedString column types, eager and lazy.
pub mod string;
/// Tuple column type (`Tuple(T1, T2, ...)`, named tuples, Nested).
pub mod tuple;
/// UUID column type.
pub mod uuid;

pub use array::ColumnArray;
pub use date::{
    ColumnDate,
    ColumnDate32,
    ColumnDateTime,
    ColumnDateTime64,
};
pub use decimal::ColumnDecimal;
pub use enum_column::{
    ColumnEnum16,
    ColumnEnum8,
};
pub use ipv4::ColumnIpv4;
pub use ipv6::ColumnIpv6;
pub use json::ColumnJson;
pub use lowcardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::*;
pub use string::{
    ColumnFixedString,
    ColumnString,
    ColumnStringLazy,
};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;

use crate::{
    types::Type,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// Reference to a column; cheap to clone.
pub type ColumnRef = Arc<dyn Column>;

/// Base trait for all column types.
///
/// Works over in-memory byte buffers rather than generic readers so the
/// trait stays dyn-compatible; the message layer owns the transport.
pub trait Column: Send + Sync {
    /// The descriptor of this column.
    fn column_type(&self) -> &Type;

    /// Number of rows in this column.
    fn size(&self) -> usize;

    /// Remove all rows.
    fn clear(&mut self);

    /// Reserve capacity for at least `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Append another column's rows to this column.
    fn append_column(&mut self, other: ColumnRef) -> Result<()>;

    /// Read the column's serialisation prefix (version headers and the
    /// like). Containers delegate to their inner columns; most types have
    /// none.
    fn load_prefix(&mut self, _buffer: &mut &[u8]) -> Result<()> {
        Ok(())
    }

    /// Read `rows` rows of column payload from the buffer.
    fn load_from_buffer(&mut self, buffer: &mut &[u8], rows: usize)
        -> Result<()>;

    /// Write the column's serialisation prefix.
    fn save_prefix(&self, _buffer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    /// Write the column payload for all rows.
    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()>;

    /// An empty column of the same type.
    fn clone_empty(&self) -> ColumnRef;

    /// A copy of rows `[begin, begin + len)`.
    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef>;

    /// Downcast support.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Typed access for columns with a single element type.
pub trait ColumnTyped<T>: Column {
    /// Value at `index`, if in bounds.
    fn get(&self, index: usize) -> Option<T>;

    /// Append one value.
    fn append(&mut self, value: T);
}

pub(crate) fn downcast_err(expected: &Type, got: &Type) -> crate::Error {
    crate::Error::TypeMismatch {
        expected: expected.name(),
        actual: got.name(),
    }
}

/// Mutable access to an `Arc`'d column, failing when it is shared.
pub(crate) fn column_mut(column: &mut ColumnRef) -> Result<&mut (dyn Column + '_)> {
    match Arc::get_mut(column) {
        Some(c) => Ok(c),
        None => Err(crate::Error::Validation(
            "cannot mutate a shared column; it has other references".to_string(),
        )),
    }
}
