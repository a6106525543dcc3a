//! Numeric column implementations.
//!
//! All integers and floats are little-endian on the wire. `Bool` is one
//! byte per row, 0 or 1. 128- and 256-bit integers are stored as 16 and 32
//! little-endian bytes respectively.

use super::{
    downcast_err,
    Column,
    ColumnRef,
    ColumnTyped,
};
use crate::{
    types::{
        i256,
        u256,
        ToType,
        Type,
    },
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::sync::Arc;

/// Fixed-width scalars readable from and writable to in-memory buffers.
pub trait FixedSize: Sized + Copy + Send + Sync + 'static {
    /// Byte width on the wire.
    const WIDTH: usize;

    fn read_from(buffer: &mut &[u8]) -> Result<Self>;
    fn write_to(&self, buffer: &mut BytesMut);
}

macro_rules! impl_fixed_size {
    ($type:ty, $get:ident, $put:ident) => {
        impl FixedSize for $type {
            const WIDTH: usize = std::mem::size_of::<$type>();

            fn read_from(buffer: &mut &[u8]) -> Result<Self> {
                if buffer.len() < Self::WIDTH {
                    return Err(Error::MalformedWire(
                        "buffer underflow reading scalar".to_string(),
                    ));
                }
                Ok(buffer.$get())
            }

            fn write_to(&self, buffer: &mut BytesMut) {
                buffer.$put(*self);
            }
        }
    };
}

impl_fixed_size!(u8, get_u8, put_u8);
impl_fixed_size!(u16, get_u16_le, put_u16_le);
impl_fixed_size!(u32, get_u32_le, put_u32_le);
impl_fixed_size!(u64, get_u64_le, put_u64_le);
impl_fixed_size!(u128, get_u128_le, put_u128_le);
impl_fixed_size!(i8, get_i8, put_i8);
impl_fixed_size!(i16, get_i16_le, put_i16_le);
impl_fixed_size!(i32, get_i32_le, put_i32_le);
impl_fixed_size!(i64, get_i64_le, put_i64_le);
impl_fixed_size!(i128, get_i128_le, put_i128_le);
impl_fixed_size!(f32, get_f32_le, put_f32_le);
impl_fixed_size!(f64, get_f64_le, put_f64_le);

impl FixedSize for i256 {
    const WIDTH: usize = 32;

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 32 {
            return Err(Error::MalformedWire(
                "buffer underflow reading Int256".to_string(),
            ));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buffer[..32]);
        buffer.advance(32);
        Ok(i256::from_le_bytes(bytes))
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.to_le_bytes());
    }
}

impl FixedSize for u256 {
    const WIDTH: usize = 32;

    fn read_from(buffer: &mut &[u8]) -> Result<Self> {
        if buffer.len() < 32 {
            return Err(Error::MalformedWire(
                "buffer underflow reading UInt256".to_string(),
            ));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buffer[..32]);
        buffer.advance(32);
        Ok(u256::from_le_bytes(bytes))
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.to_le_bytes());
    }
}

/// Generic column over a fixed-width element type.
pub struct ColumnVector<T: FixedSize> {
    type_: Type,
    data: Vec<T>,
}

impl<T: FixedSize> ColumnVector<T> {
    /// Create an empty column with an explicit descriptor.
    pub fn with_type(type_: Type) -> Self {
        Self { type_, data: Vec::new() }
    }

    /// Create a column around existing data.
    pub fn from_vec(type_: Type, data: Vec<T>) -> Self {
        Self { type_, data }
    }

    /// Value at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Value at `index`; panics out of bounds.
    pub fn at(&self, index: usize) -> T {
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

    /// Append one value.
    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    /// Iterate over the values.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Borrow the backing slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }
}

impl<T: FixedSize + ToType> ColumnVector<T> {
    /// Create an empty column, inferring the descriptor from `T`.
    pub fn new() -> Self {
        Self { type_: T::to_type(), data: Vec::new() }
    }

    /// Create an empty column with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: T::to_type(), data: Vec::with_capacity(capacity) }
    }
}

impl<T: FixedSize + ToType> Default for ColumnVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FixedSize> Column for ColumnVector<T> {
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
            .downcast_ref::<ColumnVector<T>>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        // Bulk copy straight into the vector's tail; elementwise reads are
        // far too slow for wide blocks.
        let bytes_needed = rows * T::WIDTH;
        crate::io::buffer_utils::ensure(buffer, bytes_needed, "column data")?;

        let old_len = self.data.len();
        self.data.reserve(rows);

        unsafe {
            let dest =
                (self.data.as_mut_ptr() as *mut u8).add(old_len * T::WIDTH);
            std::ptr::copy_nonoverlapping(buffer.as_ptr(), dest, bytes_needed);
            self.data.set_len(old_len + rows);
        }

        buffer.advance(bytes_needed);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        if !self.data.is_empty() {
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    self.data.as_ptr() as *const u8,
                    self.data.len() * T::WIDTH,
                )
            };
            buffer.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnVector::<T>::with_type(self.type_.clone()))
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

        Ok(Arc::new(ColumnVector::<T>::from_vec(
            self.type_.clone(),
            self.data[begin..begin + len].to_vec(),
        )))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl<T: FixedSize> ColumnTyped<T> for ColumnVector<T> {
    fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    fn append(&mut self, value: T) {
        self.data.push(value);
    }
}

pub type ColumnUInt8 = ColumnVector<u8>;
pub type ColumnUInt16 = ColumnVector<u16>;
pub type ColumnUInt32 = ColumnVector<u32>;
pub type ColumnUInt64 = ColumnVector<u64>;
pub type ColumnUInt128 = ColumnVector<u128>;
pub type ColumnUInt256 = ColumnVector<u256>;

pub type ColumnInt8 = ColumnVector<i8>;
pub type ColumnInt16 = ColumnVector<i16>;
pub type ColumnInt32 = ColumnVector<i32>;
pub type ColumnInt64 = ColumnVector<i64>;
pub type ColumnInt128 = ColumnVector<i128>;
pub type ColumnInt256 = ColumnVector<i256>;

pub type ColumnFloat32 = ColumnVector<f32>;
pub type ColumnFloat64 = ColumnVector<f64>;

/// Bool columns share the UInt8 layout; the descriptor carries the
/// distinction.
pub type ColumnBool = ColumnVector<u8>;
