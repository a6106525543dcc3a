//! IPv4 column.
//!
//! The wire carries 4 bytes little-endian, i.e. the network byte order of
//! the address reversed.

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
use std::{
    net::Ipv4Addr,
    sync::Arc,
};

/// Column for IPv4 addresses.
pub struct ColumnIpv4 {
    type_: Type,
    data: Vec<Ipv4Addr>,
}

impl ColumnIpv4 {
    /// Create an empty IPv4 column.
    pub fn new() -> Self {
        Self { type_: Type::ipv4(), data: Vec::new() }
    }

    /// Append one address.
    pub fn append(&mut self, value: Ipv4Addr) {
        self.data.push(value);
    }

    /// Address at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<Ipv4Addr> {
        self.data.get(index).copied()
    }

    /// Address at `index`; panics out of bounds.
    pub fn at(&self, index: usize) -> Ipv4Addr {
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

impl Default for ColumnIpv4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnIpv4 {
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
            .downcast_ref::<ColumnIpv4>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(buffer, rows * 4, "IPv4 data")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(Ipv4Addr::from(buffer.get_u32_le()));
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for addr in &self.data {
            buffer.put_u32_le(u32::from(*addr));
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnIpv4::new())
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
        let mut result = ColumnIpv4::new();
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
