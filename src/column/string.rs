//! String and FixedString columns.
//!
//! `String` rows are varint-length-prefixed byte runs. Two materialisation
//! modes exist: [`ColumnString`] decodes every row into an owned heap
//! string up front, [`ColumnStringLazy`] copies all runs into one pooled
//! contiguous buffer plus per-row offset/length arrays and decodes on
//! access. Both write byte-identical output.
//!
//! `FixedString(N)` is exactly `N` bytes per row, zero-padded on write.

use super::{
    downcast_err,
    Column,
    ColumnRef,
};
use crate::{
    io::{
        buffer_utils,
        pool::{
            self,
            PooledBuffer,
        },
    },
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

/// Column for variable-length strings, eagerly decoded.
pub struct ColumnString {
    type_: Type,
    data: Vec<String>,
}

impl ColumnString {
    /// Create an empty string column.
    pub fn new() -> Self {
        Self { type_: Type::string(), data: Vec::new() }
    }

    /// Create an empty column with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: Type::string(), data: Vec::with_capacity(capacity) }
    }

    /// Create a column around existing rows.
    pub fn from_vec(data: Vec<String>) -> Self {
        Self { type_: Type::string(), data }
    }

    /// Append one row.
    pub fn append(&mut self, s: impl Into<String>) {
        self.data.push(s.into());
    }

    /// Row at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(|s| s.as_str())
    }

    /// Row at `index`; panics out of bounds.
    pub fn at(&self, index: usize) -> &str {
        &self.data[index]
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|s| s.as_str())
    }
}

impl Default for ColumnString {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnString {
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
            .downcast_ref::<ColumnString>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
        self.data.extend(other.data.iter().cloned());
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
            buffer_utils::ensure(buffer, len, "string row")?;

            let s = std::str::from_utf8(&buffer[..len])?.to_string();
            self.data.push(s);
            buffer.advance(len);
        }

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
        Arc::new(ColumnString::new())
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
        Ok(Arc::new(ColumnString::from_vec(
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

/// Column for variable-length strings backed by pooled storage.
///
/// Holds one contiguous byte buffer plus per-row offsets and lengths, all
/// three from the shared pools; they are released together when the column
/// drops, on any exit path. Rows decode on access.
pub struct ColumnStringLazy {
    type_: Type,
    bytes: PooledBuffer<u8>,
    offsets: PooledBuffer<u64>,
    lengths: PooledBuffer<u64>,
}

impl ColumnStringLazy {
    /// Create an empty lazy string column.
    pub fn new() -> Self {
        Self {
            type_: Type::string(),
            bytes: pool::byte_buffer(0),
            offsets: pool::offset_buffer(0),
            lengths: pool::offset_buffer(0),
        }
    }

    /// Raw bytes of the row at `index`, borrowed from the pooled buffer.
    pub fn bytes_at(&self, index: usize) -> Option<&[u8]> {
        let offset = *self.offsets.get(index)? as usize;
        let len = *self.lengths.get(index)? as usize;
        Some(&self.bytes[offset..offset + len])
    }

    /// Row at `index`, decoded on demand into an owned string.
    pub fn get(&self, index: usize) -> Option<Result<String>> {
        let bytes = self.bytes_at(index)?;
        Some(
            std::str::from_utf8(bytes)
                .map(|s| s.to_string())
                .map_err(Error::from),
        )
    }

    /// Append one row.
    pub fn append(&mut self, s: &str) {
        self.offsets.push(self.bytes.len() as u64);
        self.lengths.push(s.len() as u64);
        self.bytes.extend_from_slice(s.as_bytes());
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

impl Default for ColumnStringLazy {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnStringLazy {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.offsets.clear();
        self.lengths.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
        self.lengths.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnStringLazy>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        let base = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&other.bytes);
        self.offsets.extend(other.offsets.iter().map(|o| o + base));
        self.lengths.extend_from_slice(&other.lengths);
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        self.offsets.reserve(rows);
        self.lengths.reserve(rows);

        for _ in 0..rows {
            let len = buffer_utils::read_varint(buffer)? as usize;
            buffer_utils::ensure(buffer, len, "string row")?;

            // UTF-8 validity is checked here so access never fails on
            // decode; the copy itself is deferred-free.
            std::str::from_utf8(&buffer[..len])?;

            self.offsets.push(self.bytes.len() as u64);
            self.lengths.push(len as u64);
            self.bytes.extend_from_slice(&buffer[..len]);
            buffer.advance(len);
        }

        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for i in 0..self.len() {
            let bytes = self.bytes_at(i).expect("row in bounds");
            buffer_utils::write_varint(buffer, bytes.len() as u64);
            buffer.put_slice(bytes);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnStringLazy::new())
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.len() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.len()
            )));
        }

        let mut result = ColumnStringLazy::new();
        for i in begin..begin + len {
            let bytes = self.bytes_at(i).expect("row in bounds");
            result.offsets.push(result.bytes.len() as u64);
            result.lengths.push(bytes.len() as u64);
            result.bytes.extend_from_slice(bytes);
        }
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Column for fixed-length strings, zero-padded to `N` bytes per row.
pub struct ColumnFixedString {
    type_: Type,
    string_size: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    /// Create an empty column from a `FixedString(N)` descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let string_size = type_.fixed_string_size().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "ColumnFixedString requires FixedString, got {}",
                type_.name()
            ))
        })?;
        Ok(Self { type_, string_size, data: Vec::new() })
    }

    /// Append one row, padding with zero bytes.
    pub fn append(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > self.string_size {
            return Err(Error::InvalidArgument(format!(
                "value too long for FixedString({}): got {} bytes",
                self.string_size,
                bytes.len()
            )));
        }

        self.data.extend_from_slice(bytes);
        self.data
            .resize(self.data.len() + (self.string_size - bytes.len()), 0);
        Ok(())
    }

    /// Append one row of raw bytes, unpadded length must match exactly or
    /// be shorter.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.string_size {
            return Err(Error::InvalidArgument(format!(
                "value too long for FixedString({}): got {} bytes",
                self.string_size,
                bytes.len()
            )));
        }
        self.data.extend_from_slice(bytes);
        self.data
            .resize(self.data.len() + (self.string_size - bytes.len()), 0);
        Ok(())
    }

    /// Raw bytes of the row at `index`, including padding.
    pub fn bytes_at(&self, index: usize) -> Option<&[u8]> {
        if index >= self.size() {
            return None;
        }
        let start = index * self.string_size;
        Some(&self.data[start..start + self.string_size])
    }

    /// Row at `index` with trailing zero padding trimmed.
    pub fn get(&self, index: usize) -> Option<String> {
        let bytes = self.bytes_at(index)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).to_string())
    }

    /// The fixed byte width of each row.
    pub fn fixed_size(&self) -> usize {
        self.string_size
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.size()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Column for ColumnFixedString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len() / self.string_size
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(self.string_size * additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnFixedString>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.string_size != other.string_size {
            return Err(downcast_err(&self.type_, &other.type_));
        }

        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        let total = self.string_size * rows;
        buffer_utils::ensure(buffer, total, "FixedString data")?;

        self.data.extend_from_slice(&buffer[..total]);
        buffer.advance(total);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnFixedString::new(self.type_.clone())
                .expect("descriptor already validated"),
        )
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

        let mut result = ColumnFixedString::new(self.type_.clone())?;
        let start = begin * self.string_size;
        result
            .data
            .extend_from_slice(&self.data[start..start + len * self.string_size]);
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

    #[test]
    fn eager_roundtrip() {
        let mut col = ColumnString::new();
        col.append("hello");
        col.append("мир");
        col.append("");
        col.append("with\0nul");

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnString::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 4).unwrap();
        assert!(reader.is_empty());

        assert_eq!(col2.get(0), Some("hello"));
        assert_eq!(col2.get(1), Some("мир"));
        assert_eq!(col2.get(2), Some(""));
        assert_eq!(col2.get(3), Some("with\0nul"));
    }

    #[test]
    fn lazy_roundtrip() {
        let mut col = ColumnStringLazy::new();
        col.append("hello");
        col.append("");
        col.append("🦀");

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnStringLazy::new();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 3).unwrap();
        assert!(reader.is_empty());

        assert_eq!(col2.get(0).unwrap().unwrap(), "hello");
        assert_eq!(col2.get(1).unwrap().unwrap(), "");
        assert_eq!(col2.get(2).unwrap().unwrap(), "🦀");
        assert_eq!(col2.bytes_at(2).unwrap(), "🦀".as_bytes());
    }

    #[test]
    fn eager_and_lazy_write_identical_bytes() {
        let rows = ["", "hello", "embedded\0nul", "мир", "a"];

        let mut eager = ColumnString::new();
        let mut lazy = ColumnStringLazy::new();
        for r in rows {
            eager.append(r);
            lazy.append(r);
        }

        let mut eager_buf = BytesMut::new();
        eager.save_to_buffer(&mut eager_buf).unwrap();
        let mut lazy_buf = BytesMut::new();
        lazy.save_to_buffer(&mut lazy_buf).unwrap();

        assert_eq!(eager_buf, lazy_buf);
    }

    #[test]
    fn lazy_load_from_eager_bytes() {
        let mut eager = ColumnString::new();
        eager.append("one");
        eager.append("two");

        let mut buf = BytesMut::new();
        eager.save_to_buffer(&mut buf).unwrap();

        let mut lazy = ColumnStringLazy::new();
        let mut reader = &buf[..];
        lazy.load_from_buffer(&mut reader, 2).unwrap();

        assert_eq!(lazy.get(0).unwrap().unwrap(), "one");
        assert_eq!(lazy.get(1).unwrap().unwrap(), "two");
    }

    #[test]
    fn fixed_string_padding_and_roundtrip() {
        let mut col = ColumnFixedString::new(Type::fixed_string(8)).unwrap();
        col.append("hello").unwrap();
        col.append("").unwrap();

        assert_eq!(col.bytes_at(0).unwrap().len(), 8);
        assert_eq!(&col.bytes_at(0).unwrap()[..5], b"hello");
        assert_eq!(col.bytes_at(0).unwrap()[5..], [0, 0, 0]);

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);

        let mut col2 = ColumnFixedString::new(Type::fixed_string(8)).unwrap();
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();
        assert_eq!(col2.get(0), Some("hello".to_string()));
        assert_eq!(col2.get(1), Some("".to_string()));
    }

    #[test]
    fn fixed_string_rejects_long_values() {
        let mut col = ColumnFixedString::new(Type::fixed_string(4)).unwrap();
        assert!(col.append("too long").is_err());
    }

    #[test]
    fn truncated_string_is_malformed() {
        let mut buf = BytesMut::new();
        buffer_utils::write_varint(&mut buf, 100);
        buf.put_slice(b"short");

        let mut col = ColumnString::new();
        let mut reader = &buf[..];
        assert!(col.load_from_buffer(&mut reader, 1).is_err());
    }
}
