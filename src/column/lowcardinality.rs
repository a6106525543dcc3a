//! LowCardinality column (dictionary encoding).
//!
//! Wire layout: a u64 key-version prefix (1, shared dictionaries with
//! additional keys), then `[u64 flags][u64 dict_size][dictionary
//! payload][u64 index_count][indices]`. The low 8 bits of `flags` select
//! the index width (0 = u8, 1 = u16, 2 = u32, 3 = u64); bit 9 is the
//! `HasAdditionalKeys` marker, always set on writes. A nullable dictionary
//! serialises only its nested payload, and its slot 0 is the null
//! sentinel.

use super::{
    column_mut,
    column_value::{
        append_column_item,
        compute_hash_key,
        get_column_item,
        ColumnValue,
    },
    downcast_err,
    nullable::ColumnNullable,
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
    collections::HashMap,
    sync::Arc,
};

const KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS: u64 = 1;

const INDEX_WIDTH_MASK: u64 = 0xFF;
const NEEDS_GLOBAL_DICTIONARY_BIT: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS_BIT: u64 = 1 << 9;

fn index_width_code(dict_size: usize) -> u64 {
    if dict_size <= u8::MAX as usize {
        0
    } else if dict_size <= u16::MAX as usize {
        1
    } else if dict_size <= u32::MAX as usize {
        2
    } else {
        3
    }
}

fn index_byte_width(code: u64) -> Result<usize> {
    match code {
        0 => Ok(1),
        1 => Ok(2),
        2 => Ok(4),
        3 => Ok(8),
        other => Err(Error::MalformedWire(format!(
            "invalid LowCardinality index width code: {}",
            other
        ))),
    }
}

/// Column storing unique values once and per-row indices into them.
pub struct ColumnLowCardinality {
    type_: Type,
    dictionary: ColumnRef,
    indices: Vec<u64>,
    // (hash pair) -> dictionary slot, for append-time deduplication.
    unique_map: HashMap<(u64, u64), u64>,
}

impl ColumnLowCardinality {
    /// Create an empty column from a `LowCardinality(T)` descriptor. A
    /// nullable dictionary is seeded with the null sentinel at slot 0.
    pub fn new(type_: Type) -> Result<Self> {
        let dictionary_type = match &type_ {
            Type::LowCardinality { nested_type } => nested_type.as_ref(),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnLowCardinality requires LowCardinality, got {}",
                    other.name()
                )))
            }
        };

        let mut dictionary =
            crate::io::block_stream::create_column(dictionary_type)?;

        let mut unique_map = HashMap::new();
        if dictionary_type.is_nullable() {
            let col = column_mut(&mut dictionary)?
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .expect("nullable dictionary");
            col.append_null()?;
            unique_map.insert(compute_hash_key(&ColumnValue::Null), 0);
        }

        Ok(Self { type_, dictionary, indices: Vec::new(), unique_map })
    }

    /// The dictionary of unique values.
    pub fn dictionary(&self) -> &ColumnRef {
        &self.dictionary
    }

    /// Number of unique dictionary slots (null sentinel included).
    pub fn dictionary_size(&self) -> usize {
        self.dictionary.size()
    }

    /// Dictionary index of the row at `index`.
    pub fn index_at(&self, index: usize) -> u64 {
        self.indices[index]
    }

    /// The dereferenced value of the row at `index`.
    pub fn value_at(&self, index: usize) -> Result<ColumnValue> {
        let slot = *self.indices.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!("row {} out of bounds", index))
        })?;
        get_column_item(self.dictionary.as_ref(), slot as usize)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Append a value, reusing the dictionary slot when the value was seen
    /// before.
    pub fn append(&mut self, value: &ColumnValue) -> Result<()> {
        let hash_key = compute_hash_key(value);

        let slot = match self.unique_map.get(&hash_key) {
            Some(&slot) => slot,
            None => {
                let slot = self.dictionary.size() as u64;
                append_column_item(column_mut(&mut self.dictionary)?, value)?;
                self.unique_map.insert(hash_key, slot);
                slot
            }
        };

        self.indices.push(slot);
        Ok(())
    }

    fn dictionary_is_nullable(&self) -> bool {
        matches!(
            &self.type_,
            Type::LowCardinality { nested_type } if nested_type.is_nullable()
        )
    }
}

impl Column for ColumnLowCardinality {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.indices.len()
    }

    fn clear(&mut self) {
        self.indices.clear();
        // The dictionary keeps its unique values (and sentinel); only row
        // data is dropped.
    }

    fn reserve(&mut self, additional: usize) {
        self.indices.reserve(additional);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnLowCardinality>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.type_ != other.type_ {
            return Err(downcast_err(&self.type_, &other.type_));
        }

        // Values are re-deduplicated against this column's dictionary.
        for &other_slot in &other.indices {
            let value =
                get_column_item(other.dictionary.as_ref(), other_slot as usize)?;
            self.append(&value)?;
        }
        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        buffer_utils::ensure(buffer, 8, "LowCardinality key version")?;
        let key_version = buffer.get_u64_le();
        if key_version != KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS {
            return Err(Error::MalformedWire(format!(
                "unsupported LowCardinality key version: {}",
                key_version
            )));
        }
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if !self.indices.is_empty() {
            return Err(Error::Validation(
                "loading into a non-empty LowCardinality column".to_string(),
            ));
        }

        buffer_utils::ensure(buffer, 16, "LowCardinality header")?;
        let flags = buffer.get_u64_le();

        if flags & NEEDS_GLOBAL_DICTIONARY_BIT != 0 {
            return Err(Error::MalformedWire(
                "global LowCardinality dictionaries are not supported"
                    .to_string(),
            ));
        }
        let width = index_byte_width(flags & INDEX_WIDTH_MASK)?;

        let dict_size = buffer.get_u64_le() as usize;

        // Rebuild the dictionary from the wire. A nullable dictionary
        // carries only its nested payload; slot 0 is the null sentinel.
        let dictionary_type = match &self.type_ {
            Type::LowCardinality { nested_type } => nested_type.as_ref().clone(),
            _ => unreachable!("validated in constructor"),
        };
        let mut dictionary =
            crate::io::block_stream::create_column(&dictionary_type)?;

        if dict_size > 0 {
            let dict_mut = column_mut(&mut dictionary)?;
            if let Some(nullable) =
                dict_mut.as_any_mut().downcast_mut::<ColumnNullable>()
            {
                nullable.clear();
                column_mut(nullable.nested_mut())?
                    .load_from_buffer(buffer, dict_size)?;
                for slot in 0..dict_size {
                    nullable.push_null_flag(slot == 0);
                }
            } else {
                dict_mut.clear();
                dict_mut.load_from_buffer(buffer, dict_size)?;
            }
        }
        self.dictionary = dictionary;
        self.unique_map.clear();

        buffer_utils::ensure(buffer, 8, "LowCardinality row count")?;
        let index_count = buffer.get_u64_le() as usize;
        if index_count != rows {
            return Err(Error::MalformedWire(format!(
                "LowCardinality row count mismatch: expected {}, got {}",
                rows, index_count
            )));
        }

        buffer_utils::ensure(buffer, rows * width, "LowCardinality indices")?;
        self.indices.reserve(rows);
        for _ in 0..rows {
            let slot = match width {
                1 => buffer.get_u8() as u64,
                2 => buffer.get_u16_le() as u64,
                4 => buffer.get_u32_le() as u64,
                _ => buffer.get_u64_le(),
            };
            if slot as usize >= dict_size {
                return Err(Error::MalformedWire(format!(
                    "LowCardinality index {} outside dictionary of {}",
                    slot, dict_size
                )));
            }
            self.indices.push(slot);
        }

        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS);
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        let dict_size = self.dictionary.size();
        let width_code = index_width_code(dict_size);

        buffer.put_u64_le(width_code | HAS_ADDITIONAL_KEYS_BIT);
        buffer.put_u64_le(dict_size as u64);

        if self.dictionary_is_nullable() {
            let nullable = self
                .dictionary
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .expect("nullable dictionary");
            nullable.nested().save_to_buffer(buffer)?;
        } else {
            self.dictionary.save_to_buffer(buffer)?;
        }

        buffer.put_u64_le(self.indices.len() as u64);
        for &slot in &self.indices {
            match index_byte_width(width_code).expect("own width code") {
                1 => buffer.put_u8(slot as u8),
                2 => buffer.put_u16_le(slot as u16),
                4 => buffer.put_u32_le(slot as u32),
                _ => buffer.put_u64_le(slot),
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnLowCardinality::new(self.type_.clone())
                .expect("descriptor already validated"),
        )
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.indices.len() {
            return Err(Error::InvalidArgument(format!(
                "slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.indices.len()
            )));
        }

        let mut result = ColumnLowCardinality::new(self.type_.clone())?;
        for index in begin..begin + len {
            result.append(&self.value_at(index)?)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn lc_string() -> Type {
        Type::low_cardinality(Type::string())
    }

    fn lc_nullable_string() -> Type {
        Type::low_cardinality(Type::nullable(Type::string()))
    }

    #[test]
    fn deduplication() {
        let mut col = ColumnLowCardinality::new(lc_string()).unwrap();
        for v in ["a", "b", "a", "a", "b"] {
            col.append(&ColumnValue::from_string(v)).unwrap();
        }

        assert_eq!(col.size(), 5);
        assert_eq!(col.dictionary_size(), 2);
        assert_eq!(col.index_at(0), col.index_at(2));
        assert_eq!(col.value_at(3).unwrap(), ColumnValue::from_string("a"));
    }

    #[test]
    fn roundtrip() {
        let mut col = ColumnLowCardinality::new(lc_string()).unwrap();
        for v in ["x", "y", "x", "z"] {
            col.append(&ColumnValue::from_string(v)).unwrap();
        }

        let mut buf = BytesMut::new();
        col.save_prefix(&mut buf).unwrap();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnLowCardinality::new(lc_string()).unwrap();
        let mut reader = &buf[..];
        col2.load_prefix(&mut reader).unwrap();
        col2.load_from_buffer(&mut reader, 4).unwrap();
        assert!(reader.is_empty());

        for (i, v) in ["x", "y", "x", "z"].iter().enumerate() {
            assert_eq!(
                col2.value_at(i).unwrap(),
                ColumnValue::from_string(*v)
            );
        }
    }

    #[test]
    fn writes_set_has_additional_keys() {
        let mut col =
            ColumnLowCardinality::new(lc_nullable_string()).unwrap();
        col.append(&ColumnValue::from_string("v")).unwrap();
        col.append(&ColumnValue::Null).unwrap();

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let flags = u64::from_le_bytes(buf[..8].try_into().unwrap());
        assert_ne!(flags & HAS_ADDITIONAL_KEYS_BIT, 0);
        assert_eq!(flags & INDEX_WIDTH_MASK, 0);
    }

    #[test]
    fn nullable_sentinel_is_slot_zero() {
        let mut col =
            ColumnLowCardinality::new(lc_nullable_string()).unwrap();
        col.append(&ColumnValue::from_string("v")).unwrap();
        col.append(&ColumnValue::Null).unwrap();
        col.append(&ColumnValue::Null).unwrap();

        // Sentinel occupies slot 0; "v" is slot 1.
        assert_eq!(col.index_at(0), 1);
        assert_eq!(col.index_at(1), 0);
        assert_eq!(col.index_at(2), 0);

        let mut buf = BytesMut::new();
        col.save_prefix(&mut buf).unwrap();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 =
            ColumnLowCardinality::new(lc_nullable_string()).unwrap();
        let mut reader = &buf[..];
        col2.load_prefix(&mut reader).unwrap();
        col2.load_from_buffer(&mut reader, 3).unwrap();

        assert_eq!(col2.value_at(0).unwrap(), ColumnValue::from_string("v"));
        assert!(col2.value_at(1).unwrap().is_null());
        assert!(col2.value_at(2).unwrap().is_null());
    }

    #[test]
    fn wide_dictionary_uses_wider_indices() {
        let mut col = ColumnLowCardinality::new(Type::low_cardinality(
            Type::uint32(),
        ))
        .unwrap();
        for i in 0..300u32 {
            col.append(&ColumnValue::UInt32(i)).unwrap();
        }

        let mut buf = BytesMut::new();
        col.save_prefix(&mut buf).unwrap();
        col.save_to_buffer(&mut buf).unwrap();

        let flags = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        assert_eq!(flags & INDEX_WIDTH_MASK, 1, "300 slots need u16 indices");

        let mut col2 = ColumnLowCardinality::new(Type::low_cardinality(
            Type::uint32(),
        ))
        .unwrap();
        let mut reader = &buf[..];
        col2.load_prefix(&mut reader).unwrap();
        col2.load_from_buffer(&mut reader, 300).unwrap();
        assert_eq!(col2.value_at(299).unwrap(), ColumnValue::UInt32(299));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(HAS_ADDITIONAL_KEYS_BIT); // width u8, dict below
        buf.put_u64_le(1); // one dictionary slot
        buffer_utils::write_varint(&mut buf, 1);
        buf.put_u8(b'a');
        buf.put_u64_le(1); // one row
        buf.put_u8(5); // slot 5 of a 1-slot dictionary

        let mut col = ColumnLowCardinality::new(lc_string()).unwrap();
        let mut reader = &buf[..];
        assert!(matches!(
            col.load_from_buffer(&mut reader, 1),
            Err(Error::MalformedWire(_))
        ));
    }
}
