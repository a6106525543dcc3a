//! Column skippers.
//!
//! A skipper advances a cursor past a column's serialisation without
//! materialising values, allocating nothing per value and reading only the
//! bytes needed to find the end (offset tails, dictionary sizes, string
//! lengths). The `try_*` forms return `Ok(None)` when the buffer ends
//! before the column does, which lets the uncompressed block reader decide
//! to pull more bytes from the transport; on `None` the cursor position is
//! unspecified and callers retry from a fresh slice.
//!
//! Skippers and readers consume identical byte counts for identical
//! input; the block codec relies on this to delimit unframed blocks.

use crate::{
    io::buffer_utils::{
        try_advance,
        try_read_varint,
    },
    types::{
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use bytes::Buf;

/// Skip a column's serialisation prefix, or report that more bytes are
/// needed.
pub fn try_skip_prefix(
    buffer: &mut &[u8],
    type_: &Type,
) -> Result<Option<()>> {
    match type_ {
        Type::LowCardinality { .. } => try_advance(buffer, 8),
        Type::Simple(TypeCode::Json) => {
            if buffer.len() < 8 {
                return Ok(None);
            }
            let version = buffer.get_u64_le();
            // Object serialisations have no skippable layout.
            if version != 1 {
                return Err(Error::UnsupportedJsonSerialization(version));
            }
            Ok(Some(()))
        }
        Type::Nullable { nested_type } | Type::Array { item_type: nested_type } => {
            try_skip_prefix(buffer, nested_type)
        }
        Type::Map { key_type, value_type } => {
            if try_skip_prefix(buffer, key_type)?.is_none() {
                return Ok(None);
            }
            try_skip_prefix(buffer, value_type)
        }
        Type::Tuple { item_types, .. } | Type::Nested { item_types, .. } => {
            for item in item_types {
                if try_skip_prefix(buffer, item)?.is_none() {
                    return Ok(None);
                }
            }
            Ok(Some(()))
        }
        _ => Ok(Some(())),
    }
}

/// Skip `rows` rows of a column's payload, or report that more bytes are
/// needed.
pub fn try_skip_column(
    buffer: &mut &[u8],
    type_: &Type,
    rows: usize,
) -> Result<Option<()>> {
    // Every fixed-width type is one multiplication.
    if let Some(width) = type_.storage_size_bytes() {
        return try_advance(buffer, rows * width);
    }

    match type_ {
        Type::Simple(TypeCode::String) | Type::Simple(TypeCode::Json) => {
            for _ in 0..rows {
                let len = match try_read_varint(buffer)? {
                    Some(len) => len as usize,
                    None => return Ok(None),
                };
                if try_advance(buffer, len)?.is_none() {
                    return Ok(None);
                }
            }
            Ok(Some(()))
        }
        Type::Nullable { nested_type } => {
            if try_advance(buffer, rows)?.is_none() {
                return Ok(None);
            }
            try_skip_column(buffer, nested_type, rows)
        }
        Type::Array { item_type } => {
            let total = match try_read_offsets_total(buffer, rows)? {
                Some(total) => total,
                None => return Ok(None),
            };
            try_skip_column(buffer, item_type, total)
        }
        Type::Map { key_type, value_type } => {
            let total = match try_read_offsets_total(buffer, rows)? {
                Some(total) => total,
                None => return Ok(None),
            };
            if try_skip_column(buffer, key_type, total)?.is_none() {
                return Ok(None);
            }
            try_skip_column(buffer, value_type, total)
        }
        Type::Tuple { item_types, .. } => {
            for item in item_types {
                if try_skip_column(buffer, item, rows)?.is_none() {
                    return Ok(None);
                }
            }
            Ok(Some(()))
        }
        Type::Nested { item_types, .. } => {
            for item in item_types {
                let wrapped = Type::array(item.clone());
                if try_skip_column(buffer, &wrapped, rows)?.is_none() {
                    return Ok(None);
                }
            }
            Ok(Some(()))
        }
        Type::LowCardinality { nested_type } => {
            try_skip_low_cardinality(buffer, nested_type, rows)
        }
        other => Err(Error::InvalidArgument(format!(
            "no skipper for type {}",
            other.name()
        ))),
    }
}

/// Strict form of [`try_skip_column`]: a short buffer is malformed wire.
pub fn skip_column(buffer: &mut &[u8], type_: &Type, rows: usize) -> Result<()> {
    match try_skip_column(buffer, type_, rows)? {
        Some(()) => Ok(()),
        None => Err(Error::MalformedWire(format!(
            "truncated column of type {}",
            type_.name()
        ))),
    }
}

/// Strict form of [`try_skip_prefix`].
pub fn skip_prefix(buffer: &mut &[u8], type_: &Type) -> Result<()> {
    match try_skip_prefix(buffer, type_)? {
        Some(()) => Ok(()),
        None => Err(Error::MalformedWire(format!(
            "truncated column prefix of type {}",
            type_.name()
        ))),
    }
}

// Advance past `rows` u64 offsets and return the final offset, the total
// inner element count.
fn try_read_offsets_total(
    buffer: &mut &[u8],
    rows: usize,
) -> Result<Option<usize>> {
    if buffer.len() < rows * 8 {
        return Ok(None);
    }
    if rows == 0 {
        return Ok(Some(0));
    }

    let tail = &buffer[(rows - 1) * 8..rows * 8];
    let total = u64::from_le_bytes(tail.try_into().expect("8-byte tail"));
    buffer.advance(rows * 8);
    Ok(Some(total as usize))
}

fn try_skip_low_cardinality(
    buffer: &mut &[u8],
    dictionary_type: &Type,
    rows: usize,
) -> Result<Option<()>> {
    if buffer.len() < 16 {
        return Ok(None);
    }
    let flags = buffer.get_u64_le();
    let width = match flags & 0xFF {
        0 => 1,
        1 => 2,
        2 => 4,
        3 => 8,
        other => {
            return Err(Error::MalformedWire(format!(
                "invalid LowCardinality index width code: {}",
                other
            )))
        }
    };
    let dict_size = buffer.get_u64_le() as usize;

    // A nullable dictionary serialises only the nested payload.
    let payload_type = match dictionary_type {
        Type::Nullable { nested_type } => nested_type.as_ref(),
        other => other,
    };
    if try_skip_column(buffer, payload_type, dict_size)?.is_none() {
        return Ok(None);
    }

    if buffer.len() < 8 {
        return Ok(None);
    }
    let index_count = buffer.get_u64_le() as usize;
    if index_count != rows {
        return Err(Error::MalformedWire(format!(
            "LowCardinality row count mismatch: expected {}, got {}",
            rows, index_count
        )));
    }

    try_advance(buffer, index_count * width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{
        column_value::ColumnValue,
        lowcardinality::ColumnLowCardinality,
        nullable::ColumnNullable,
        numeric::ColumnUInt64,
        string::ColumnString,
        Column,
    };
    use bytes::BytesMut;

    // Serialise a column (prefix + body) and check the skipper lands
    // exactly at the end.
    fn assert_skip_matches(
        column: &dyn Column,
        type_: &Type,
        rows: usize,
    ) {
        let mut buf = BytesMut::new();
        column.save_prefix(&mut buf).unwrap();
        column.save_to_buffer(&mut buf).unwrap();

        let mut cursor = &buf[..];
        skip_prefix(&mut cursor, type_).unwrap();
        skip_column(&mut cursor, type_, rows).unwrap();
        assert!(
            cursor.is_empty(),
            "skipper left {} bytes for {}",
            cursor.len(),
            type_.name()
        );

        // Every strict prefix of the input reports "need more", never a
        // parse error.
        for cut in 0..buf.len() {
            let mut partial = &buf[..cut];
            let outcome = try_skip_prefix(&mut partial, type_)
                .and_then(|r| match r {
                    Some(()) => try_skip_column(&mut partial, type_, rows),
                    None => Ok(None),
                })
                .unwrap();
            assert_eq!(outcome, None, "cut at {} should need more", cut);
        }
    }

    #[test]
    fn fixed_width_skip() {
        let mut col = ColumnUInt64::new();
        for i in 0..5 {
            col.append(i);
        }
        assert_skip_matches(&col, &Type::uint64(), 5);
    }

    #[test]
    fn string_skip() {
        let mut col = ColumnString::new();
        for s in ["", "a", "long-ish string value"] {
            col.append(s);
        }
        assert_skip_matches(&col, &Type::string(), 3);
    }

    #[test]
    fn nullable_skip() {
        let type_ = Type::nullable(Type::string());
        let mut col = ColumnNullable::new(type_.clone()).unwrap();
        col.append_value(&ColumnValue::from_string("x")).unwrap();
        col.append_null().unwrap();
        assert_skip_matches(&col, &type_, 2);
    }

    #[test]
    fn array_skip() {
        let type_ = Type::array(Type::string());
        let mut col =
            crate::column::array::ColumnArray::new(type_.clone()).unwrap();
        let mut row = ColumnString::new();
        row.append("a");
        row.append("bb");
        col.append_array(std::sync::Arc::new(row)).unwrap();
        let empty = ColumnString::new();
        col.append_array(std::sync::Arc::new(empty)).unwrap();

        assert_skip_matches(&col, &type_, 2);
    }

    #[test]
    fn low_cardinality_skip() {
        let type_ = Type::low_cardinality(Type::nullable(Type::string()));
        let mut col = ColumnLowCardinality::new(type_.clone()).unwrap();
        col.append(&ColumnValue::from_string("a")).unwrap();
        col.append(&ColumnValue::Null).unwrap();
        col.append(&ColumnValue::from_string("a")).unwrap();

        assert_skip_matches(&col, &type_, 3);
    }

    #[test]
    fn zero_rows_skip_nothing() {
        let col = ColumnUInt64::new();
        assert_skip_matches(&col, &Type::uint64(), 0);

        let mut cursor: &[u8] = &[];
        assert_eq!(
            try_skip_column(&mut cursor, &Type::array(Type::uint8()), 0)
                .unwrap(),
            Some(())
        );
    }
}
