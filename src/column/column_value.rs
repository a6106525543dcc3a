//! Type-erased scalar values.
//!
//! A [`ColumnValue`] carries one cell of any supported scalar type. It is
//! the currency of the LowCardinality dictionary, Nullable appends, the
//! bulk-insert extractors, and scalar query results. Mapping back to
//! concrete Rust types happens at the caller boundary.

use super::{
    date::{
        ColumnDate,
        ColumnDate32,
        ColumnDateTime,
        ColumnDateTime64,
    },
    decimal::ColumnDecimal,
    enum_column::{
        ColumnEnum16,
        ColumnEnum8,
    },
    ipv4::ColumnIpv4,
    ipv6::ColumnIpv6,
    nothing::ColumnNothing,
    nullable::ColumnNullable,
    numeric::*,
    string::{
        ColumnFixedString,
        ColumnString,
        ColumnStringLazy,
    },
    uuid::ColumnUuid,
    Column,
};
use crate::{
    types::{
        i256,
        u256,
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use chrono::{
    DateTime,
    Datelike,
    NaiveDate,
    Utc,
};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{
        Hash,
        Hasher,
    },
    net::{
        Ipv4Addr,
        Ipv6Addr,
    },
};
use uuid::Uuid;

/// One cell of any supported scalar type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// An absent value (NULL).
    Null,
    /// A boolean.
    Bool(bool),
    /// Unsigned integers.
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    UInt256(u256),
    /// Signed integers.
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Int256(i256),
    /// Floats.
    Float32(f32),
    Float64(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes, used for FixedString cells.
    Bytes(Vec<u8>),
    /// A calendar date.
    Date(NaiveDate),
    /// A UTC timestamp; precision is applied by the target column.
    DateTime(DateTime<Utc>),
    /// A decimal number; the target column applies its scale.
    Decimal(f64),
    /// A UUID.
    Uuid(Uuid),
    /// An IPv4 address.
    Ipv4(Ipv4Addr),
    /// An IPv6 address.
    Ipv6(Ipv6Addr),
}

impl ColumnValue {
    /// Shorthand for a string value.
    pub fn from_string(s: impl Into<String>) -> Self {
        ColumnValue::String(s.into())
    }

    /// Shorthand for a u8 value.
    pub fn from_u8(v: u8) -> Self {
        ColumnValue::UInt8(v)
    }

    /// Shorthand for a u32 value.
    pub fn from_u32(v: u32) -> Self {
        ColumnValue::UInt32(v)
    }

    /// Shorthand for a u64 value.
    pub fn from_u64(v: u64) -> Self {
        ColumnValue::UInt64(v)
    }

    /// Shorthand for an i64 value.
    pub fn from_i64(v: i64) -> Self {
        ColumnValue::Int64(v)
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

macro_rules! impl_from {
    ($rust:ty, $variant:ident) => {
        impl From<$rust> for ColumnValue {
            fn from(value: $rust) -> Self {
                ColumnValue::$variant(value)
            }
        }
    };
}

impl_from!(bool, Bool);
impl_from!(u8, UInt8);
impl_from!(u16, UInt16);
impl_from!(u32, UInt32);
impl_from!(u64, UInt64);
impl_from!(u128, UInt128);
impl_from!(u256, UInt256);
impl_from!(i8, Int8);
impl_from!(i16, Int16);
impl_from!(i32, Int32);
impl_from!(i64, Int64);
impl_from!(i128, Int128);
impl_from!(i256, Int256);
impl_from!(f32, Float32);
impl_from!(f64, Float64);
impl_from!(String, String);
impl_from!(NaiveDate, Date);
impl_from!(Uuid, Uuid);
impl_from!(Ipv4Addr, Ipv4);
impl_from!(Ipv6Addr, Ipv6);

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        ColumnValue::DateTime(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ColumnValue::Null,
        }
    }
}

/// Dual hash for LowCardinality deduplication. Null hashes to `(0, 0)` to
/// keep it distinct from the empty string.
pub fn compute_hash_key(value: &ColumnValue) -> (u64, u64) {
    if value.is_null() {
        return (0, 0);
    }

    let bytes = hash_bytes(value);

    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    (hasher.finish(), fnv1a_64(&bytes))
}

fn hash_bytes(value: &ColumnValue) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        ColumnValue::Null => {}
        ColumnValue::Bool(v) => out.push(*v as u8),
        ColumnValue::UInt8(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::UInt128(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::UInt256(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int128(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Int256(v) => out.extend_from_slice(&v.to_le_bytes()),
        ColumnValue::Float32(v) => {
            out.extend_from_slice(&v.to_bits().to_le_bytes())
        }
        ColumnValue::Float64(v) => {
            out.extend_from_slice(&v.to_bits().to_le_bytes())
        }
        ColumnValue::String(v) => out.extend_from_slice(v.as_bytes()),
        ColumnValue::Bytes(v) => out.extend_from_slice(v),
        ColumnValue::Date(v) => {
            out.extend_from_slice(&v.num_days_from_ce().to_le_bytes())
        }
        ColumnValue::DateTime(v) => out.extend_from_slice(
            &v.timestamp_nanos_opt().unwrap_or(0).to_le_bytes(),
        ),
        ColumnValue::Decimal(v) => {
            out.extend_from_slice(&v.to_bits().to_le_bytes())
        }
        ColumnValue::Uuid(v) => out.extend_from_slice(v.as_bytes()),
        ColumnValue::Ipv4(v) => out.extend_from_slice(&v.octets()),
        ColumnValue::Ipv6(v) => out.extend_from_slice(&v.octets()),
    }
    out
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x1_0000_0001_b3;

    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date")
}

macro_rules! extract_vector {
    ($column:expr, $index:expr, $col:ty, $variant:ident) => {{
        let col = $column
            .as_any()
            .downcast_ref::<$col>()
            .ok_or_else(|| downcast_failed($column))?;
        Ok(ColumnValue::$variant(col.at($index)))
    }};
}

fn downcast_failed(column: &dyn Column) -> Error {
    Error::Validation(format!(
        "column downcast failed for {}",
        column.column_type().name()
    ))
}

/// Extract the cell at `index` as an erased scalar.
///
/// Composite columns (arrays, maps, tuples) have no scalar form and are
/// rejected; use the typed accessors on their concrete columns.
pub fn get_column_item(
    column: &dyn Column,
    index: usize,
) -> Result<ColumnValue> {
    if index >= column.size() {
        return Err(Error::InvalidArgument(format!(
            "index {} out of bounds (size {})",
            index,
            column.size()
        )));
    }

    match column.column_type() {
        Type::Simple(code) => match code {
            TypeCode::Bool => {
                let col = column
                    .as_any()
                    .downcast_ref::<ColumnUInt8>()
                    .ok_or_else(|| downcast_failed(column))?;
                Ok(ColumnValue::Bool(col.at(index) != 0))
            }
            TypeCode::UInt8 => {
                extract_vector!(column, index, ColumnUInt8, UInt8)
            }
            TypeCode::UInt16 => {
                extract_vector!(column, index, ColumnUInt16, UInt16)
            }
            TypeCode::UInt32 => {
                extract_vector!(column, index, ColumnUInt32, UInt32)
            }
            TypeCode::UInt64 => {
                extract_vector!(column, index, ColumnUInt64, UInt64)
            }
            TypeCode::UInt128 => {
                extract_vector!(column, index, ColumnUInt128, UInt128)
            }
            TypeCode::UInt256 => {
                extract_vector!(column, index, ColumnUInt256, UInt256)
            }
            TypeCode::Int8 => {
                extract_vector!(column, index, ColumnInt8, Int8)
            }
            TypeCode::Int16 => {
                extract_vector!(column, index, ColumnInt16, Int16)
            }
            TypeCode::Int32 => {
                extract_vector!(column, index, ColumnInt32, Int32)
            }
            TypeCode::Int64 => {
                extract_vector!(column, index, ColumnInt64, Int64)
            }
            TypeCode::Int128 => {
                extract_vector!(column, index, ColumnInt128, Int128)
            }
            TypeCode::Int256 => {
                extract_vector!(column, index, ColumnInt256, Int256)
            }
            TypeCode::Float32 => {
                extract_vector!(column, index, ColumnFloat32, Float32)
            }
            TypeCode::Float64 => {
                extract_vector!(column, index, ColumnFloat64, Float64)
            }
            TypeCode::String => {
                if let Some(col) =
                    column.as_any().downcast_ref::<ColumnString>()
                {
                    Ok(ColumnValue::String(col.at(index).to_string()))
                } else if let Some(col) =
                    column.as_any().downcast_ref::<ColumnStringLazy>()
                {
                    col.get(index)
                        .expect("index checked")
                        .map(ColumnValue::String)
                } else {
                    Err(downcast_failed(column))
                }
            }
            TypeCode::Date => {
                let col = column
                    .as_any()
                    .downcast_ref::<ColumnDate>()
                    .ok_or_else(|| downcast_failed(column))?;
                col.date_at(index)
                    .map(ColumnValue::Date)
                    .ok_or_else(|| downcast_failed(column))
            }
            TypeCode::Date32 => {
                let col = column
                    .as_any()
                    .downcast_ref::<ColumnDate32>()
                    .ok_or_else(|| downcast_failed(column))?;
                col.date_at(index)
                    .map(ColumnValue::Date)
                    .ok_or_else(|| downcast_failed(column))
            }
            TypeCode::UUID => {
                extract_vector!(column, index, ColumnUuid, Uuid)
            }
            TypeCode::IPv4 => {
                extract_vector!(column, index, ColumnIpv4, Ipv4)
            }
            TypeCode::IPv6 => {
                extract_vector!(column, index, ColumnIpv6, Ipv6)
            }
            TypeCode::Nothing => Ok(ColumnValue::Null),
            other => Err(Error::InvalidArgument(format!(
                "no scalar form for {}",
                other.name()
            ))),
        },
        Type::FixedString { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnFixedString>()
                .ok_or_else(|| downcast_failed(column))?;
            Ok(ColumnValue::Bytes(
                col.bytes_at(index).expect("index checked").to_vec(),
            ))
        }
        Type::DateTime { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDateTime>()
                .ok_or_else(|| downcast_failed(column))?;
            col.datetime_at(index)
                .map(ColumnValue::DateTime)
                .ok_or_else(|| downcast_failed(column))
        }
        Type::DateTime64 { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDateTime64>()
                .ok_or_else(|| downcast_failed(column))?;
            col.datetime_at(index)
                .map(ColumnValue::DateTime)
                .ok_or_else(|| downcast_failed(column))
        }
        Type::Decimal { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDecimal>()
                .ok_or_else(|| downcast_failed(column))?;
            col.value_at(index)
                .map(ColumnValue::Decimal)
                .ok_or_else(|| downcast_failed(column))
        }
        Type::Enum8 { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnEnum8>()
                .ok_or_else(|| downcast_failed(column))?;
            Ok(ColumnValue::Int8(col.at(index)))
        }
        Type::Enum16 { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnEnum16>()
                .ok_or_else(|| downcast_failed(column))?;
            Ok(ColumnValue::Int16(col.at(index)))
        }
        Type::Nullable { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .ok_or_else(|| downcast_failed(column))?;
            if col.is_null(index) {
                Ok(ColumnValue::Null)
            } else {
                get_column_item(col.nested().as_ref(), index)
            }
        }
        other => Err(Error::InvalidArgument(format!(
            "no scalar form for {}",
            other.name()
        ))),
    }
}

macro_rules! append_vector {
    ($column:expr, $value:expr, $col:ty, $variant:ident) => {{
        match ($column.as_any_mut().downcast_mut::<$col>(), $value) {
            (Some(col), ColumnValue::$variant(v)) => {
                col.append(*v);
                Ok(())
            }
            (Some(col), _) => {
                let _ = col;
                Err(None)
            }
            (None, _) => Err(None),
        }
    }};
}

/// Append an erased scalar to a column, converting per the target type.
pub fn append_column_item(
    column: &mut dyn Column,
    value: &ColumnValue,
) -> Result<()> {
    let target = column.column_type().clone();
    append_item_inner(column, value)
        .map_err(|e| e.unwrap_or_else(|| mismatch_for(&target, value)))
}

fn mismatch_for(target: &Type, value: &ColumnValue) -> Error {
    Error::TypeMismatch {
        expected: target.name(),
        actual: format!("{:?}", value),
    }
}

fn append_item_inner(
    column: &mut dyn Column,
    value: &ColumnValue,
) -> std::result::Result<(), Option<Error>> {
    match column.column_type().clone() {
        Type::Simple(code) => match code {
            TypeCode::Bool => {
                let col = column
                    .as_any_mut()
                    .downcast_mut::<ColumnUInt8>()
                    .ok_or(None)?;
                match value {
                    ColumnValue::Bool(v) => {
                        col.append(*v as u8);
                        Ok(())
                    }
                    _ => Err(None),
                }
            }
            TypeCode::UInt8 => append_vector!(column, value, ColumnUInt8, UInt8),
            TypeCode::UInt16 => {
                append_vector!(column, value, ColumnUInt16, UInt16)
            }
            TypeCode::UInt32 => {
                append_vector!(column, value, ColumnUInt32, UInt32)
            }
            TypeCode::UInt64 => {
                append_vector!(column, value, ColumnUInt64, UInt64)
            }
            TypeCode::UInt128 => {
                append_vector!(column, value, ColumnUInt128, UInt128)
            }
            TypeCode::UInt256 => {
                append_vector!(column, value, ColumnUInt256, UInt256)
            }
            TypeCode::Int8 => append_vector!(column, value, ColumnInt8, Int8),
            TypeCode::Int16 => append_vector!(column, value, ColumnInt16, Int16),
            TypeCode::Int32 => append_vector!(column, value, ColumnInt32, Int32),
            TypeCode::Int64 => append_vector!(column, value, ColumnInt64, Int64),
            TypeCode::Int128 => {
                append_vector!(column, value, ColumnInt128, Int128)
            }
            TypeCode::Int256 => {
                append_vector!(column, value, ColumnInt256, Int256)
            }
            TypeCode::Float32 => {
                append_vector!(column, value, ColumnFloat32, Float32)
            }
            TypeCode::Float64 => {
                append_vector!(column, value, ColumnFloat64, Float64)
            }
            TypeCode::String => {
                let s = match value {
                    ColumnValue::String(s) => s.as_str(),
                    _ => return Err(None),
                };
                if let Some(col) =
                    column.as_any_mut().downcast_mut::<ColumnString>()
                {
                    col.append(s);
                    Ok(())
                } else if let Some(col) =
                    column.as_any_mut().downcast_mut::<ColumnStringLazy>()
                {
                    col.append(s);
                    Ok(())
                } else {
                    Err(None)
                }
            }
            TypeCode::Date => {
                let col = column
                    .as_any_mut()
                    .downcast_mut::<ColumnDate>()
                    .ok_or(None)?;
                match value {
                    ColumnValue::Date(d) => {
                        col.append_date(*d);
                        Ok(())
                    }
                    _ => Err(None),
                }
            }
            TypeCode::Date32 => {
                let col = column
                    .as_any_mut()
                    .downcast_mut::<ColumnDate32>()
                    .ok_or(None)?;
                match value {
                    ColumnValue::Date(d) => {
                        col.append_date(*d);
                        Ok(())
                    }
                    _ => Err(None),
                }
            }
            TypeCode::UUID => append_vector!(column, value, ColumnUuid, Uuid),
            TypeCode::IPv4 => append_vector!(column, value, ColumnIpv4, Ipv4),
            TypeCode::IPv6 => append_vector!(column, value, ColumnIpv6, Ipv6),
            TypeCode::Nothing => {
                let col = column
                    .as_any_mut()
                    .downcast_mut::<ColumnNothing>()
                    .ok_or(None)?;
                col.append();
                Ok(())
            }
            _ => Err(None),
        },
        Type::FixedString { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnFixedString>()
                .ok_or(None)?;
            match value {
                ColumnValue::Bytes(bytes) => {
                    col.append_bytes(bytes).map_err(Some)
                }
                ColumnValue::String(s) => col.append(s).map_err(Some),
                _ => Err(None),
            }
        }
        Type::DateTime { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnDateTime>()
                .ok_or(None)?;
            match value {
                ColumnValue::DateTime(ts) => {
                    col.append_datetime(*ts);
                    Ok(())
                }
                _ => Err(None),
            }
        }
        Type::DateTime64 { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnDateTime64>()
                .ok_or(None)?;
            match value {
                ColumnValue::DateTime(ts) => {
                    col.append_datetime(*ts);
                    Ok(())
                }
                _ => Err(None),
            }
        }
        Type::Decimal { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnDecimal>()
                .ok_or(None)?;
            match value {
                ColumnValue::Decimal(v) | ColumnValue::Float64(v) => {
                    col.append_scaled_f64(*v);
                    Ok(())
                }
                ColumnValue::Int64(v) => {
                    col.append_scaled_f64(*v as f64);
                    Ok(())
                }
                _ => Err(None),
            }
        }
        Type::Enum8 { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnEnum8>()
                .ok_or(None)?;
            match value {
                ColumnValue::Int8(v) => {
                    col.append(*v);
                    Ok(())
                }
                ColumnValue::String(name) => {
                    col.append_name(name).map_err(Some)
                }
                _ => Err(None),
            }
        }
        Type::Enum16 { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnEnum16>()
                .ok_or(None)?;
            match value {
                ColumnValue::Int16(v) => {
                    col.append(*v);
                    Ok(())
                }
                ColumnValue::String(name) => {
                    col.append_name(name).map_err(Some)
                }
                _ => Err(None),
            }
        }
        Type::Nullable { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .ok_or(None)?;
            if value.is_null() {
                col.append_null().map_err(Some)
            } else {
                col.append_value(value).map_err(Some)
            }
        }
        _ => Err(None),
    }
}

/// Append a zero-filled placeholder of the column's element type, used for
/// null slots.
pub fn append_default_item(column: &mut dyn Column, type_: &Type) -> Result<()> {
    let default = default_value_for(type_)?;
    append_column_item(column, &default)
}

fn default_value_for(type_: &Type) -> Result<ColumnValue> {
    Ok(match type_ {
        Type::Simple(code) => match code {
            TypeCode::Bool => ColumnValue::Bool(false),
            TypeCode::UInt8 => ColumnValue::UInt8(0),
            TypeCode::UInt16 => ColumnValue::UInt16(0),
            TypeCode::UInt32 => ColumnValue::UInt32(0),
            TypeCode::UInt64 => ColumnValue::UInt64(0),
            TypeCode::UInt128 => ColumnValue::UInt128(0),
            TypeCode::UInt256 => ColumnValue::UInt256(u256::ZERO),
            TypeCode::Int8 => ColumnValue::Int8(0),
            TypeCode::Int16 => ColumnValue::Int16(0),
            TypeCode::Int32 => ColumnValue::Int32(0),
            TypeCode::Int64 => ColumnValue::Int64(0),
            TypeCode::Int128 => ColumnValue::Int128(0),
            TypeCode::Int256 => ColumnValue::Int256(i256::ZERO),
            TypeCode::Float32 => ColumnValue::Float32(0.0),
            TypeCode::Float64 => ColumnValue::Float64(0.0),
            TypeCode::String => ColumnValue::String(String::new()),
            TypeCode::Date | TypeCode::Date32 => ColumnValue::Date(epoch()),
            TypeCode::UUID => ColumnValue::Uuid(Uuid::nil()),
            TypeCode::IPv4 => ColumnValue::Ipv4(Ipv4Addr::UNSPECIFIED),
            TypeCode::IPv6 => ColumnValue::Ipv6(Ipv6Addr::UNSPECIFIED),
            TypeCode::Nothing => ColumnValue::Null,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "no default placeholder for {}",
                    other.name()
                )))
            }
        },
        Type::FixedString { size } => ColumnValue::Bytes(vec![0u8; *size]),
        Type::DateTime { .. } | Type::DateTime64 { .. } => {
            ColumnValue::DateTime(DateTime::<Utc>::UNIX_EPOCH)
        }
        Type::Decimal { .. } => ColumnValue::Decimal(0.0),
        Type::Enum8 { .. } => ColumnValue::Int8(0),
        Type::Enum16 { .. } => ColumnValue::Int16(0),
        other => {
            return Err(Error::InvalidArgument(format!(
                "no default placeholder for {}",
                other.name()
            )))
        }
    })
}
