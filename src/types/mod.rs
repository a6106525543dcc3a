//! ClickHouse type system: type codes, structured descriptors, and the
//! type-string parser.

/// 256-bit integer value types.
pub mod int256;
/// Recursive-descent parser for ClickHouse type strings.
pub mod parser;

pub use int256::{
    i256,
    u256,
};

use crate::Result;

/// Identifies a ClickHouse type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Nothing type, used for NULL-only columns.
    Nothing,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Signed 128-bit integer.
    Int128,
    /// Signed 256-bit integer.
    Int256,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// Unsigned 128-bit integer.
    UInt128,
    /// Unsigned 256-bit integer.
    UInt256,
    /// 32-bit IEEE 754 floating-point number.
    Float32,
    /// 64-bit IEEE 754 floating-point number.
    Float64,
    /// Boolean stored as one byte, 0 or 1.
    Bool,
    /// Variable-length byte string.
    String,
    /// Fixed-length byte string, zero-padded.
    FixedString,
    /// Days since 1970-01-01 as UInt16.
    Date,
    /// Days since 1970-01-01 as Int32, extending before the epoch.
    Date32,
    /// Seconds since the Unix epoch as UInt32, with optional timezone.
    DateTime,
    /// Sub-second timestamp as Int64 ticks of 10^-precision seconds.
    DateTime64,
    /// Fixed-point decimal; the precision selects the mantissa width.
    Decimal,
    /// Enumeration stored as Int8.
    Enum8,
    /// Enumeration stored as Int16.
    Enum16,
    /// Universally unique identifier (128-bit).
    UUID,
    /// IPv4 address stored as 4 bytes little-endian.
    IPv4,
    /// IPv6 address stored as 16 bytes as-is.
    IPv6,
    /// Variable-length array of one element type.
    Array,
    /// Wrapper adding NULL support to the nested type.
    Nullable,
    /// Ordered collection of heterogeneous types.
    Tuple,
    /// Named collection of array-typed fields.
    Nested,
    /// Key-value map.
    Map,
    /// Dictionary-encoded column.
    LowCardinality,
    /// JSON document column.
    Json,
}

impl TypeCode {
    /// The ClickHouse type name for this code.
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Nothing => "Nothing",
            TypeCode::Int8 => "Int8",
            TypeCode::Int16 => "Int16",
            TypeCode::Int32 => "Int32",
            TypeCode::Int64 => "Int64",
            TypeCode::Int128 => "Int128",
            TypeCode::Int256 => "Int256",
            TypeCode::UInt8 => "UInt8",
            TypeCode::UInt16 => "UInt16",
            TypeCode::UInt32 => "UInt32",
            TypeCode::UInt64 => "UInt64",
            TypeCode::UInt128 => "UInt128",
            TypeCode::UInt256 => "UInt256",
            TypeCode::Float32 => "Float32",
            TypeCode::Float64 => "Float64",
            TypeCode::Bool => "Bool",
            TypeCode::String => "String",
            TypeCode::FixedString => "FixedString",
            TypeCode::Date => "Date",
            TypeCode::Date32 => "Date32",
            TypeCode::DateTime => "DateTime",
            TypeCode::DateTime64 => "DateTime64",
            TypeCode::Decimal => "Decimal",
            TypeCode::Enum8 => "Enum8",
            TypeCode::Enum16 => "Enum16",
            TypeCode::UUID => "UUID",
            TypeCode::IPv4 => "IPv4",
            TypeCode::IPv6 => "IPv6",
            TypeCode::Array => "Array",
            TypeCode::Nullable => "Nullable",
            TypeCode::Tuple => "Tuple",
            TypeCode::Nested => "Nested",
            TypeCode::Map => "Map",
            TypeCode::LowCardinality => "LowCardinality",
            TypeCode::Json => "JSON",
        }
    }
}

/// A named enum variant with its integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    /// The variant name.
    pub name: String,
    /// The variant's wire value.
    pub value: i16,
}

/// A parsed ClickHouse type descriptor.
///
/// Built by the parser from a type string at message time and immutable
/// thereafter. Composite descriptors own their inner descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A non-parameterised type identified by its [`TypeCode`].
    Simple(TypeCode),
    /// Fixed-length byte string of `size` bytes per row.
    FixedString {
        /// Length in bytes.
        size: usize,
    },
    /// Seconds-precision timestamp with an optional column timezone.
    DateTime {
        /// Optional IANA timezone name.
        timezone: Option<String>,
    },
    /// Sub-second timestamp. The timezone belongs to the column descriptor,
    /// not the element values, which are plain ticks.
    DateTime64 {
        /// Number of sub-second decimal digits (one tick is
        /// 10^-precision seconds).
        precision: usize,
        /// Optional IANA timezone name.
        timezone: Option<String>,
    },
    /// Fixed-point decimal.
    Decimal {
        /// Total significant digits; selects the mantissa width.
        precision: usize,
        /// Digits after the decimal point.
        scale: usize,
    },
    /// Enumeration stored as Int8.
    Enum8 {
        /// Named variants; the mapping travels in the descriptor, not the
        /// wire.
        items: Vec<EnumItem>,
    },
    /// Enumeration stored as Int16.
    Enum16 {
        /// Named variants.
        items: Vec<EnumItem>,
    },
    /// Variable-length array.
    Array {
        /// Element type.
        item_type: Box<Type>,
    },
    /// Nullable wrapper.
    Nullable {
        /// The type made nullable.
        nested_type: Box<Type>,
    },
    /// Tuple of heterogeneous types, optionally with field names.
    Tuple {
        /// Element types in declaration order.
        item_types: Vec<Type>,
        /// Field names; empty for the positional form, otherwise the same
        /// length as `item_types`.
        field_names: Vec<String>,
    },
    /// Named collection of fields, wire-identical to
    /// `Tuple(Array(T1), ...)`.
    Nested {
        /// Field names, one per item type.
        field_names: Vec<String>,
        /// Field element types (before the implicit Array wrapping).
        item_types: Vec<Type>,
    },
    /// Key-value map, wire-identical to `Array(Tuple(K, V))`.
    Map {
        /// Key type.
        key_type: Box<Type>,
        /// Value type.
        value_type: Box<Type>,
    },
    /// Dictionary-encoded wrapper.
    LowCardinality {
        /// The dictionary element type.
        nested_type: Box<Type>,
    },
}

impl Type {
    /// Parse a ClickHouse type string into a descriptor.
    pub fn parse(type_name: &str) -> Result<Type> {
        parser::parse_type_name(type_name)
    }

    /// The [`TypeCode`] of the outermost constructor.
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Simple(code) => *code,
            Type::FixedString { .. } => TypeCode::FixedString,
            Type::DateTime { .. } => TypeCode::DateTime,
            Type::DateTime64 { .. } => TypeCode::DateTime64,
            Type::Decimal { .. } => TypeCode::Decimal,
            Type::Enum8 { .. } => TypeCode::Enum8,
            Type::Enum16 { .. } => TypeCode::Enum16,
            Type::Array { .. } => TypeCode::Array,
            Type::Nullable { .. } => TypeCode::Nullable,
            Type::Tuple { .. } => TypeCode::Tuple,
            Type::Nested { .. } => TypeCode::Nested,
            Type::Map { .. } => TypeCode::Map,
            Type::LowCardinality { .. } => TypeCode::LowCardinality,
        }
    }

    /// The full ClickHouse type name, including parameters.
    pub fn name(&self) -> String {
        match self {
            Type::Simple(code) => code.name().to_string(),
            Type::FixedString { size } => format!("FixedString({})", size),
            Type::DateTime { timezone: None } => "DateTime".to_string(),
            Type::DateTime { timezone: Some(tz) } => {
                format!("DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                format!("DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                format!("DateTime64({}, '{}')", precision, tz)
            }
            Type::Decimal { precision, scale } => {
                format!("Decimal({}, {})", precision, scale)
            }
            Type::Enum8 { items } => {
                format!("Enum8({})", format_enum_items(items))
            }
            Type::Enum16 { items } => {
                format!("Enum16({})", format_enum_items(items))
            }
            Type::Array { item_type } => format!("Array({})", item_type.name()),
            Type::Nullable { nested_type } => {
                format!("Nullable({})", nested_type.name())
            }
            Type::Tuple { item_types, field_names } => {
                let parts: Vec<String> = if field_names.is_empty() {
                    item_types.iter().map(|t| t.name()).collect()
                } else {
                    field_names
                        .iter()
                        .zip(item_types)
                        .map(|(n, t)| format!("{} {}", n, t.name()))
                        .collect()
                };
                format!("Tuple({})", parts.join(", "))
            }
            Type::Nested { field_names, item_types } => {
                let parts: Vec<String> = field_names
                    .iter()
                    .zip(item_types)
                    .map(|(n, t)| format!("{} {}", n, t.name()))
                    .collect();
                format!("Nested({})", parts.join(", "))
            }
            Type::Map { key_type, value_type } => {
                format!("Map({}, {})", key_type.name(), value_type.name())
            }
            Type::LowCardinality { nested_type } => {
                format!("LowCardinality({})", nested_type.name())
            }
        }
    }

    /// Storage size in bytes per row for fixed-width types, `None` for
    /// variable-length and composite types.
    pub fn storage_size_bytes(&self) -> Option<usize> {
        match self {
            Type::Simple(code) => match code {
                TypeCode::Int8 | TypeCode::UInt8 | TypeCode::Bool => Some(1),
                TypeCode::Int16 | TypeCode::UInt16 | TypeCode::Date => Some(2),
                TypeCode::Int32
                | TypeCode::UInt32
                | TypeCode::Float32
                | TypeCode::Date32
                | TypeCode::IPv4 => Some(4),
                TypeCode::Int64 | TypeCode::UInt64 | TypeCode::Float64 => {
                    Some(8)
                }
                TypeCode::Int128
                | TypeCode::UInt128
                | TypeCode::UUID
                | TypeCode::IPv6 => Some(16),
                TypeCode::Int256 | TypeCode::UInt256 => Some(32),
                // Nothing columns carry one placeholder byte per row.
                TypeCode::Nothing => Some(1),
                _ => None,
            },
            Type::FixedString { size } => Some(*size),
            Type::DateTime { .. } => Some(4),
            Type::DateTime64 { .. } => Some(8),
            Type::Enum8 { .. } => Some(1),
            Type::Enum16 { .. } => Some(2),
            Type::Decimal { precision, .. } => {
                Some(decimal_mantissa_width(*precision))
            }
            _ => None,
        }
    }

    /// Whether this is `Nullable(T)`.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable { .. })
    }

    /// Whether this is `Array(T)`.
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// Whether this is `Map(K, V)`.
    pub fn is_map(&self) -> bool {
        matches!(self, Type::Map { .. })
    }

    /// Whether this is a tuple (named or positional).
    pub fn is_tuple(&self) -> bool {
        matches!(self, Type::Tuple { .. })
    }

    /// Whether this is `Nested(...)`.
    pub fn is_nested(&self) -> bool {
        matches!(self, Type::Nested { .. })
    }

    /// Whether this is `LowCardinality(T)`.
    pub fn is_low_cardinality(&self) -> bool {
        matches!(self, Type::LowCardinality { .. })
    }

    /// Whether this is a decimal of any precision class.
    pub fn is_decimal(&self) -> bool {
        matches!(self, Type::Decimal { .. })
    }

    /// Whether this is Enum8 or Enum16.
    pub fn is_enum(&self) -> bool {
        matches!(self, Type::Enum8 { .. } | Type::Enum16 { .. })
    }

    /// Whether this is a JSON column.
    pub fn is_json(&self) -> bool {
        matches!(self, Type::Simple(TypeCode::Json))
    }

    /// `Some(n)` when this is `FixedString(n)`.
    pub fn fixed_string_size(&self) -> Option<usize> {
        match self {
            Type::FixedString { size } => Some(*size),
            _ => None,
        }
    }

    /// Creates an Int8 type.
    pub fn int8() -> Self {
        Type::Simple(TypeCode::Int8)
    }

    /// Creates an Int16 type.
    pub fn int16() -> Self {
        Type::Simple(TypeCode::Int16)
    }

    /// Creates an Int32 type.
    pub fn int32() -> Self {
        Type::Simple(TypeCode::Int32)
    }

    /// Creates an Int64 type.
    pub fn int64() -> Self {
        Type::Simple(TypeCode::Int64)
    }

    /// Creates an Int128 type.
    pub fn int128() -> Self {
        Type::Simple(TypeCode::Int128)
    }

    /// Creates an Int256 type.
    pub fn int256() -> Self {
        Type::Simple(TypeCode::Int256)
    }

    /// Creates a UInt8 type.
    pub fn uint8() -> Self {
        Type::Simple(TypeCode::UInt8)
    }

    /// Creates a UInt16 type.
    pub fn uint16() -> Self {
        Type::Simple(TypeCode::UInt16)
    }

    /// Creates a UInt32 type.
    pub fn uint32() -> Self {
        Type::Simple(TypeCode::UInt32)
    }

    /// Creates a UInt64 type.
    pub fn uint64() -> Self {
        Type::Simple(TypeCode::UInt64)
    }

    /// Creates a UInt128 type.
    pub fn uint128() -> Self {
        Type::Simple(TypeCode::UInt128)
    }

    /// Creates a UInt256 type.
    pub fn uint256() -> Self {
        Type::Simple(TypeCode::UInt256)
    }

    /// Creates a Float32 type.
    pub fn float32() -> Self {
        Type::Simple(TypeCode::Float32)
    }

    /// Creates a Float64 type.
    pub fn float64() -> Self {
        Type::Simple(TypeCode::Float64)
    }

    /// Creates a Bool type.
    pub fn bool() -> Self {
        Type::Simple(TypeCode::Bool)
    }

    /// Creates a String type.
    pub fn string() -> Self {
        Type::Simple(TypeCode::String)
    }

    /// Creates a FixedString type of `size` bytes.
    pub fn fixed_string(size: usize) -> Self {
        Type::FixedString { size }
    }

    /// Creates a Date type.
    pub fn date() -> Self {
        Type::Simple(TypeCode::Date)
    }

    /// Creates a Date32 type.
    pub fn date32() -> Self {
        Type::Simple(TypeCode::Date32)
    }

    /// Creates a DateTime type without a timezone.
    pub fn datetime() -> Self {
        Type::DateTime { timezone: None }
    }

    /// Creates a DateTime64 type with the given precision.
    pub fn datetime64(precision: usize) -> Self {
        Type::DateTime64 { precision, timezone: None }
    }

    /// Creates a Decimal type.
    pub fn decimal(precision: usize, scale: usize) -> Self {
        Type::Decimal { precision, scale }
    }

    /// Creates a UUID type.
    pub fn uuid() -> Self {
        Type::Simple(TypeCode::UUID)
    }

    /// Creates an IPv4 type.
    pub fn ipv4() -> Self {
        Type::Simple(TypeCode::IPv4)
    }

    /// Creates an IPv6 type.
    pub fn ipv6() -> Self {
        Type::Simple(TypeCode::IPv6)
    }

    /// Creates a JSON type.
    pub fn json() -> Self {
        Type::Simple(TypeCode::Json)
    }

    /// Creates a Nothing type.
    pub fn nothing() -> Self {
        Type::Simple(TypeCode::Nothing)
    }

    /// Creates an Array type.
    pub fn array(item_type: Type) -> Self {
        Type::Array { item_type: Box::new(item_type) }
    }

    /// Creates a Nullable type.
    pub fn nullable(nested_type: Type) -> Self {
        Type::Nullable { nested_type: Box::new(nested_type) }
    }

    /// Creates a positional Tuple type.
    pub fn tuple(item_types: Vec<Type>) -> Self {
        Type::Tuple { item_types, field_names: Vec::new() }
    }

    /// Creates a Map type.
    pub fn map(key_type: Type, value_type: Type) -> Self {
        Type::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    /// Creates a LowCardinality type.
    pub fn low_cardinality(nested_type: Type) -> Self {
        Type::LowCardinality { nested_type: Box::new(nested_type) }
    }

    /// Creates an Enum8 type.
    pub fn enum8(items: Vec<EnumItem>) -> Self {
        Type::Enum8 { items }
    }

    /// Creates an Enum16 type.
    pub fn enum16(items: Vec<EnumItem>) -> Self {
        Type::Enum16 { items }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Mantissa byte width for a decimal precision class.
pub fn decimal_mantissa_width(precision: usize) -> usize {
    if precision <= 9 {
        4
    } else if precision <= 18 {
        8
    } else if precision <= 38 {
        16
    } else {
        32
    }
}

fn format_enum_items(items: &[EnumItem]) -> String {
    items
        .iter()
        .map(|item| format!("'{}' = {}", item.name.replace('\'', "\\'"), item.value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Maps a Rust scalar to its default ClickHouse type; used by the
/// type-inferring column constructors.
pub trait ToType {
    /// The descriptor for this Rust type.
    fn to_type() -> Type;
}

macro_rules! impl_to_type {
    ($rust:ty, $ctor:ident) => {
        impl ToType for $rust {
            fn to_type() -> Type {
                Type::$ctor()
            }
        }
    };
}

impl_to_type!(i8, int8);
impl_to_type!(i16, int16);
impl_to_type!(i32, int32);
impl_to_type!(i64, int64);
impl_to_type!(i128, int128);
impl_to_type!(u8, uint8);
impl_to_type!(u16, uint16);
impl_to_type!(u32, uint32);
impl_to_type!(u64, uint64);
impl_to_type!(u128, uint128);
impl_to_type!(f32, float32);
impl_to_type!(f64, float64);
impl_to_type!(i256, int256);
impl_to_type!(u256, uint256);
