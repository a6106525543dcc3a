//! Type-string parser coverage over the shapes servers actually send.

use clickhouse_tcp::{
    types::{
        EnumItem,
        TypeCode,
    },
    Error,
    Type,
};

#[test]
fn every_simple_type_parses() {
    for name in [
        "Int8", "Int16", "Int32", "Int64", "Int128", "Int256", "UInt8",
        "UInt16", "UInt32", "UInt64", "UInt128", "UInt256", "Float32",
        "Float64", "Bool", "String", "Date", "Date32", "UUID", "IPv4",
        "IPv6", "JSON", "Nothing",
    ] {
        let parsed = Type::parse(name).unwrap();
        assert_eq!(parsed.name(), name, "name must round-trip");
    }
}

#[test]
fn parameterised_types_round_trip_their_names() {
    for name in [
        "FixedString(16)",
        "DateTime('Asia/Istanbul')",
        "DateTime64(3)",
        "DateTime64(9, 'UTC')",
        "Decimal(18, 4)",
        "Enum8('a' = 1, 'b' = 2)",
        "Array(String)",
        "Array(Array(Int64))",
        "Nullable(FixedString(8))",
        "Tuple(UInt8, String)",
        "Tuple(id UInt8, name String)",
        "Map(String, UInt64)",
        "Map(UUID, Nullable(String))",
        "LowCardinality(String)",
        "LowCardinality(Nullable(String))",
        "Array(LowCardinality(Nullable(String)))",
        "Nested(n UInt32, s String)",
    ] {
        let parsed = Type::parse(name).unwrap();
        assert_eq!(parsed.name(), name, "name must round-trip");
    }
}

#[test]
fn deep_nesting() {
    let parsed =
        Type::parse("Array(Map(String, Tuple(Array(UInt8), Nullable(Date))))")
            .unwrap();
    assert!(parsed.is_array());

    let Type::Array { item_type } = &parsed else { panic!() };
    assert!(item_type.is_map());
}

#[test]
fn enum_bindings() {
    let parsed =
        Type::parse("Enum16('up' = 1, 'down' = -1, 'it''s odd' = 0)").unwrap();
    assert_eq!(
        parsed,
        Type::enum16(vec![
            EnumItem { name: "up".into(), value: 1 },
            EnumItem { name: "down".into(), value: -1 },
            EnumItem { name: "it's odd".into(), value: 0 },
        ])
    );
}

#[test]
fn decimal_aliases_expand_to_precision_classes() {
    assert_eq!(Type::parse("Decimal32(2)").unwrap(), Type::decimal(9, 2));
    assert_eq!(Type::parse("Decimal64(4)").unwrap(), Type::decimal(18, 4));
    assert_eq!(Type::parse("Decimal128(6)").unwrap(), Type::decimal(38, 6));
    assert_eq!(
        Type::parse("Decimal256(10)").unwrap(),
        Type::decimal(76, 10)
    );
}

#[test]
fn nothing_and_nullable_nothing() {
    assert_eq!(
        Type::parse("Nothing").unwrap().code(),
        TypeCode::Nothing
    );
    let parsed = Type::parse("Nullable(Nothing)").unwrap();
    assert!(parsed.is_nullable());
}

#[test]
fn whitespace_variants() {
    let canonical = Type::parse("Map(String, Array(Int64))").unwrap();
    for variant in [
        "Map(String,Array(Int64))",
        "Map( String , Array( Int64 ) )",
        "Map(String,\tArray(Int64))",
    ] {
        assert_eq!(Type::parse(variant).unwrap(), canonical);
    }
}

#[test]
fn malformed_type_strings_are_rejected() {
    for bad in [
        "",
        "Array(",
        "Array()",
        "Array(String",
        "Array(String))",
        "Tuple(,)",
        "NotAType",
        "FixedString(-1)",
        "FixedString(abc)",
        "Enum8('a' 1)",
        "Enum8(a = 1)",
        "Map(String)",
        "Nullable()",
        "DateTime64('UTC')",
        "Tuple(id UInt8, String)",
    ] {
        assert!(
            matches!(Type::parse(bad), Err(Error::MalformedType(_))),
            "'{}' must be rejected",
            bad
        );
    }
}

#[test]
fn predicates_follow_structure() {
    assert!(Type::parse("LowCardinality(Nullable(String))")
        .unwrap()
        .is_low_cardinality());
    assert!(Type::parse("Nested(a UInt8)").unwrap().is_nested());
    assert!(Type::parse("Decimal(38, 2)").unwrap().is_decimal());
    assert!(Type::parse("Enum8('x' = 1)").unwrap().is_enum());
    assert_eq!(
        Type::parse("FixedString(32)").unwrap().fixed_string_size(),
        Some(32)
    );
}
