//! Sample columns covering every supported type, three rows each. Used by
//! the round-trip and skipper-coherence suites.

use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use clickhouse_tcp::{
    column::{
        column_value::{
            append_column_item,
            ColumnValue,
        },
        ColumnArray,
        ColumnLowCardinality,
        ColumnMap,
        ColumnNullable,
        ColumnString,
        ColumnTuple,
        ColumnUInt8,
        ColumnVector,
        ColumnRef,
    },
    io::create_column,
    types::{
        i256,
        u256,
    },
    Type,
};
use std::sync::Arc;

fn scalar_sample(type_name: &str, values: [ColumnValue; 3]) -> (Type, ColumnRef) {
    let type_ = Type::parse(type_name).unwrap();
    let mut column = create_column(&type_).unwrap();
    {
        let column = Arc::get_mut(&mut column).unwrap();
        for value in values {
            append_column_item(column, &value).unwrap();
        }
    }
    (type_, column)
}

fn date(y: i32, m: u32, d: u32) -> ColumnValue {
    ColumnValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn datetime(secs: i64) -> ColumnValue {
    ColumnValue::DateTime(DateTime::<Utc>::from_timestamp(secs, 0).unwrap())
}

fn array_of_int64(rows: &[&[i64]]) -> (Type, ColumnRef) {
    let type_ = Type::array(Type::int64());
    let mut column = ColumnArray::new(type_.clone()).unwrap();
    for row in rows {
        let mut elements = ColumnVector::<i64>::new();
        for &v in *row {
            elements.append(v);
        }
        column.append_array(Arc::new(elements)).unwrap();
    }
    (type_, Arc::new(column))
}

fn array_of_nullable_string() -> (Type, ColumnRef) {
    let type_ = Type::array(Type::nullable(Type::string()));
    let mut column = ColumnArray::new(type_.clone()).unwrap();

    for row in [
        vec![Some("a"), None],
        vec![],
        vec![Some("long-ish value"), Some(""), None],
    ] {
        let mut elements =
            ColumnNullable::new(Type::nullable(Type::string())).unwrap();
        for cell in row {
            match cell {
                Some(s) => elements
                    .append_value(&ColumnValue::from_string(s))
                    .unwrap(),
                None => elements.append_null().unwrap(),
            }
        }
        column.append_array(Arc::new(elements)).unwrap();
    }
    (type_, Arc::new(column))
}

fn nested_array() -> (Type, ColumnRef) {
    // Array(Array(UInt8)): [[1], [2, 3]], [], [[]]
    let inner_type = Type::array(Type::uint8());
    let type_ = Type::array(inner_type.clone());
    let mut column = ColumnArray::new(type_.clone()).unwrap();

    let mut first = ColumnArray::new(inner_type.clone()).unwrap();
    let mut a = ColumnUInt8::new();
    a.append(1);
    first.append_array(Arc::new(a)).unwrap();
    let mut b = ColumnUInt8::new();
    b.append(2);
    b.append(3);
    first.append_array(Arc::new(b)).unwrap();
    column.append_array(Arc::new(first)).unwrap();

    let empty = ColumnArray::new(inner_type.clone()).unwrap();
    column.append_array(Arc::new(empty)).unwrap();

    let mut third = ColumnArray::new(inner_type).unwrap();
    third.append_array(Arc::new(ColumnUInt8::new())).unwrap();
    column.append_array(Arc::new(third)).unwrap();

    (type_, Arc::new(column))
}

fn map_sample() -> (Type, ColumnRef) {
    let type_ = Type::map(Type::int8(), Type::string());
    let mut column = ColumnMap::new(type_.clone()).unwrap();

    let rows: [&[(i8, &str)]; 3] = [&[(1, "a"), (2, "b")], &[], &[(3, "c")]];
    for row in rows {
        {
            let keys = Arc::get_mut(column.keys_mut()).unwrap();
            for (k, _) in row {
                append_column_item(keys, &ColumnValue::Int8(*k)).unwrap();
            }
        }
        {
            let values = Arc::get_mut(column.values_mut()).unwrap();
            for (_, v) in row {
                append_column_item(values, &ColumnValue::from_string(*v))
                    .unwrap();
            }
        }
        column.append_len(row.len() as u64);
    }
    (type_, Arc::new(column))
}

fn tuple_sample() -> (Type, ColumnRef) {
    let type_ = Type::tuple(vec![Type::uint8(), Type::string()]);
    let mut ids = ColumnUInt8::new();
    let mut names = ColumnString::new();
    for (id, name) in [(1, "one"), (2, "two"), (3, "three")] {
        ids.append(id);
        names.append(name);
    }
    (
        type_.clone(),
        Arc::new(ColumnTuple::from_columns(
            type_,
            vec![Arc::new(ids), Arc::new(names)],
        )),
    )
}

fn low_cardinality(type_name: &str, values: [ColumnValue; 3]) -> (Type, ColumnRef) {
    let type_ = Type::parse(type_name).unwrap();
    let mut column = ColumnLowCardinality::new(type_.clone()).unwrap();
    for value in values {
        column.append(&value).unwrap();
    }
    (type_, Arc::new(column))
}

/// Every supported type with three rows of representative data.
pub fn sample_columns() -> Vec<(Type, ColumnRef)> {
    let mut samples = vec![
        scalar_sample(
            "UInt8",
            [0u8.into(), 1u8.into(), u8::MAX.into()],
        ),
        scalar_sample(
            "UInt16",
            [0u16.into(), 256u16.into(), u16::MAX.into()],
        ),
        scalar_sample(
            "UInt32",
            [0u32.into(), 65536u32.into(), u32::MAX.into()],
        ),
        scalar_sample("UInt64", [0u64.into(), 1u64.into(), u64::MAX.into()]),
        scalar_sample(
            "UInt128",
            [0u128.into(), 1u128.into(), u128::MAX.into()],
        ),
        scalar_sample(
            "UInt256",
            [
                u256::ZERO.into(),
                u256::from_u128(7).into(),
                u256::from_u128(u128::MAX).into(),
            ],
        ),
        scalar_sample("Int8", [i8::MIN.into(), 0i8.into(), i8::MAX.into()]),
        scalar_sample(
            "Int16",
            [i16::MIN.into(), (-1i16).into(), i16::MAX.into()],
        ),
        scalar_sample(
            "Int32",
            [i32::MIN.into(), 0i32.into(), i32::MAX.into()],
        ),
        scalar_sample(
            "Int64",
            [i64::MIN.into(), (-1i64).into(), i64::MAX.into()],
        ),
        scalar_sample(
            "Int128",
            [i128::MIN.into(), 0i128.into(), i128::MAX.into()],
        ),
        scalar_sample(
            "Int256",
            [
                i256::from_i128(i128::MIN).into(),
                i256::ZERO.into(),
                i256::from_i128(-42).into(),
            ],
        ),
        scalar_sample(
            "Float32",
            [0.0f32.into(), (-0.0f32).into(), f32::NAN.into()],
        ),
        scalar_sample(
            "Float64",
            [f64::INFINITY.into(), f64::MIN.into(), 1.5f64.into()],
        ),
        scalar_sample(
            "Bool",
            [
                ColumnValue::Bool(true),
                ColumnValue::Bool(false),
                ColumnValue::Bool(true),
            ],
        ),
        scalar_sample(
            "String",
            ["".into(), "hello".into(), "with\0nul and мир".into()],
        ),
        scalar_sample(
            "FixedString(5)",
            [
                ColumnValue::Bytes(vec![1, 2, 3, 4, 5]),
                ColumnValue::Bytes(vec![0; 5]),
                ColumnValue::String("ab".to_string()),
            ],
        ),
        scalar_sample(
            "Date",
            [date(1970, 1, 1), date(2024, 2, 29), date(2105, 1, 1)],
        ),
        scalar_sample(
            "Date32",
            [date(1925, 1, 1), date(1970, 1, 1), date(2024, 1, 1)],
        ),
        scalar_sample(
            "DateTime",
            [datetime(0), datetime(1_700_000_000), datetime(4_000_000_000)],
        ),
        scalar_sample(
            "DateTime64(3)",
            [datetime(0), datetime(1_700_000_000), datetime(1)],
        ),
        scalar_sample(
            "Decimal(9, 2)",
            [
                ColumnValue::Decimal(0.0),
                ColumnValue::Decimal(-12.34),
                ColumnValue::Decimal(99999.99),
            ],
        ),
        scalar_sample(
            "Decimal(18, 4)",
            [
                ColumnValue::Decimal(1.0001),
                ColumnValue::Decimal(-1.0),
                ColumnValue::Decimal(0.5),
            ],
        ),
        scalar_sample(
            "Decimal(38, 6)",
            [
                ColumnValue::Decimal(123.456789),
                ColumnValue::Decimal(0.0),
                ColumnValue::Decimal(-7.25),
            ],
        ),
        scalar_sample(
            "Decimal(76, 10)",
            [
                ColumnValue::Decimal(1.5),
                ColumnValue::Decimal(-2.25),
                ColumnValue::Decimal(0.0),
            ],
        ),
        scalar_sample(
            "Enum8('red' = 1, 'green' = 2)",
            [
                ColumnValue::Int8(1),
                ColumnValue::Int8(2),
                ColumnValue::String("red".to_string()),
            ],
        ),
        scalar_sample(
            "Enum16('a' = -300, 'b' = 300)",
            [
                ColumnValue::Int16(-300),
                ColumnValue::Int16(300),
                ColumnValue::String("a".to_string()),
            ],
        ),
        scalar_sample(
            "UUID",
            [
                uuid::Uuid::nil().into(),
                uuid::Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000")
                    .unwrap()
                    .into(),
                uuid::Uuid::max().into(),
            ],
        ),
        scalar_sample(
            "IPv4",
            [
                std::net::Ipv4Addr::new(0, 0, 0, 0).into(),
                std::net::Ipv4Addr::new(127, 0, 0, 1).into(),
                std::net::Ipv4Addr::new(255, 255, 255, 255).into(),
            ],
        ),
        scalar_sample(
            "IPv6",
            [
                "::".parse::<std::net::Ipv6Addr>().unwrap().into(),
                "::1".parse::<std::net::Ipv6Addr>().unwrap().into(),
                "2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap().into(),
            ],
        ),
        scalar_sample(
            "Nullable(UInt32)",
            [7u32.into(), ColumnValue::Null, 0u32.into()],
        ),
        scalar_sample(
            "Nullable(String)",
            [
                "present".into(),
                ColumnValue::Null,
                "".into(),
            ],
        ),
        array_of_int64(&[&[1, 2], &[], &[3, 4, 5]]),
        array_of_nullable_string(),
        nested_array(),
        map_sample(),
        tuple_sample(),
        low_cardinality(
            "LowCardinality(String)",
            ["x".into(), "y".into(), "x".into()],
        ),
        low_cardinality(
            "LowCardinality(Nullable(String))",
            ["v".into(), ColumnValue::Null, "v".into()],
        ),
    ];

    // JSON column, string serialisation.
    let json_type = Type::json();
    let mut json = clickhouse_tcp::column::ColumnJson::new();
    json.append_raw(r#"{"a":1}"#);
    json.append_raw("{}");
    json.append_raw(r#"{"nested":{"b":[1,2]}}"#);
    let json_column: ColumnRef = Arc::new(json);
    samples.push((json_type, json_column));

    samples
}
