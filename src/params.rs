//! Query parameter pipeline: the `@name` rewriter, value type inference,
//! and the Field-dump serialisation used by the parameters section of a
//! Query message.

use crate::{
    query::Query,
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    NaiveDateTime,
    Utc,
};
use std::net::{
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
};
use uuid::Uuid;

/// A parameter value supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// NULL; requires a declared `Nullable(T)` type.
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// A decimal number, inferred as `Decimal128(18)`.
    Decimal(f64),
    String(String),
    Date(NaiveDate),
    /// A local timestamp, inferred as `DateTime`.
    DateTime(NaiveDateTime),
    /// An offset-aware timestamp, inferred as `DateTime64(6)`.
    DateTime64(DateTime<Utc>),
    Uuid(Uuid),
    /// An IP address, inferred as `IPv6`.
    Ip(IpAddr),
    /// A sequence, inferred as `Array(T)` recursively.
    Array(Vec<ParamValue>),
}

macro_rules! impl_param_from {
    ($rust:ty, $variant:ident) => {
        impl From<$rust> for ParamValue {
            fn from(value: $rust) -> Self {
                ParamValue::$variant(value)
            }
        }
    };
}

impl_param_from!(bool, Bool);
impl_param_from!(i8, Int8);
impl_param_from!(i16, Int16);
impl_param_from!(i32, Int32);
impl_param_from!(i64, Int64);
impl_param_from!(u8, UInt8);
impl_param_from!(u16, UInt16);
impl_param_from!(u32, UInt32);
impl_param_from!(u64, UInt64);
impl_param_from!(f32, Float32);
impl_param_from!(f64, Float64);
impl_param_from!(String, String);
impl_param_from!(NaiveDate, Date);
impl_param_from!(NaiveDateTime, DateTime);
impl_param_from!(Uuid, Uuid);
impl_param_from!(IpAddr, Ip);

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::DateTime64(value)
    }
}

impl From<Ipv4Addr> for ParamValue {
    fn from(value: Ipv4Addr) -> Self {
        ParamValue::Ip(IpAddr::V4(value))
    }
}

impl From<Ipv6Addr> for ParamValue {
    fn from(value: Ipv6Addr) -> Self {
        ParamValue::Ip(IpAddr::V6(value))
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ParamValue::Null,
        }
    }
}

impl ParamValue {
    /// Infer the ClickHouse type for this value. Null cannot be inferred;
    /// it needs a declared `Nullable(T)`.
    pub fn infer_type(&self) -> Result<String> {
        Ok(match self {
            ParamValue::Null => {
                return Err(Error::TypeInference(
                    "NULL needs a declared Nullable(T) type".to_string(),
                ))
            }
            ParamValue::Bool(_) => "Bool".to_string(),
            ParamValue::Int8(_) => "Int8".to_string(),
            ParamValue::Int16(_) => "Int16".to_string(),
            ParamValue::Int32(_) => "Int32".to_string(),
            ParamValue::Int64(_) => "Int64".to_string(),
            ParamValue::UInt8(_) => "UInt8".to_string(),
            ParamValue::UInt16(_) => "UInt16".to_string(),
            ParamValue::UInt32(_) => "UInt32".to_string(),
            ParamValue::UInt64(_) => "UInt64".to_string(),
            ParamValue::Float32(_) => "Float32".to_string(),
            ParamValue::Float64(_) => "Float64".to_string(),
            ParamValue::Decimal(_) => "Decimal128(18)".to_string(),
            ParamValue::String(_) => "String".to_string(),
            ParamValue::Date(_) => "Date".to_string(),
            ParamValue::DateTime(_) => "DateTime".to_string(),
            ParamValue::DateTime64(_) => "DateTime64(6)".to_string(),
            ParamValue::Uuid(_) => "UUID".to_string(),
            ParamValue::Ip(_) => "IPv6".to_string(),
            ParamValue::Array(elements) => {
                let element = elements
                    .iter()
                    .find(|e| !matches!(e, ParamValue::Null))
                    .ok_or_else(|| {
                        Error::TypeInference(
                            "cannot infer element type of an empty or \
                             all-NULL array"
                                .to_string(),
                        )
                    })?;
                format!("Array({})", element.infer_type()?)
            }
        })
    }

    /// The Field-dump form carried in the parameters section: a
    /// single-quoted escaped string, except NULL which travels unquoted.
    pub fn field_dump(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::String(s) => format!("'{}'", escape(s)),
            ParamValue::Array(_) => format!("'{}'", self.raw_text()),
            other => format!("'{}'", other.raw_text()),
        }
    }

    // The unquoted textual form, as used for array elements.
    fn raw_text(&self) -> String {
        match self {
            ParamValue::Null => "NULL".to_string(),
            ParamValue::Bool(v) => v.to_string(),
            ParamValue::Int8(v) => v.to_string(),
            ParamValue::Int16(v) => v.to_string(),
            ParamValue::Int32(v) => v.to_string(),
            ParamValue::Int64(v) => v.to_string(),
            ParamValue::UInt8(v) => v.to_string(),
            ParamValue::UInt16(v) => v.to_string(),
            ParamValue::UInt32(v) => v.to_string(),
            ParamValue::UInt64(v) => v.to_string(),
            ParamValue::Float32(v) => {
                float_text(v.is_nan(), v.is_infinite(), v.is_sign_negative(), || {
                    v.to_string()
                })
            }
            ParamValue::Float64(v) | ParamValue::Decimal(v) => {
                float_text(v.is_nan(), v.is_infinite(), v.is_sign_negative(), || {
                    v.to_string()
                })
            }
            ParamValue::String(s) => format!("'{}'", escape(s)),
            ParamValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            ParamValue::DateTime(ts) => {
                ts.format("%Y-%m-%d %H:%M:%S").to_string()
            }
            ParamValue::DateTime64(ts) => {
                ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
            }
            ParamValue::Uuid(u) => u.hyphenated().to_string(),
            ParamValue::Ip(addr) => addr.to_string(),
            ParamValue::Array(elements) => {
                let inner: Vec<String> =
                    elements.iter().map(|e| e.raw_text()).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

fn float_text(
    nan: bool,
    infinite: bool,
    negative: bool,
    finite: impl FnOnce() -> String,
) -> String {
    if nan {
        "nan".to_string()
    } else if infinite {
        if negative { "-inf".to_string() } else { "inf".to_string() }
    } else {
        finite()
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Rewrite `@name` placeholders to `{name:Type}` server-side parameter
/// references and build the parameters section.
///
/// `@@` is preserved (server and system variables). Each replaced name
/// must have a bound parameter, or the rewrite fails with
/// [`Error::MissingParameter`]. Returns the rewritten text and the
/// `(name, field_dump)` pairs for every parameter referenced.
pub fn rewrite_query(query: &Query) -> Result<(String, Vec<(String, String)>)> {
    let text = query.text();
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 32);
    let mut used = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let is_placeholder = bytes[i] == b'@'
            && (i == 0 || bytes[i - 1] != b'@')
            && i + 1 < bytes.len()
            && is_ident_start(bytes[i + 1]);

        if !is_placeholder {
            // Multi-byte UTF-8 never contains '@', so bytes copy through
            // verbatim.
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != b'@' {
                i += 1;
            }
            out.push_str(&text[start..i]);
            continue;
        }

        let name_start = i + 1;
        let mut name_end = name_start;
        while name_end < bytes.len() && is_ident_continue(bytes[name_end]) {
            name_end += 1;
        }
        let name = &text[name_start..name_end];

        let value = query
            .params()
            .get(name)
            .ok_or_else(|| Error::MissingParameter(name.to_string()))?;

        let resolved_type = match query.param_types().get(name) {
            Some(declared) => declared.clone(),
            None => value.infer_type()?,
        };

        out.push_str(&format!("{{{}:{}}}", name, resolved_type));
        if !used.iter().any(|(n, _)| n == name) {
            used.push((name.to_string(), value.field_dump()));
        }
        i = name_end;
    }

    Ok((out, used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;

    #[test]
    fn rewrites_placeholders() {
        let query = Query::new("SELECT * FROM u WHERE id = @id AND name = @name")
            .with_param("id", 5i64)
            .with_param("name", "bob");

        let (text, params) = rewrite_query(&query).unwrap();
        assert_eq!(
            text,
            "SELECT * FROM u WHERE id = {id:Int64} AND name = {name:String}"
        );
        assert_eq!(params.len(), 2);
        assert!(params.contains(&("id".to_string(), "'5'".to_string())));
        assert!(params.contains(&("name".to_string(), "'bob'".to_string())));
    }

    #[test]
    fn preserves_system_variables() {
        let query = Query::new("SELECT @@version, @x").with_param("x", 1u8);
        let (text, _) = rewrite_query(&query).unwrap();
        assert_eq!(text, "SELECT @@version, {x:UInt8}");
    }

    #[test]
    fn triple_at_is_untouched() {
        // Mirrors the lookbehind: the third '@' follows an '@'.
        let query = Query::new("SELECT @@@x");
        let (text, params) = rewrite_query(&query).unwrap();
        assert_eq!(text, "SELECT @@@x");
        assert!(params.is_empty());
    }

    #[test]
    fn missing_parameter_fails() {
        let query = Query::new("SELECT @nope");
        assert!(matches!(
            rewrite_query(&query),
            Err(Error::MissingParameter(name)) if name == "nope"
        ));
    }

    #[test]
    fn bare_at_is_literal() {
        let query = Query::new("SELECT '@ not a param', 1 @ 2");
        let (text, _) = rewrite_query(&query).unwrap();
        assert_eq!(text, "SELECT '@ not a param', 1 @ 2");
    }

    #[test]
    fn declared_type_wins() {
        let query = Query::new("SELECT @v")
            .with_typed_param("v", "Nullable(Int32)", ParamValue::Null);
        let (text, params) = rewrite_query(&query).unwrap();
        assert_eq!(text, "SELECT {v:Nullable(Int32)}");
        assert_eq!(params[0].1, "NULL");
    }

    #[test]
    fn null_without_declared_type_fails() {
        let query = Query::new("SELECT @v").with_param("v", ParamValue::Null);
        assert!(matches!(
            rewrite_query(&query),
            Err(Error::TypeInference(_))
        ));
    }

    #[test]
    fn array_inference_and_dump() {
        let query = Query::new("SELECT * FROM u WHERE id IN @ids")
            .with_param("ids", vec![1i32, 2, 3]);
        let (text, params) = rewrite_query(&query).unwrap();

        assert_eq!(
            text,
            "SELECT * FROM u WHERE id IN {ids:Array(Int32)}"
        );
        assert_eq!(params[0], ("ids".to_string(), "'[1, 2, 3]'".to_string()));
    }

    #[test]
    fn string_array_requotes_elements() {
        let value: ParamValue = vec!["a", "it's"].into();
        assert_eq!(value.field_dump(), r"'['a', 'it\'s']'");
    }

    #[test]
    fn escaping() {
        let value = ParamValue::from(r"back\slash 'quoted'");
        assert_eq!(value.field_dump(), r"'back\\slash \'quoted\''");
    }

    #[test]
    fn special_floats() {
        assert_eq!(ParamValue::Float64(f64::NAN).field_dump(), "'nan'");
        assert_eq!(ParamValue::Float64(f64::INFINITY).field_dump(), "'inf'");
        assert_eq!(
            ParamValue::Float64(f64::NEG_INFINITY).field_dump(),
            "'-inf'"
        );
        assert_eq!(ParamValue::Float32(1.5).field_dump(), "'1.5'");
    }

    #[test]
    fn temporal_formats() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(ParamValue::from(date).field_dump(), "'2024-03-07'");

        let ts = date.and_hms_opt(12, 34, 56).unwrap();
        assert_eq!(
            ParamValue::from(ts).field_dump(),
            "'2024-03-07 12:34:56'"
        );

        let ts_utc = DateTime::<Utc>::from_naive_utc_and_offset(
            date.and_hms_micro_opt(1, 2, 3, 123456).unwrap(),
            Utc,
        );
        assert_eq!(
            ParamValue::from(ts_utc).field_dump(),
            "'2024-03-07 01:02:03.123456'"
        );
    }

    #[test]
    fn uuid_and_ip_formats() {
        let uuid =
            Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        assert_eq!(
            ParamValue::from(uuid).field_dump(),
            "'123e4567-e89b-12d3-a456-426614174000'"
        );

        let v4: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let value = ParamValue::from(v4);
        assert_eq!(value.infer_type().unwrap(), "IPv6");
        assert_eq!(value.field_dump(), "'10.0.0.1'");
    }

    #[test]
    fn repeated_reference_dumped_once() {
        let query = Query::new("SELECT @x, @x").with_param("x", 1i32);
        let (text, params) = rewrite_query(&query).unwrap();
        assert_eq!(text, "SELECT {x:Int32}, {x:Int32}");
        assert_eq!(params.len(), 1);
    }
}
