//! Recursive-descent parser for ClickHouse type strings.
//!
//! Grammar, informally:
//!
//! ```text
//! type := IDENT ( "(" args ")" )?
//! args := arg ( "," arg )*
//! arg  := ( IDENT SP )? type          // named field form
//!       | QUOTED ( "=" SIGNED_INT )?  // enum binding
//!       | SIGNED_INT
//!       | QUOTED                      // timezone etc.
//! ```
//!
//! Quoted strings use single quotes with `''` doubling or `\'` escapes.
//! Parse failures surface as [`Error::MalformedType`].

use super::{
    EnumItem,
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};
use std::{
    cell::RefCell,
    collections::HashMap,
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Quoted(String),
    LPar,
    RPar,
    Comma,
    Assign,
}

fn malformed(input: &str, what: impl std::fmt::Display) -> Error {
    Error::MalformedType(format!("{} in '{}'", what, input))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => pos += 1,
            '(' => {
                tokens.push(Token::LPar);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RPar);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '=' => {
                tokens.push(Token::Assign);
                pos += 1;
            }
            '\'' => {
                pos += 1;
                let mut value = Vec::new();
                loop {
                    if pos >= bytes.len() {
                        return Err(malformed(input, "unterminated quote"));
                    }
                    match bytes[pos] {
                        b'\'' => {
                            // '' is an escaped quote, a lone ' closes.
                            if bytes.get(pos + 1) == Some(&b'\'') {
                                value.push(b'\'');
                                pos += 2;
                            } else {
                                pos += 1;
                                break;
                            }
                        }
                        b'\\' if pos + 1 < bytes.len() => {
                            value.push(bytes[pos + 1]);
                            pos += 2;
                        }
                        b => {
                            value.push(b);
                            pos += 1;
                        }
                    }
                }
                let value = String::from_utf8(value).map_err(|_| {
                    malformed(input, "invalid UTF-8 in quoted string")
                })?;
                tokens.push(Token::Quoted(value));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = pos;
                while pos < bytes.len() {
                    let c = bytes[pos] as char;
                    if !c.is_ascii_alphanumeric() && c != '_' {
                        break;
                    }
                    pos += 1;
                }
                tokens.push(Token::Ident(input[start..pos].to_string()));
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let start = pos;
                pos += 1;
                while pos < bytes.len()
                    && (bytes[pos] as char).is_ascii_digit()
                {
                    pos += 1;
                }
                let number = input[start..pos]
                    .parse::<i64>()
                    .map_err(|_| malformed(input, "invalid number"))?;
                tokens.push(Token::Number(number));
            }
            other => {
                return Err(malformed(
                    input,
                    format_args!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

struct TypeParser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        Ok(Self { input, tokens: tokenize(input)?, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(malformed(
                self.input,
                format_args!("expected {:?}, got {:?}", expected, token),
            )),
            None => Err(malformed(
                self.input,
                format_args!("expected {:?}, got end of input", expected),
            )),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(malformed(
                self.input,
                format_args!("expected identifier, got {:?}", other),
            )),
        }
    }

    fn expect_number(&mut self) -> Result<i64> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            other => Err(malformed(
                self.input,
                format_args!("expected number, got {:?}", other),
            )),
        }
    }

    fn expect_quoted(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Quoted(s)) => Ok(s),
            other => Err(malformed(
                self.input,
                format_args!("expected quoted string, got {:?}", other),
            )),
        }
    }

    fn expect_usize(&mut self) -> Result<usize> {
        let n = self.expect_number()?;
        usize::try_from(n)
            .map_err(|_| malformed(self.input, "negative parameter"))
    }

    fn parse_type(&mut self) -> Result<Type> {
        let name = self.expect_ident()?;
        self.parse_constructed(&name)
    }

    fn parse_constructed(&mut self, name: &str) -> Result<Type> {
        match name {
            "Nullable" => {
                self.expect(Token::LPar)?;
                let inner = self.parse_type()?;
                self.expect(Token::RPar)?;
                Ok(Type::nullable(inner))
            }
            "Array" => {
                self.expect(Token::LPar)?;
                let inner = self.parse_type()?;
                self.expect(Token::RPar)?;
                Ok(Type::array(inner))
            }
            "LowCardinality" => {
                self.expect(Token::LPar)?;
                let inner = self.parse_type()?;
                self.expect(Token::RPar)?;
                Ok(Type::low_cardinality(inner))
            }
            "Map" => {
                self.expect(Token::LPar)?;
                let key = self.parse_type()?;
                self.expect(Token::Comma)?;
                let value = self.parse_type()?;
                self.expect(Token::RPar)?;
                Ok(Type::map(key, value))
            }
            "Tuple" => {
                let (field_names, item_types) = self.parse_fields()?;
                Ok(Type::Tuple { item_types, field_names })
            }
            "Nested" => {
                let (field_names, item_types) = self.parse_fields()?;
                if field_names.is_empty() {
                    return Err(malformed(
                        self.input,
                        "Nested requires named fields",
                    ));
                }
                Ok(Type::Nested { field_names, item_types })
            }
            "FixedString" => {
                self.expect(Token::LPar)?;
                let size = self.expect_usize()?;
                self.expect(Token::RPar)?;
                if size == 0 {
                    return Err(malformed(self.input, "FixedString(0)"));
                }
                Ok(Type::fixed_string(size))
            }
            "DateTime" => {
                if self.peek() == Some(&Token::LPar) {
                    self.next();
                    let timezone = self.expect_quoted()?;
                    self.expect(Token::RPar)?;
                    Ok(Type::DateTime { timezone: Some(timezone) })
                } else {
                    Ok(Type::datetime())
                }
            }
            "DateTime64" => {
                self.expect(Token::LPar)?;
                let precision = self.expect_usize()?;
                let timezone = if self.peek() == Some(&Token::Comma) {
                    self.next();
                    Some(self.expect_quoted()?)
                } else {
                    None
                };
                self.expect(Token::RPar)?;
                Ok(Type::DateTime64 { precision, timezone })
            }
            "Decimal" => {
                self.expect(Token::LPar)?;
                let precision = self.expect_usize()?;
                self.expect(Token::Comma)?;
                let scale = self.expect_usize()?;
                self.expect(Token::RPar)?;
                Ok(Type::decimal(precision, scale))
            }
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                let precision = match name {
                    "Decimal32" => 9,
                    "Decimal64" => 18,
                    "Decimal128" => 38,
                    _ => 76,
                };
                self.expect(Token::LPar)?;
                let scale = self.expect_usize()?;
                self.expect(Token::RPar)?;
                Ok(Type::decimal(precision, scale))
            }
            "Enum8" => Ok(Type::Enum8 { items: self.parse_enum_items(i8::MIN as i64, i8::MAX as i64)? }),
            "Enum16" => Ok(Type::Enum16 {
                items: self.parse_enum_items(i16::MIN as i64, i16::MAX as i64)?,
            }),
            // The aggregate wrapper is transparent on the wire; unwrap to
            // the stored type.
            "SimpleAggregateFunction" => {
                self.expect(Token::LPar)?;
                self.expect_ident()?;
                self.expect(Token::Comma)?;
                let inner = self.parse_type()?;
                self.expect(Token::RPar)?;
                Ok(inner)
            }
            "Object" => {
                // Object('json') is the pre-24 JSON spelling.
                self.expect(Token::LPar)?;
                let kind = self.expect_quoted()?;
                self.expect(Token::RPar)?;
                if kind.eq_ignore_ascii_case("json") {
                    Ok(Type::json())
                } else {
                    Err(malformed(
                        self.input,
                        format_args!("unsupported Object kind '{}'", kind),
                    ))
                }
            }
            _ => match simple_code(name) {
                Some(code) => Ok(Type::Simple(code)),
                None => Err(malformed(
                    self.input,
                    format_args!("unknown type '{}'", name),
                )),
            },
        }
    }

    // Tuple/Nested argument list: all elements positional or all named.
    fn parse_fields(&mut self) -> Result<(Vec<String>, Vec<Type>)> {
        self.expect(Token::LPar)?;

        let mut field_names = Vec::new();
        let mut item_types = Vec::new();
        let mut named = None;

        loop {
            let first = self.expect_ident()?;

            let is_named =
                matches!(self.peek(), Some(Token::Ident(_)));
            match named {
                None => named = Some(is_named),
                Some(expected) if expected != is_named => {
                    return Err(malformed(
                        self.input,
                        "mixed named and positional tuple elements",
                    ));
                }
                _ => {}
            }

            if is_named {
                field_names.push(first);
                item_types.push(self.parse_type()?);
            } else {
                item_types.push(self.parse_constructed(&first)?);
            }

            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RPar) => break,
                other => {
                    return Err(malformed(
                        self.input,
                        format_args!("expected ',' or ')', got {:?}", other),
                    ));
                }
            }
        }

        Ok((field_names, item_types))
    }

    fn parse_enum_items(&mut self, min: i64, max: i64) -> Result<Vec<EnumItem>> {
        self.expect(Token::LPar)?;

        let mut items = Vec::new();
        loop {
            let name = self.expect_quoted()?;
            self.expect(Token::Assign)?;
            let value = self.expect_number()?;
            if value < min || value > max {
                return Err(malformed(
                    self.input,
                    format_args!("enum value {} out of range", value),
                ));
            }
            items.push(EnumItem { name, value: value as i16 });

            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RPar) => break,
                other => {
                    return Err(malformed(
                        self.input,
                        format_args!("expected ',' or ')', got {:?}", other),
                    ));
                }
            }
        }

        Ok(items)
    }
}

fn simple_code(name: &str) -> Option<TypeCode> {
    Some(match name {
        "Nothing" | "Void" => TypeCode::Nothing,
        "Int8" => TypeCode::Int8,
        "Int16" => TypeCode::Int16,
        "Int32" => TypeCode::Int32,
        "Int64" => TypeCode::Int64,
        "Int128" => TypeCode::Int128,
        "Int256" => TypeCode::Int256,
        "UInt8" => TypeCode::UInt8,
        "UInt16" => TypeCode::UInt16,
        "UInt32" => TypeCode::UInt32,
        "UInt64" => TypeCode::UInt64,
        "UInt128" => TypeCode::UInt128,
        "UInt256" => TypeCode::UInt256,
        "Float32" => TypeCode::Float32,
        "Float64" => TypeCode::Float64,
        "Bool" => TypeCode::Bool,
        "String" => TypeCode::String,
        "Date" => TypeCode::Date,
        "Date32" => TypeCode::Date32,
        "UUID" => TypeCode::UUID,
        "IPv4" => TypeCode::IPv4,
        "IPv6" => TypeCode::IPv6,
        "JSON" => TypeCode::Json,
        _ => return None,
    })
}

// Per-thread cache of parsed type strings. Server blocks repeat the same
// handful of type names per query, so hits dominate.
thread_local! {
    static TYPE_CACHE: RefCell<HashMap<String, Type>> =
        RefCell::new(HashMap::new());
}

/// Parse a type name, consulting the thread-local cache.
pub fn parse_type_name(type_name: &str) -> Result<Type> {
    TYPE_CACHE.with(|cache| {
        if let Some(parsed) = cache.borrow().get(type_name) {
            return Ok(parsed.clone());
        }

        let mut parser = TypeParser::new(type_name)?;
        let parsed = parser.parse_type()?;
        if parser.pos != parser.tokens.len() {
            return Err(malformed(type_name, "trailing tokens"));
        }

        cache
            .borrow_mut()
            .insert(type_name.to_string(), parsed.clone());
        Ok(parsed)
    })
}
