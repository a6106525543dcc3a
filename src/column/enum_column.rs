//! Enum8 and Enum16 columns.
//!
//! The wire carries the raw Int8/Int16 values; the name-to-value mapping
//! lives in the descriptor only.

use super::{
    downcast_err,
    Column,
    ColumnRef,
};
use crate::{
    io::buffer_utils,
    types::{
        EnumItem,
        Type,
    },
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::sync::Arc;

macro_rules! enum_column {
    ($(#[$doc:meta])* $name:ident, $elem:ty, $width:expr, $get:ident, $put:ident, $variant:ident) => {
        $(#[$doc])*
        pub struct $name {
            type_: Type,
            items: Vec<EnumItem>,
            data: Vec<$elem>,
        }

        impl $name {
            /// Create an empty column from its descriptor.
            pub fn new(type_: Type) -> Result<Self> {
                let items = match &type_ {
                    Type::$variant { items } => items.clone(),
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            concat!(
                                stringify!($name),
                                " requires ",
                                stringify!($variant),
                                ", got {}"
                            ),
                            other.name()
                        )))
                    }
                };
                Ok(Self { type_, items, data: Vec::new() })
            }

            /// Append one raw wire value.
            pub fn append(&mut self, value: $elem) {
                self.data.push(value);
            }

            /// Append a variant by name.
            pub fn append_name(&mut self, name: &str) -> Result<()> {
                let item = self
                    .items
                    .iter()
                    .find(|item| item.name == name)
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "unknown enum variant '{}'",
                            name
                        ))
                    })?;
                self.data.push(item.value as $elem);
                Ok(())
            }

            /// Raw value at `index`, if in bounds.
            pub fn get(&self, index: usize) -> Option<$elem> {
                self.data.get(index).copied()
            }

            /// Raw value at `index`; panics out of bounds.
            pub fn at(&self, index: usize) -> $elem {
                self.data[index]
            }

            /// Variant name for the value at `index`, from the descriptor
            /// mapping.
            pub fn name_at(&self, index: usize) -> Option<&str> {
                let value = self.get(index)? as i16;
                self.items
                    .iter()
                    .find(|item| item.value == value)
                    .map(|item| item.name.as_str())
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

        impl Column for $name {
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
                    .downcast_ref::<$name>()
                    .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;
                self.data.extend_from_slice(&other.data);
                Ok(())
            }

            fn load_from_buffer(
                &mut self,
                buffer: &mut &[u8],
                rows: usize,
            ) -> Result<()> {
                buffer_utils::ensure(buffer, rows * $width, "enum data")?;
                self.data.reserve(rows);
                for _ in 0..rows {
                    self.data.push(buffer.$get());
                }
                Ok(())
            }

            fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
                for &value in &self.data {
                    buffer.$put(value);
                }
                Ok(())
            }

            fn clone_empty(&self) -> ColumnRef {
                Arc::new(
                    $name::new(self.type_.clone())
                        .expect("descriptor already validated"),
                )
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
                let mut result = $name::new(self.type_.clone())?;
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
    };
}

enum_column!(
    /// `Enum8` column stored as Int8.
    ColumnEnum8,
    i8,
    1,
    get_i8,
    put_i8,
    Enum8
);

enum_column!(
    /// `Enum16` column stored as Int16.
    ColumnEnum16,
    i16,
    2,
    get_i16_le,
    put_i16_le,
    Enum16
);
