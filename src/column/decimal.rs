//! Decimal column implementation.
//!
//! The wire carries scaled integer mantissas; the precision class selects
//! the width: up to 9 digits → i32, 18 → i64, 38 → i128, beyond → i256.
//! Scale is applied by the caller or the extractors, never by the codec.

use super::{
    downcast_err,
    Column,
    ColumnRef,
};
use crate::{
    io::buffer_utils,
    types::{
        decimal_mantissa_width,
        i256,
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

enum DecimalData {
    I32(Vec<i32>),
    I64(Vec<i64>),
    I128(Vec<i128>),
    I256(Vec<i256>),
}

impl DecimalData {
    fn for_precision(precision: usize) -> Self {
        match decimal_mantissa_width(precision) {
            4 => DecimalData::I32(Vec::new()),
            8 => DecimalData::I64(Vec::new()),
            16 => DecimalData::I128(Vec::new()),
            _ => DecimalData::I256(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            DecimalData::I32(v) => v.len(),
            DecimalData::I64(v) => v.len(),
            DecimalData::I128(v) => v.len(),
            DecimalData::I256(v) => v.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            DecimalData::I32(v) => v.clear(),
            DecimalData::I64(v) => v.clear(),
            DecimalData::I128(v) => v.clear(),
            DecimalData::I256(v) => v.clear(),
        }
    }

    fn reserve(&mut self, additional: usize) {
        match self {
            DecimalData::I32(v) => v.reserve(additional),
            DecimalData::I64(v) => v.reserve(additional),
            DecimalData::I128(v) => v.reserve(additional),
            DecimalData::I256(v) => v.reserve(additional),
        }
    }
}

/// Column for `Decimal(P, S)` of any precision class.
pub struct ColumnDecimal {
    type_: Type,
    precision: usize,
    scale: usize,
    data: DecimalData,
}

impl ColumnDecimal {
    /// Create an empty column from a `Decimal(P, S)` descriptor.
    pub fn new(type_: Type) -> Result<Self> {
        let (precision, scale) = match &type_ {
            Type::Decimal { precision, scale } => (*precision, *scale),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "ColumnDecimal requires Decimal, got {}",
                    other.name()
                )))
            }
        };

        Ok(Self {
            data: DecimalData::for_precision(precision),
            type_,
            precision,
            scale,
        })
    }

    /// Total significant digits.
    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Digits after the decimal point.
    pub fn scale(&self) -> usize {
        self.scale
    }

    /// Append a raw mantissa (already scaled by `10^scale`).
    pub fn append_mantissa(&mut self, mantissa: i128) {
        match &mut self.data {
            DecimalData::I32(v) => v.push(mantissa as i32),
            DecimalData::I64(v) => v.push(mantissa as i64),
            DecimalData::I128(v) => v.push(mantissa),
            DecimalData::I256(v) => v.push(i256::from_i128(mantissa)),
        }
    }

    /// Append a float, scaling by `10^scale` and truncating toward zero.
    pub fn append_scaled_f64(&mut self, value: f64) {
        let scaled = (value * 10f64.powi(self.scale as i32)).trunc();
        self.append_mantissa(scaled as i128);
    }

    /// Mantissa at `index` as i128. `None` out of bounds or when a 256-bit
    /// mantissa does not fit.
    pub fn mantissa_at(&self, index: usize) -> Option<i128> {
        match &self.data {
            DecimalData::I32(v) => v.get(index).map(|&m| m as i128),
            DecimalData::I64(v) => v.get(index).map(|&m| m as i128),
            DecimalData::I128(v) => v.get(index).copied(),
            DecimalData::I256(v) => v.get(index).and_then(|m| m.to_i128()),
        }
    }

    /// Approximate value at `index` as f64.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        let mantissa = self.mantissa_at(index)?;
        Some(mantissa as f64 / 10f64.powi(self.scale as i32))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    fn mantissa_width(&self) -> usize {
        decimal_mantissa_width(self.precision)
    }
}

impl Column for ColumnDecimal {
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
            .downcast_ref::<ColumnDecimal>()
            .ok_or_else(|| downcast_err(&self.type_, other.column_type()))?;

        if self.mantissa_width() != other.mantissa_width()
            || self.scale != other.scale
        {
            return Err(downcast_err(&self.type_, &other.type_));
        }

        match (&mut self.data, &other.data) {
            (DecimalData::I32(a), DecimalData::I32(b)) => {
                a.extend_from_slice(b)
            }
            (DecimalData::I64(a), DecimalData::I64(b)) => {
                a.extend_from_slice(b)
            }
            (DecimalData::I128(a), DecimalData::I128(b)) => {
                a.extend_from_slice(b)
            }
            (DecimalData::I256(a), DecimalData::I256(b)) => {
                a.extend_from_slice(b)
            }
            _ => unreachable!("widths already checked"),
        }
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        buffer_utils::ensure(
            buffer,
            rows * self.mantissa_width(),
            "Decimal data",
        )?;
        self.data.reserve(rows);

        match &mut self.data {
            DecimalData::I32(v) => {
                for _ in 0..rows {
                    v.push(buffer.get_i32_le());
                }
            }
            DecimalData::I64(v) => {
                for _ in 0..rows {
                    v.push(buffer.get_i64_le());
                }
            }
            DecimalData::I128(v) => {
                for _ in 0..rows {
                    v.push(buffer.get_i128_le());
                }
            }
            DecimalData::I256(v) => {
                for _ in 0..rows {
                    let mut bytes = [0u8; 32];
                    bytes.copy_from_slice(&buffer[..32]);
                    buffer.advance(32);
                    v.push(i256::from_le_bytes(bytes));
                }
            }
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        match &self.data {
            DecimalData::I32(v) => {
                for &m in v {
                    buffer.put_i32_le(m);
                }
            }
            DecimalData::I64(v) => {
                for &m in v {
                    buffer.put_i64_le(m);
                }
            }
            DecimalData::I128(v) => {
                for &m in v {
                    buffer.put_i128_le(m);
                }
            }
            DecimalData::I256(v) => {
                for m in v {
                    buffer.put_slice(&m.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnDecimal::new(self.type_.clone())
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

        let mut result = ColumnDecimal::new(self.type_.clone())?;
        result.data = match &self.data {
            DecimalData::I32(v) => {
                DecimalData::I32(v[begin..begin + len].to_vec())
            }
            DecimalData::I64(v) => {
                DecimalData::I64(v[begin..begin + len].to_vec())
            }
            DecimalData::I128(v) => {
                DecimalData::I128(v[begin..begin + len].to_vec())
            }
            DecimalData::I256(v) => {
                DecimalData::I256(v[begin..begin + len].to_vec())
            }
        };
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
