//! Date and time columns.
//!
//! Wire layouts: `Date` is u16 days since 1970-01-01, `Date32` is i32 days
//! extending before the epoch, `DateTime` is u32 seconds since the epoch,
//! `DateTime64(p)` is i64 ticks of `10^-p` seconds. Timezones are column
//! metadata carried by the descriptor; elements are plain numbers.

use super::{
    downcast_err,
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
use chrono::{
    DateTime,
    Days,
    NaiveDate,
    Utc,
};
use std::sync::Arc;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date")
}

macro_rules! date_column {
    ($(#[$doc:meta])* $name:ident, $elem:ty, $width:expr, $get:ident, $put:ident) => {
        $(#[$doc])*
        pub struct $name {
            type_: Type,
            data: Vec<$elem>,
        }

        impl $name {
            /// Create an empty column from its descriptor.
            pub fn new(type_: Type) -> Self {
                Self { type_, data: Vec::new() }
            }

            /// Append one raw wire value.
            pub fn append(&mut self, value: $elem) {
                self.data.push(value);
            }

            /// Raw value at `index`, if in bounds.
            pub fn get(&self, index: usize) -> Option<$elem> {
                self.data.get(index).copied()
            }

            /// Raw value at `index`; panics out of bounds.
            pub fn at(&self, index: usize) -> $elem {
                self.data[index]
            }

            /// Number of rows.
            pub fn len(&self) -> usize {
                self.data.len()
            }

            /// Whether the column holds no rows.
            pub fn is_empty(&self) -> bool {
                self.data.is_empty()
            }

            /// Borrow the raw values.
            pub fn data(&self) -> &[$elem] {
                &self.data
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
                buffer_utils::ensure(buffer, rows * $width, "column data")?;
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
                Arc::new($name::new(self.type_.clone()))
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
                let mut result = $name::new(self.type_.clone());
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

date_column!(
    /// `Date` column: u16 days since 1970-01-01.
    ColumnDate,
    u16,
    2,
    get_u16_le,
    put_u16_le
);

date_column!(
    /// `Date32` column: i32 days since 1970-01-01, negative before the
    /// epoch.
    ColumnDate32,
    i32,
    4,
    get_i32_le,
    put_i32_le
);

date_column!(
    /// `DateTime` column: u32 seconds since the Unix epoch.
    ColumnDateTime,
    u32,
    4,
    get_u32_le,
    put_u32_le
);

date_column!(
    /// `DateTime64` column: i64 ticks of `10^-precision` seconds.
    ColumnDateTime64,
    i64,
    8,
    get_i64_le,
    put_i64_le
);

impl ColumnDate {
    /// Calendar date at `index`.
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        let days = self.get(index)?;
        epoch().checked_add_days(Days::new(days as u64))
    }

    /// Append a calendar date.
    pub fn append_date(&mut self, date: NaiveDate) {
        let days = date.signed_duration_since(epoch()).num_days();
        self.append(days.clamp(0, u16::MAX as i64) as u16);
    }
}

impl ColumnDate32 {
    /// Calendar date at `index`.
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        let days = self.get(index)?;
        if days >= 0 {
            epoch().checked_add_days(Days::new(days as u64))
        } else {
            epoch().checked_sub_days(Days::new(days.unsigned_abs() as u64))
        }
    }

    /// Append a calendar date.
    pub fn append_date(&mut self, date: NaiveDate) {
        let days = date.signed_duration_since(epoch()).num_days();
        self.append(days as i32);
    }
}

impl ColumnDateTime {
    /// UTC timestamp at `index`.
    pub fn datetime_at(&self, index: usize) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.get(index)? as i64, 0)
    }

    /// Append a UTC timestamp, truncated to whole seconds.
    pub fn append_datetime(&mut self, value: DateTime<Utc>) {
        self.append(value.timestamp().clamp(0, u32::MAX as i64) as u32);
    }

    /// The column timezone from the descriptor, if any.
    pub fn timezone(&self) -> Option<&str> {
        match self.column_type() {
            Type::DateTime { timezone } => timezone.as_deref(),
            _ => None,
        }
    }
}

impl ColumnDateTime64 {
    /// Sub-second digits from the descriptor.
    pub fn precision(&self) -> usize {
        match self.column_type() {
            Type::DateTime64 { precision, .. } => *precision,
            _ => 0,
        }
    }

    /// The column timezone from the descriptor, if any.
    pub fn timezone(&self) -> Option<&str> {
        match self.column_type() {
            Type::DateTime64 { timezone, .. } => timezone.as_deref(),
            _ => None,
        }
    }

    /// UTC timestamp at `index`. `None` for precision above nanoseconds
    /// or out-of-range ticks.
    pub fn datetime_at(&self, index: usize) -> Option<DateTime<Utc>> {
        let ticks = self.get(index)?;
        let precision = self.precision();
        if precision > 9 {
            return None;
        }

        let per_second = 10i64.pow(precision as u32);
        let secs = ticks.div_euclid(per_second);
        let frac = ticks.rem_euclid(per_second);
        let nanos = frac * 10i64.pow(9 - precision as u32);
        DateTime::from_timestamp(secs, nanos as u32)
    }

    /// Append a UTC timestamp, truncated to the column precision.
    pub fn append_datetime(&mut self, value: DateTime<Utc>) {
        let precision = self.precision().min(9);
        let per_second = 10i64.pow(precision as u32);
        let ticks = value.timestamp() * per_second
            + value.timestamp_subsec_nanos() as i64
                / 10i64.pow(9 - precision as u32);
        self.append(ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_roundtrip() {
        let mut col = ColumnDate::new(Type::date());
        col.append(0);
        col.append(19723);

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut col2 = ColumnDate::new(Type::date());
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 2).unwrap();

        assert_eq!(col2.date_at(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(col2.date_at(1), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn date32_pre_epoch() {
        let mut col = ColumnDate32::new(Type::date32());
        col.append_date(NaiveDate::from_ymd_opt(1925, 1, 1).unwrap());
        col.append_date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());

        assert!(col.at(0) < 0);
        assert_eq!(col.at(1), 0);
        assert_eq!(col.date_at(0), NaiveDate::from_ymd_opt(1925, 1, 1));
    }

    #[test]
    fn datetime_roundtrip() {
        let mut col = ColumnDateTime::new(Type::datetime());
        col.append(1_700_000_000);

        let mut buf = BytesMut::new();
        col.save_to_buffer(&mut buf).unwrap();

        let mut col2 = ColumnDateTime::new(Type::datetime());
        let mut reader = &buf[..];
        col2.load_from_buffer(&mut reader, 1).unwrap();
        assert_eq!(col2.at(0), 1_700_000_000);
        assert_eq!(
            col2.datetime_at(0).unwrap().timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn datetime64_precision_math() {
        let mut col = ColumnDateTime64::new(Type::datetime64(3));
        col.append(1_700_000_000_123);

        let ts = col.datetime_at(0).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 123);

        let mut col2 = ColumnDateTime64::new(Type::datetime64(3));
        col2.append_datetime(ts);
        assert_eq!(col2.at(0), 1_700_000_000_123);
    }

    #[test]
    fn datetime64_negative_ticks() {
        // One millisecond before the epoch.
        let mut col = ColumnDateTime64::new(Type::datetime64(3));
        col.append(-1);

        let ts = col.datetime_at(0).unwrap();
        assert_eq!(ts.timestamp(), -1);
        assert_eq!(ts.timestamp_subsec_millis(), 999);
    }

    #[test]
    fn descriptor_metadata() {
        let col = ColumnDateTime64::new(Type::DateTime64 {
            precision: 6,
            timezone: Some("UTC".into()),
        });
        assert_eq!(col.precision(), 6);
        assert_eq!(col.timezone(), Some("UTC"));
    }
}
