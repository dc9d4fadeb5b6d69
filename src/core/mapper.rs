//! Row value coercion
//!
//! Mapping functions read columns through [`get`] / [`get_or`] or the named
//! converters below. A null marker or a missing column yields the default; a
//! value that cannot be represented in the target type is a
//! [`DatabaseError::Conversion`] naming the column.

use super::decimal::Decimal;
use super::error::{DatabaseError, Result};
use super::value::{DbValue, Row};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use uuid::Uuid;

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Types a non-null [`DbValue`] can be coerced into
pub trait FromDbValue: Sized {
    /// Target name used in conversion errors
    const TARGET: &'static str;

    /// Coerce a non-null value, `None` when the value has no representation
    fn from_db_value(value: &DbValue) -> Option<Self>;
}

/// Read `column` as `T`, returning `default` for a null marker or missing column
pub fn get_or<T, R>(row: &R, column: &str, default: T) -> Result<T>
where
    T: FromDbValue,
    R: Row + ?Sized,
{
    match row.value(column) {
        None | Some(DbValue::Null) => Ok(default),
        Some(value) => T::from_db_value(value)
            .ok_or_else(|| DatabaseError::conversion(column, T::TARGET, value.type_name())),
    }
}

/// Read `column` as `T`, returning `T::default()` for a null marker or missing column
///
/// Use `Option<T>` as the target to get `None` instead of a zero value.
pub fn get<T, R>(row: &R, column: &str) -> Result<T>
where
    T: FromDbValue + Default,
    R: Row + ?Sized,
{
    get_or(row, column, T::default())
}

pub fn get_string<R: Row + ?Sized>(row: &R, column: &str) -> Result<String> {
    get(row, column)
}

pub fn get_int<R: Row + ?Sized>(row: &R, column: &str) -> Result<i32> {
    get(row, column)
}

pub fn get_long<R: Row + ?Sized>(row: &R, column: &str) -> Result<i64> {
    get(row, column)
}

pub fn get_float<R: Row + ?Sized>(row: &R, column: &str) -> Result<f32> {
    get(row, column)
}

pub fn get_decimal<R: Row + ?Sized>(row: &R, column: &str) -> Result<Decimal> {
    get(row, column)
}

/// Null reads as the Unix epoch
pub fn get_date<R: Row + ?Sized>(row: &R, column: &str) -> Result<NaiveDateTime> {
    get(row, column)
}

pub fn get_date_nullable<R: Row + ?Sized>(row: &R, column: &str) -> Result<Option<NaiveDateTime>> {
    get(row, column)
}

/// Null reads as the nil UUID
pub fn get_guid<R: Row + ?Sized>(row: &R, column: &str) -> Result<Uuid> {
    get(row, column)
}

pub fn get_guid_nullable<R: Row + ?Sized>(row: &R, column: &str) -> Result<Option<Uuid>> {
    get(row, column)
}

/// Read a structured document; text must parse as JSON
///
/// Null reads as `serde_json::Value::Null`.
pub fn get_document<R: Row + ?Sized>(row: &R, column: &str) -> Result<serde_json::Value> {
    get(row, column)
}

fn integer_of(value: &DbValue) -> Option<i128> {
    match value {
        DbValue::Bool(v) => Some(*v as i128),
        DbValue::Byte(v) => Some(*v as i128),
        DbValue::SByte(v) => Some(*v as i128),
        DbValue::Int16(v) => Some(*v as i128),
        DbValue::UInt16(v) => Some(*v as i128),
        DbValue::Int32(v) => Some(*v as i128),
        DbValue::UInt32(v) => Some(*v as i128),
        DbValue::Int64(v) => Some(*v as i128),
        DbValue::UInt64(v) => Some(*v as i128),
        DbValue::Single(v) if v.is_finite() => Some(v.round() as i128),
        DbValue::Double(v) if v.is_finite() => Some(v.round() as i128),
        DbValue::Decimal(v) => Some(v.round_to_integer()),
        DbValue::String(s) => {
            let text = s.trim();
            text.parse::<i128>()
                .ok()
                .or_else(|| text.parse::<Decimal>().ok().map(|d| d.round_to_integer()))
        }
        _ => None,
    }
}

fn float_of(value: &DbValue) -> Option<f64> {
    match value {
        DbValue::Single(v) => Some(*v as f64),
        DbValue::Double(v) => Some(*v),
        DbValue::Decimal(v) => Some(v.to_f64()),
        DbValue::String(s) => s.trim().parse().ok(),
        other => integer_of(other).map(|v| v as f64),
    }
}

fn text_of(value: &DbValue) -> String {
    match value {
        DbValue::Null => String::new(),
        DbValue::Bool(v) => v.to_string(),
        DbValue::Byte(v) => v.to_string(),
        DbValue::SByte(v) => v.to_string(),
        DbValue::Int16(v) => v.to_string(),
        DbValue::UInt16(v) => v.to_string(),
        DbValue::Int32(v) => v.to_string(),
        DbValue::UInt32(v) => v.to_string(),
        DbValue::Int64(v) => v.to_string(),
        DbValue::UInt64(v) => v.to_string(),
        DbValue::Single(v) => v.to_string(),
        DbValue::Double(v) => v.to_string(),
        DbValue::Decimal(v) => v.to_string(),
        DbValue::DateTime(v) => v.to_string(),
        DbValue::DateTimeOffset(v) => v.to_rfc3339(),
        DbValue::TimeSpan(v) => v.to_string(),
        DbValue::Guid(v) => v.to_string(),
        DbValue::String(s) => s.clone(),
        DbValue::Binary(b) => hex::encode(b),
        DbValue::Json(v) => v.to_string(),
    }
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

macro_rules! impl_from_db_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromDbValue for $ty {
                const TARGET: &'static str = stringify!($ty);

                fn from_db_value(value: &DbValue) -> Option<Self> {
                    integer_of(value).and_then(|v| <$ty>::try_from(v).ok())
                }
            }
        )*
    };
}

impl_from_db_integer!(u8, i8, i16, u16, i32, u32, i64, u64);

impl FromDbValue for bool {
    const TARGET: &'static str = "bool";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Bool(v) => Some(*v),
            DbValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Some(true),
                "false" | "f" | "0" | "no" => Some(false),
                _ => None,
            },
            other => integer_of(other).map(|v| v != 0),
        }
    }
}

impl FromDbValue for f32 {
    const TARGET: &'static str = "f32";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Single(v) => Some(*v),
            other => float_of(other)
                .filter(|v| !v.is_finite() || v.abs() <= f32::MAX as f64)
                .map(|v| v as f32),
        }
    }
}

impl FromDbValue for f64 {
    const TARGET: &'static str = "f64";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        float_of(value)
    }
}

impl FromDbValue for Decimal {
    const TARGET: &'static str = "Decimal";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Decimal(v) => Some(*v),
            DbValue::Single(v) => Decimal::from_f64(*v as f64),
            DbValue::Double(v) => Decimal::from_f64(*v),
            DbValue::String(s) => s.parse().ok(),
            other => integer_of(other).and_then(|v| Decimal::new(v, 0)),
        }
    }
}

impl FromDbValue for String {
    const TARGET: &'static str = "String";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        Some(text_of(value))
    }
}

impl FromDbValue for NaiveDateTime {
    const TARGET: &'static str = "NaiveDateTime";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::DateTime(v) => Some(*v),
            DbValue::DateTimeOffset(v) => Some(v.naive_utc()),
            DbValue::String(s) => parse_date_time(s),
            _ => None,
        }
    }
}

impl FromDbValue for DateTime<FixedOffset> {
    const TARGET: &'static str = "DateTime<FixedOffset>";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::DateTimeOffset(v) => Some(*v),
            DbValue::DateTime(v) => Some(v.and_utc().fixed_offset()),
            DbValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .or_else(|| parse_date_time(s).map(|v| v.and_utc().fixed_offset())),
            _ => None,
        }
    }
}

impl FromDbValue for TimeDelta {
    const TARGET: &'static str = "TimeDelta";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::TimeSpan(v) => Some(*v),
            // drivers without an interval type store microseconds
            DbValue::Int64(v) => Some(TimeDelta::microseconds(*v)),
            _ => None,
        }
    }
}

impl FromDbValue for Uuid {
    const TARGET: &'static str = "Uuid";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Guid(v) => Some(*v),
            DbValue::String(s) => Uuid::parse_str(s.trim()).ok(),
            DbValue::Binary(b) => Uuid::from_slice(b).ok(),
            _ => None,
        }
    }
}

impl FromDbValue for Vec<u8> {
    const TARGET: &'static str = "Vec<u8>";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Binary(b) => Some(b.clone()),
            DbValue::String(s) => Some(s.as_bytes().to_vec()),
            DbValue::Guid(v) => Some(v.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl FromDbValue for serde_json::Value {
    const TARGET: &'static str = "document";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Json(v) => Some(v.clone()),
            DbValue::String(s) => serde_json::from_str(s).ok(),
            DbValue::Binary(b) => serde_json::from_slice(b).ok(),
            _ => None,
        }
    }
}

impl FromDbValue for DbValue {
    const TARGET: &'static str = "DbValue";

    fn from_db_value(value: &DbValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    const TARGET: &'static str = T::TARGET;

    fn from_db_value(value: &DbValue) -> Option<Self> {
        T::from_db_value(value).map(Some)
    }
}
