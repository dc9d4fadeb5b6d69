//! Database value types
//!
//! [`DbValue`] is the tagged union every parameter and column value passes
//! through. `DbValue::Null` is the only null marker; a missing column is
//! reported separately by [`Row::value`] returning `None`.

use super::decimal::Decimal;
use super::type_tag::TypeTag;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Database value that can hold different types
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DbValue {
    /// Null marker
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    /// Timestamp without zone
    DateTime(NaiveDateTime),
    /// Timestamp with a fixed UTC offset
    DateTimeOffset(DateTime<FixedOffset>),
    TimeSpan(TimeDelta),
    Guid(Uuid),
    String(String),
    Binary(Vec<u8>),
    /// Structured document
    Json(serde_json::Value),
}

impl DbValue {
    /// Check if the value is the null marker
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Tag of the runtime value; the null marker carries no type and maps to Object
    pub fn type_tag(&self) -> TypeTag {
        match self {
            DbValue::Null => TypeTag::Object,
            DbValue::Bool(_) => TypeTag::Boolean,
            DbValue::Byte(_) => TypeTag::Byte,
            DbValue::SByte(_) => TypeTag::SByte,
            DbValue::Int16(_) => TypeTag::Int16,
            DbValue::UInt16(_) => TypeTag::UInt16,
            DbValue::Int32(_) => TypeTag::Int32,
            DbValue::UInt32(_) => TypeTag::UInt32,
            DbValue::Int64(_) => TypeTag::Int64,
            DbValue::UInt64(_) => TypeTag::UInt64,
            DbValue::Single(_) => TypeTag::Single,
            DbValue::Double(_) => TypeTag::Double,
            DbValue::Decimal(_) => TypeTag::Decimal,
            DbValue::DateTime(_) => TypeTag::DateTime,
            DbValue::DateTimeOffset(_) => TypeTag::DateTimeOffset,
            DbValue::TimeSpan(_) => TypeTag::TimeSpan,
            DbValue::Guid(_) => TypeTag::Guid,
            DbValue::String(_) => TypeTag::String,
            DbValue::Binary(_) => TypeTag::Binary,
            DbValue::Json(_) => TypeTag::Object,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "bool",
            DbValue::Byte(_) => "u8",
            DbValue::SByte(_) => "i8",
            DbValue::Int16(_) => "i16",
            DbValue::UInt16(_) => "u16",
            DbValue::Int32(_) => "i32",
            DbValue::UInt32(_) => "u32",
            DbValue::Int64(_) => "i64",
            DbValue::UInt64(_) => "u64",
            DbValue::Single(_) => "f32",
            DbValue::Double(_) => "f64",
            DbValue::Decimal(_) => "decimal",
            DbValue::DateTime(_) => "datetime",
            DbValue::DateTimeOffset(_) => "datetimeoffset",
            DbValue::TimeSpan(_) => "timespan",
            DbValue::Guid(_) => "guid",
            DbValue::String(_) => "string",
            DbValue::Binary(_) => "binary",
            DbValue::Json(_) => "json",
        }
    }

    /// Get the value as a string slice (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

macro_rules! impl_from_native {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for DbValue {
                fn from(v: $ty) -> Self {
                    DbValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Bool,
    u8 => Byte,
    i8 => SByte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => TimeSpan,
    Uuid => Guid,
    String => String,
    Vec<u8> => Binary,
    serde_json::Value => Json,
);

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        DbValue::DateTimeOffset(v.fixed_offset())
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::String(v.to_string())
    }
}

impl From<char> for DbValue {
    fn from(v: char) -> Self {
        DbValue::String(v.to_string())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DbValue::Null,
        }
    }
}

/// Read access to the current row of a result
///
/// Implementations are handed to row callbacks by reference and cannot be
/// kept past the callback; the cursor reuses them on the next advance.
pub trait Row: Send + Sync {
    /// Column names in result order
    fn columns(&self) -> &[String];

    /// Value of the named column, `None` when the row has no such column
    fn value(&self, column: &str) -> Option<&DbValue>;
}

/// A materialized row (column names shared across the rows of one result)
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl DbRow {
    /// Create a row; `values` must line up with `columns`
    pub fn new(columns: Arc<[String]>, values: Vec<DbValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs
    pub fn from_pairs<I, S, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<DbValue>,
    {
        let (columns, values): (Vec<String>, Vec<DbValue>) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .unzip();
        Self::new(columns.into(), values)
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    /// Value at a column position
    pub fn get_index(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }
}

impl Row for DbRow {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn value(&self, column: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
    }
}
