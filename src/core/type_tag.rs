//! Canonical parameter type tags
//!
//! [`TypeMapper`] resolves a Rust type to its [`TypeTag`] through a
//! registration table keyed by exact `TypeId`. Types missing from the table
//! resolve to [`TypeTag::Object`].

use super::decimal::Decimal;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashMap;
use uuid::Uuid;

/// Semantic data type of a parameter or column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Boolean,
    Byte,
    SByte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Guid,
    String,
    Binary,
    Object,
}

impl TypeTag {
    pub fn to_str(&self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::Byte => "byte",
            TypeTag::SByte => "sbyte",
            TypeTag::Int16 => "int16",
            TypeTag::UInt16 => "uint16",
            TypeTag::Int32 => "int32",
            TypeTag::UInt32 => "uint32",
            TypeTag::Int64 => "int64",
            TypeTag::UInt64 => "uint64",
            TypeTag::Single => "single",
            TypeTag::Double => "double",
            TypeTag::Decimal => "decimal",
            TypeTag::DateTime => "datetime",
            TypeTag::DateTimeOffset => "datetimeoffset",
            TypeTag::TimeSpan => "timespan",
            TypeTag::Guid => "guid",
            TypeTag::String => "string",
            TypeTag::Binary => "binary",
            TypeTag::Object => "object",
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

static REGISTRY: Lazy<HashMap<TypeId, TypeTag>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(TypeId::of::<bool>(), TypeTag::Boolean);
    table.insert(TypeId::of::<u8>(), TypeTag::Byte);
    table.insert(TypeId::of::<i8>(), TypeTag::SByte);
    table.insert(TypeId::of::<i16>(), TypeTag::Int16);
    table.insert(TypeId::of::<u16>(), TypeTag::UInt16);
    table.insert(TypeId::of::<i32>(), TypeTag::Int32);
    table.insert(TypeId::of::<u32>(), TypeTag::UInt32);
    table.insert(TypeId::of::<i64>(), TypeTag::Int64);
    table.insert(TypeId::of::<u64>(), TypeTag::UInt64);
    table.insert(TypeId::of::<f32>(), TypeTag::Single);
    table.insert(TypeId::of::<f64>(), TypeTag::Double);
    table.insert(TypeId::of::<Decimal>(), TypeTag::Decimal);
    table.insert(TypeId::of::<NaiveDateTime>(), TypeTag::DateTime);
    table.insert(TypeId::of::<DateTime<FixedOffset>>(), TypeTag::DateTimeOffset);
    table.insert(TypeId::of::<DateTime<Utc>>(), TypeTag::DateTimeOffset);
    table.insert(TypeId::of::<TimeDelta>(), TypeTag::TimeSpan);
    table.insert(TypeId::of::<Uuid>(), TypeTag::Guid);
    table.insert(TypeId::of::<String>(), TypeTag::String);
    table.insert(TypeId::of::<&'static str>(), TypeTag::String);
    // a single character binds as text
    table.insert(TypeId::of::<char>(), TypeTag::String);
    table.insert(TypeId::of::<Vec<u8>>(), TypeTag::Binary);
    table
});

/// Maps Rust types to [`TypeTag`]s
pub struct TypeMapper;

impl TypeMapper {
    /// Tag for the type `T`, matched by exact type identity
    pub fn tag_of<T: ?Sized + 'static>() -> TypeTag {
        Self::tag_for(TypeId::of::<T>())
    }

    /// Tag for a `TypeId`, [`TypeTag::Object`] when unregistered
    pub fn tag_for(type_id: TypeId) -> TypeTag {
        REGISTRY.get(&type_id).copied().unwrap_or(TypeTag::Object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_types() {
        assert_eq!(TypeMapper::tag_of::<i32>(), TypeTag::Int32);
        assert_eq!(TypeMapper::tag_of::<String>(), TypeTag::String);
        assert_eq!(TypeMapper::tag_of::<char>(), TypeTag::String);
        assert_eq!(TypeMapper::tag_of::<NaiveDateTime>(), TypeTag::DateTime);
        assert_eq!(TypeMapper::tag_of::<Decimal>(), TypeTag::Decimal);
        assert_eq!(TypeMapper::tag_of::<Vec<u8>>(), TypeTag::Binary);
        assert_eq!(TypeMapper::tag_of::<TimeDelta>(), TypeTag::TimeSpan);
        assert_eq!(TypeMapper::tag_of::<Uuid>(), TypeTag::Guid);
    }

    #[test]
    fn test_exact_identity_only() {
        // wrappers and unsized views are not registered
        assert_eq!(TypeMapper::tag_of::<Option<i32>>(), TypeTag::Object);
        assert_eq!(TypeMapper::tag_of::<[u8]>(), TypeTag::Object);
        assert_eq!(TypeMapper::tag_of::<std::path::PathBuf>(), TypeTag::Object);
        assert_eq!(TypeMapper::tag_of::<serde_json::Value>(), TypeTag::Object);
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeTag::DateTimeOffset.to_string(), "datetimeoffset");
        assert_eq!(TypeTag::Object.to_string(), "object");
    }
}
