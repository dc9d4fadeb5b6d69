//! Named, typed command parameters

use super::decimal::Decimal;
use super::type_tag::{TypeMapper, TypeTag};
use super::value::DbValue;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefixes that mark a bind parameter in command text
pub const PARAMETER_SIGILS: [char; 3] = ['@', ':', '$'];

/// Direction of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

/// A named, typed value bound into a command
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    type_tag: TypeTag,
    value: DbValue,
    direction: ParameterDirection,
}

impl Parameter {
    /// Create an input parameter with an explicit tag
    ///
    /// A name without a binding sigil gets `@` prepended.
    pub fn new(name: impl Into<String>, type_tag: TypeTag, value: impl Into<DbValue>) -> Self {
        let mut name = name.into();
        if !name.starts_with(PARAMETER_SIGILS) {
            name.insert(0, '@');
        }
        Self {
            name,
            type_tag,
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Set the parameter direction
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Name including its sigil
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its sigil
    pub fn bare_name(&self) -> &str {
        &self.name[1..]
    }

    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn value(&self) -> &DbValue {
        &self.value
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }
}

/// Values that know their declared [`TypeTag`] and can become a [`DbValue`]
///
/// The tag comes from the declared type, so `None::<i32>` still binds as
/// `Int32` with a null marker.
pub trait ParameterValue: Sized {
    /// Tag of the declared type, independent of whether the value is null
    fn declared() -> TypeTag;

    /// Tag of this value; the declared tag unless the value knows better
    fn declared_tag(&self) -> TypeTag {
        Self::declared()
    }

    fn into_db_value(self) -> DbValue;
}

macro_rules! impl_parameter_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ParameterValue for $ty {
                fn declared() -> TypeTag {
                    TypeMapper::tag_of::<$ty>()
                }

                fn into_db_value(self) -> DbValue {
                    DbValue::from(self)
                }
            }
        )*
    };
}

impl_parameter_value!(
    bool,
    u8,
    i8,
    i16,
    u16,
    i32,
    u32,
    i64,
    u64,
    f32,
    f64,
    Decimal,
    NaiveDateTime,
    DateTime<FixedOffset>,
    DateTime<Utc>,
    TimeDelta,
    Uuid,
    String,
    char,
    Vec<u8>,
    serde_json::Value,
);

impl<'a> ParameterValue for &'a str {
    fn declared() -> TypeTag {
        TypeTag::String
    }

    fn into_db_value(self) -> DbValue {
        DbValue::from(self)
    }
}

impl<T: ParameterValue> ParameterValue for Option<T> {
    fn declared() -> TypeTag {
        T::declared()
    }

    fn declared_tag(&self) -> TypeTag {
        match self {
            Some(value) => value.declared_tag(),
            None => T::declared(),
        }
    }

    fn into_db_value(self) -> DbValue {
        match self {
            Some(value) => value.into_db_value(),
            None => DbValue::Null,
        }
    }
}

/// Untyped values are tagged by their runtime variant
impl ParameterValue for DbValue {
    fn declared() -> TypeTag {
        TypeTag::Object
    }

    fn declared_tag(&self) -> TypeTag {
        self.type_tag()
    }

    fn into_db_value(self) -> DbValue {
        self
    }
}

/// Build a parameter from a value and a name; never fails
pub fn to_param<V: ParameterValue>(value: V, name: impl Into<String>) -> Parameter {
    let type_tag = value.declared_tag();
    Parameter::new(name, type_tag, value.into_db_value())
}

/// Method form of [`to_param`]
///
/// ```
/// use rust_data_access::prelude::*;
///
/// let param = 123i32.to_param("@id");
/// assert_eq!(param.type_tag(), TypeTag::Int32);
///
/// let param = Option::<String>::None.to_param("@name");
/// assert_eq!(param.type_tag(), TypeTag::String);
/// assert!(param.value().is_null());
/// ```
pub trait ToParam: ParameterValue + Sized {
    fn to_param(self, name: impl Into<String>) -> Parameter {
        to_param(self, name)
    }
}

impl<V: ParameterValue> ToParam for V {}
