//! Values bound to statement placeholders.
//!
//! Built-in variants cover the primitive types every driver understands.
//! Anything else travels as a [`CustomValue`] and must be encoded through a
//! [`ValueEncoderRegistry`](crate::encoder::ValueEncoderRegistry) at render
//! time.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Column and parameter type kinds reported by drivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Char,
    Varchar,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Bytea,
    Uuid,
    Json,
    Jsonb,
    /// A type name the driver reported but this crate does not model.
    Unknown(String),
}

impl SqlType {
    /// Resolve a driver-reported type name, case-insensitively.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Bool,
            "int2" | "smallint" => Self::Int2,
            "int4" | "int" | "integer" => Self::Int4,
            "int8" | "bigint" => Self::Int8,
            "float4" | "real" => Self::Float4,
            "float8" | "double" | "double precision" => Self::Float8,
            "numeric" | "decimal" => Self::Numeric,
            "char" | "bpchar" | "character" => Self::Char,
            "varchar" | "character varying" => Self::Varchar,
            "text" => Self::Text,
            "timestamp" | "datetime" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "date" => Self::Date,
            "time" => Self::Time,
            "bytea" | "blob" => Self::Bytea,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// Canonical lowercase name.
    pub fn name(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Numeric => "numeric",
            Self::Char => "char",
            Self::Varchar => "varchar",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::TimestampTz => "timestamptz",
            Self::Date => "date",
            Self::Time => "time",
            Self::Bytea => "bytea",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Jsonb => "jsonb",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value of an application type that needs a registered encoder.
#[derive(Clone)]
pub struct CustomValue {
    type_id: TypeId,
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    /// Wrap an application value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// The runtime type of the wrapped value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name of the wrapped value, for error messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the wrapped value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub(crate) fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self.inner.as_ref()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A value bound to a placeholder.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Untyped NULL.
    #[default]
    Null,
    /// NULL with an intended target type.
    TypedNull(SqlType),
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// Binary value.
    Bytes(Vec<u8>),
    /// JSON document.
    Json(serde_json::Value),
    /// Homogeneous sequence, rendered as `(a, b, ...)`.
    List(Vec<Value>),
    /// Application type encoded through the registry.
    Custom(CustomValue),
}

impl Value {
    /// Wrap an application value for registry encoding.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Self::Custom(CustomValue::new(value))
    }

    /// Build a list from any iterator of convertible items.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Check if this is a null value, typed or not.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::TypedNull(_))
    }

    /// A short name for the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null | Self::TypedNull(_) => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::List(_) => "list",
            Self::Custom(custom) => custom.type_name(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! int_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::Int(i64::from(v))
                }
            }
        )*
    };
}

int_from!(i8, i16, i32, i64, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::String(v.hyphenated().to_string())
    }
}

impl From<chrono::NaiveDate> for Value {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::String(v.format("%Y-%m-%d").to_string())
    }
}

impl From<chrono::NaiveTime> for Value {
    fn from(v: chrono::NaiveTime) -> Self {
        Self::String(v.format("%H:%M:%S%.f").to_string())
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }
}

impl<Tz: chrono::TimeZone> From<chrono::DateTime<Tz>> for Value
where
    Tz::Offset: fmt::Display,
{
    fn from(v: chrono::DateTime<Tz>) -> Self {
        Self::String(v.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

macro_rules! list_from {
    ($($ty:ty),*) => {
        $(
            impl From<Vec<$ty>> for Value {
                fn from(v: Vec<$ty>) -> Self {
                    Self::list(v)
                }
            }
        )*
    };
}

list_from!(Value, bool, i16, i32, i64, u32, f64, String, &str, uuid::Uuid);
