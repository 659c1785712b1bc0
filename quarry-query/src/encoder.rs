//! Type-keyed value encoders.
//!
//! A [`ValueEncoderRegistry`] maps a Rust type to a function that turns a
//! value of that type into another [`Value`]. Encoders never produce SQL
//! text: whatever they return is rendered by the statement engine's
//! built-in escaping rules.
//!
//! ```rust
//! use quarry_query::{Statement, Value, ValueEncoderRegistry};
//!
//! struct Cents(i64);
//!
//! let mut registry = ValueEncoderRegistry::new();
//! registry.register(|c: &Cents| Value::String(format!("{}.{:02}", c.0 / 100, c.0 % 100)));
//!
//! let mut stmt = Statement::new("select :price");
//! stmt.bind_named("price", Value::custom(Cents(1999))).unwrap();
//! assert_eq!(stmt.render(&registry).unwrap(), "select '19.99'");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Converts a value of one concrete type into a [`Value`].
pub trait ValueEncoder: Send + Sync {
    /// Encode `value`, which is guaranteed to be of the registered type.
    fn encode(&self, value: &dyn Any) -> QueryResult<Value>;

    /// The Rust type this encoder handles.
    fn type_name(&self) -> &'static str;
}

struct FnEncoder<T, F> {
    encode: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ValueEncoder for FnEncoder<T, F>
where
    T: Any,
    F: Fn(&T) -> QueryResult<Value> + Send + Sync,
{
    fn encode(&self, value: &dyn Any) -> QueryResult<Value> {
        let typed = value.downcast_ref::<T>().ok_or_else(|| {
            QueryError::internal(format!(
                "encoder for {} received a value of another type",
                std::any::type_name::<T>()
            ))
        })?;
        (self.encode)(typed)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A mutable map from Rust types to encoders.
#[derive(Clone, Default)]
pub struct ValueEncoderRegistry {
    encoders: HashMap<TypeId, Arc<dyn ValueEncoder>>,
}

impl ValueEncoderRegistry {
    /// Create an empty registry; built-in values need no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an infallible encoder for `T`, replacing any previous one.
    pub fn register<T, F>(&mut self, encode: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.try_register::<T, _>(move |value| Ok(encode(value)))
    }

    /// Register a fallible encoder for `T`, replacing any previous one.
    pub fn try_register<T, F>(&mut self, encode: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> QueryResult<Value> + Send + Sync + 'static,
    {
        let encoder = FnEncoder {
            encode,
            _marker: PhantomData,
        };
        self.encoders.insert(TypeId::of::<T>(), Arc::new(encoder));
        self
    }

    /// Register a prepared encoder under an explicit type id.
    pub fn register_encoder(&mut self, type_id: TypeId, encoder: Arc<dyn ValueEncoder>) -> &mut Self {
        self.encoders.insert(type_id, encoder);
        self
    }

    /// Look up the encoder for `T`.
    pub fn get<T: Any>(&self) -> Option<Arc<dyn ValueEncoder>> {
        self.get_by_id(TypeId::of::<T>())
    }

    /// Look up an encoder by type id.
    pub fn get_by_id(&self, type_id: TypeId) -> Option<Arc<dyn ValueEncoder>> {
        self.encoders.get(&type_id).cloned()
    }

    /// Remove the encoder for `T`.
    pub fn remove<T: Any>(&mut self) -> bool {
        self.encoders.remove(&TypeId::of::<T>()).is_some()
    }

    /// Combine two registries; entries from `other` win on collision.
    pub fn merge(&self, other: &Self) -> Self {
        let mut encoders = self.encoders.clone();
        encoders.extend(other.encoders.iter().map(|(k, v)| (*k, Arc::clone(v))));
        Self { encoders }
    }

    /// Number of registered encoders.
    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    /// Whether no encoder is registered.
    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    /// Apply the registered encoder for the runtime type of `value`, if any.
    ///
    /// Built-in variants are keyed by their payload type (`String`, `i64`,
    /// `bool`, `f64`, `Vec<u8>`, `serde_json::Value`) so applications can
    /// override their encoding. Nulls and lists are never looked up.
    pub fn encode(&self, value: &Value) -> Option<QueryResult<Value>> {
        if self.encoders.is_empty() {
            return None;
        }
        let (type_id, payload): (TypeId, &dyn Any) = match value {
            Value::Null | Value::TypedNull(_) | Value::List(_) => return None,
            Value::Bool(v) => (TypeId::of::<bool>(), v as &dyn Any),
            Value::Int(v) => (TypeId::of::<i64>(), v as &dyn Any),
            Value::Float(v) => (TypeId::of::<f64>(), v as &dyn Any),
            Value::String(v) => (TypeId::of::<String>(), v as &dyn Any),
            Value::Bytes(v) => (TypeId::of::<Vec<u8>>(), v as &dyn Any),
            Value::Json(v) => (TypeId::of::<serde_json::Value>(), v as &dyn Any),
            Value::Custom(custom) => (custom.type_id(), custom.as_any() as &dyn Any),
        };
        let encoder = self.encoders.get(&type_id)?;
        Some(encoder.encode(payload))
    }
}

impl fmt::Debug for ValueEncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.encoders.values().map(|e| e.type_name()).collect();
        names.sort_unstable();
        f.debug_struct("ValueEncoderRegistry")
            .field("types", &names)
            .finish()
    }
}
