//! The Value type - dynamically typed model data.
//!
//! Model fields, props, computed results, action arguments and factory
//! parameters are all `Value`s. Besides the usual tree-shaped data, a value
//! can hold a [`Store`], which is how a model refers to its mounted children.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// A dynamically typed model value.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering of map entries and snapshots
/// - `Store` compares by store id, never by content
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A reference to another store, typically a mounted child.
    Store(Store),
}

impl Value {
    /// Create an empty map.
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    /// True for `Value::Null`, which also stands for an absent argument.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Store(_) => "store",
        }
    }

    /// The boolean, if this is a `Bool`. No truthiness conversion.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is an `Integer`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The child store, if this is a `Store`.
    pub fn as_store(&self) -> Option<&Store> {
        match self {
            Value::Store(store) => Some(store),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    /// Typed accessors that fail with [`StoreError::TypeMismatch`].
    pub fn to_i64(&self) -> Result<i64> {
        self.as_i64().ok_or_else(|| self.mismatch("integer"))
    }

    /// Like `as_f64`, failing with `TypeMismatch`.
    pub fn to_f64(&self) -> Result<f64> {
        self.as_f64().ok_or_else(|| self.mismatch("number"))
    }

    /// Like `as_bool`, failing with `TypeMismatch`.
    pub fn to_bool(&self) -> Result<bool> {
        self.as_bool().ok_or_else(|| self.mismatch("bool"))
    }

    /// Like `as_store`, failing with `TypeMismatch`.
    pub fn to_store(&self) -> Result<Store> {
        self.as_store().cloned().ok_or_else(|| self.mismatch("store"))
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> StoreError {
        StoreError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Step one path component down: a map key, an array index or a member
    /// of a child store.
    pub(crate) fn child(&self, component: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(component).cloned(),
            Value::Array(items) => {
                let index: usize = component.parse().ok()?;
                items.get(index).cloned()
            }
            Value::Store(store) => store.get(component).ok(),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
            Value::Store(store) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$store", store.id().as_str())?;
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Store> for Value {
    fn from(v: Store) -> Self {
        Value::Store(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
