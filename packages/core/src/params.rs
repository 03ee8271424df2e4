//! Construction parameters.

use std::collections::BTreeMap;

use mom_scope::Scope;

use crate::error::Result;
use crate::factory::StoreFactory;
use crate::store::Store;
use crate::value::Value;

/// Leaf parameters handed to a factory body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing any earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// The raw value, including an explicit null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The value under `key`, or `Null`.
    pub fn value(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or_default()
    }

    /// `default` when the key is missing or null; an error for other types.
    pub fn i64_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.present(key) {
            Some(v) => v.to_i64(),
            None => Ok(default),
        }
    }

    /// `key` as a bool, or `default` when absent or null.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.present(key) {
            Some(v) => v.to_bool(),
            None => Ok(default),
        }
    }

    /// `key` as a string, or `default` when absent or null.
    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.present(key) {
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| v.mismatch("string")),
            None => Ok(default.to_string()),
        }
    }

    /// The store under `key`, if any.
    pub fn store(&self, key: &str) -> Result<Option<Store>> {
        self.present(key).map(Value::to_store).transpose()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn present(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }
}

/// Everything needed to build a store: the factory, an optional scope and
/// the leaf parameters.
///
/// The scope is only honoured for roots; mounted children always use their
/// parent's scope.
#[derive(Clone)]
pub struct StoreParams {
    pub(crate) factory: StoreFactory,
    pub(crate) scope: Option<Scope>,
    pub(crate) params: Params,
}

impl StoreParams {
    pub fn new(factory: &StoreFactory) -> Self {
        Self {
            factory: factory.clone(),
            scope: None,
            params: Params::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Build a root in `scope` instead of the runtime's default scope.
    /// Ignored by `mount`.
    pub fn in_scope(mut self, scope: &Scope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    /// Replace all leaf parameters at once.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn factory(&self) -> &StoreFactory {
        &self.factory
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl From<&StoreFactory> for StoreParams {
    fn from(factory: &StoreFactory) -> Self {
        StoreParams::new(factory)
    }
}

impl From<StoreFactory> for StoreParams {
    fn from(factory: StoreFactory) -> Self {
        StoreParams::new(&factory)
    }
}
