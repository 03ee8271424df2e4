//! Reactive records shared by models and controllers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mom_reactive::{batch, Computed, Observable};
use mom_scope::BoxError;

use crate::error::{Result, StoreError};
use crate::value::Value;

/// A computed getter, called with a handle to the record it belongs to.
pub type Getter<H> = Arc<dyn Fn(&H) -> Value + Send + Sync>;

/// An action, called with a handle to its record and the call arguments.
pub type Action<H> = Arc<dyn Fn(&H, &[Value]) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Produces a live handle while the record is alive.
pub(crate) type HandleFn<H> = Arc<dyn Fn() -> Option<H> + Send + Sync>;

pub(crate) enum Member<H> {
    Field { value: Value, writable: bool },
    Computed(Getter<H>),
    Action(Action<H>),
}

/// Declared members in declaration order.
pub(crate) struct Members<H> {
    entries: Vec<(String, Member<H>)>,
}

impl<H> Default for Members<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H> Members<H> {
    pub(crate) fn push(&mut self, name: String, member: Member<H>) {
        self.entries.push((name, member));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject empty and duplicate names, then apply `rule` to each member.
    pub(crate) fn validate(
        &self,
        namespace: &str,
        rule: impl Fn(&str, &Member<H>) -> Option<&'static str>,
    ) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (name, member) in &self.entries {
            let reason = if name.is_empty() {
                Some("names must not be empty")
            } else if !seen.insert(name.as_str()) {
                Some("declared more than once")
            } else {
                rule(name, member)
            };
            if let Some(reason) = reason {
                return Err(StoreError::InvalidFieldName {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

/// Who is writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// The store's own factory closure.
    Internal,
    /// Code holding the public store.
    External,
}

struct Field {
    cell: Observable<Value>,
    writable: bool,
}

/// The live record: observable fields, memoized computed values and
/// actions.
pub(crate) struct ObjectCore<H> {
    store: String,
    fields: BTreeMap<String, Field>,
    computed: BTreeMap<String, Computed<Value>>,
    actions: BTreeMap<String, Action<H>>,
}

impl<H: 'static> ObjectCore<H> {
    pub(crate) fn build(store: &str, members: Members<H>, handle: HandleFn<H>) -> Self {
        let mut fields = BTreeMap::new();
        let mut computed = BTreeMap::new();
        let mut actions = BTreeMap::new();
        for (name, member) in members.entries {
            let label = format!("{}.{}", store, name);
            match member {
                Member::Field { value, writable } => {
                    let cell = Observable::new(label, value);
                    fields.insert(name, Field { cell, writable });
                }
                Member::Computed(getter) => {
                    let handle = handle.clone();
                    let cell = Computed::new(label, move || match handle() {
                        Some(h) => getter(&h),
                        None => Value::Null,
                    });
                    computed.insert(name, cell);
                }
                Member::Action(action) => {
                    actions.insert(name, action);
                }
            }
        }
        Self {
            store: store.to_string(),
            fields,
            computed,
            actions,
        }
    }

    /// Tracked read of a field, prop or computed value.
    pub(crate) fn get(&self, name: &str) -> Result<Value> {
        if let Some(field) = self.fields.get(name) {
            return Ok(field.cell.get());
        }
        if let Some(cell) = self.computed.get(name) {
            return Ok(cell.get());
        }
        Err(self.unknown(name))
    }

    pub(crate) fn set(&self, name: &str, value: Value, access: Access) -> Result<bool> {
        let field = self.writable(name, access)?;
        Ok(field.cell.set(value))
    }

    /// Mutate a field in place; observers are always notified.
    pub(crate) fn update<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Value) -> R,
        access: Access,
    ) -> Result<R> {
        let field = self.writable(name, access)?;
        Ok(field.cell.update(f))
    }

    /// Run an action inside a batch.
    pub(crate) fn call(&self, handle: &H, name: &str, args: &[Value]) -> Result<Value> {
        let action = self
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                store: self.store.clone(),
                name: name.to_string(),
            })?;
        batch(|| action(handle, args)).map_err(|source| StoreError::Action {
            store: self.store.clone(),
            name: name.to_string(),
            source,
        })
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
            || self.computed.contains_key(name)
            || self.actions.contains_key(name)
    }

    /// Current fields, props and computed values as a map.
    pub(crate) fn snapshot(&self) -> Value {
        let mut map = BTreeMap::new();
        for (name, field) in &self.fields {
            map.insert(name.clone(), field.cell.get());
        }
        for (name, cell) in &self.computed {
            map.insert(name.clone(), cell.get());
        }
        Value::Map(map)
    }

    fn writable(&self, name: &str, access: Access) -> Result<&Field> {
        match self.fields.get(name) {
            Some(field) if access == Access::Internal || field.writable => Ok(field),
            Some(_) => Err(self.read_only(name)),
            None if self.computed.contains_key(name) => Err(self.read_only(name)),
            None => Err(self.unknown(name)),
        }
    }

    fn read_only(&self, name: &str) -> StoreError {
        StoreError::ReadOnlyField {
            store: self.store.clone(),
            name: name.to_string(),
        }
    }

    fn unknown(&self, name: &str) -> StoreError {
        StoreError::UnknownField {
            store: self.store.clone(),
            name: name.to_string(),
        }
    }
}
