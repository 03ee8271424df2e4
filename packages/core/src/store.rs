//! The public store view.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use mom_scope::Scope;

use crate::error::{Result, StoreError};
use crate::lifecycle::{Completion, LifecycleState};
use crate::model::{Model, ModelCore};
use crate::object::Access;
use crate::value::Value;

static NEXT_STORE: AtomicU64 = AtomicU64::new(1);

/// Process-unique store identifier, rendered as `<namespace>#<n>`.
///
/// Ids order by creation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId {
    seq: u64,
    label: Arc<str>,
}

impl StoreId {
    pub(crate) fn next(namespace: &str) -> Self {
        let seq = NEXT_STORE.fetch_add(1, Ordering::Relaxed);
        Self {
            seq,
            label: Arc::from(format!("{}#{}", namespace, seq)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }

    /// The counter part of the id.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.label)
    }
}

/// A store as seen from outside: its model members plus read-only metadata.
///
/// Outside code can read every field and computed value, write props (the
/// `$`-prefixed fields) and call actions. It cannot reach the store's
/// internal context or its children's. Clones refer to the same store;
/// equality is identity.
#[derive(Clone)]
pub struct Store {
    core: Arc<ModelCore>,
}

impl Store {
    pub(crate) fn from_core(core: Arc<ModelCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> &StoreId {
        &self.core.meta.id
    }

    /// The factory's namespace; empty for anonymous factories.
    pub fn namespace(&self) -> &str {
        &self.core.meta.namespace
    }

    /// The DI scope this store was created in: its parent's scope, or the
    /// one passed at root creation.
    pub fn scope(&self) -> Scope {
        self.core.meta.scope.clone()
    }

    /// Tracked read of the lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.core.meta.state.get()
    }

    /// Tracked read of the `ready` flag: `true` exactly while the state is
    /// [`LifecycleState::Ready`].
    pub fn is_ready(&self) -> bool {
        self.core.meta.ready.get()
    }

    /// Untracked check for the terminal state.
    pub fn is_disposed(&self) -> bool {
        self.state() == LifecycleState::Disposed
    }

    /// Settles when the INIT phase finishes.
    ///
    /// A failing asynchronous `init` hook is reported only here: await it.
    pub fn init_complete(&self) -> Completion {
        self.core.meta.init_complete.clone()
    }

    /// Settles when this store's own DISPOSE phase finishes. Children with
    /// asynchronous dispose hooks may still be settling.
    pub fn dispose_complete(&self) -> Completion {
        self.core.meta.dispose_complete.clone()
    }

    /// Tracked read of a field, prop or computed value.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.core.object.get(name)
    }

    /// Write a prop. Fields and computed values are read-only here.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<bool> {
        self.core.object.set(name, value.into(), Access::External)
    }

    /// Call an action.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let model = Model {
            core: self.core.clone(),
        };
        self.core.object.call(&model, name, args)
    }

    /// Whether the model declares a member with this name.
    pub fn has(&self, name: &str) -> bool {
        self.core.object.contains(name)
    }

    /// Read a `/`-separated path through fields, maps, arrays and child
    /// stores, e.g. `"next/next/value"` or `"counters/0/$value"`.
    pub fn read(&self, path: &str) -> Result<Value> {
        let mut components = path.split('/').filter(|c| !c.is_empty());
        let first = components.next().ok_or_else(|| self.unknown(path))?;
        let mut current = self.get(first)?;
        for component in components {
            current = current.child(component).ok_or_else(|| self.unknown(path))?;
        }
        Ok(current)
    }

    /// Current values of all fields, props and computed values.
    pub fn snapshot(&self) -> Value {
        self.core.object.snapshot()
    }

    /// Whether this store was created as a root.
    pub fn is_root(&self) -> bool {
        self.core.meta.roots.is_some()
    }

    /// Dispose this store if it is a live root.
    ///
    /// Returns `Ok(false)` for children, for roots already disposed, and for
    /// roots whose runtime is gone.
    pub fn dispose(&self) -> Result<bool> {
        match self.core.meta.roots.as_ref().and_then(Weak::upgrade) {
            Some(roots) => roots.dispose(self.id()),
            None => Ok(false),
        }
    }

    /// A handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            core: Arc::downgrade(&self.core),
        }
    }

    fn unknown(&self, path: &str) -> StoreError {
        StoreError::UnknownField {
            store: self.id().to_string(),
            name: path.to_string(),
        }
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Store {}

impl Hash for Store {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id().as_str())
            .field("state", &self.core.meta.state.peek())
            .finish()
    }
}

/// Non-owning reference to a [`Store`], for back-references such as a child
/// pointing at its parent.
#[derive(Clone, Default)]
pub struct WeakStore {
    core: Weak<ModelCore>,
}

impl WeakStore {
    /// The store, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<Store> {
        self.core.upgrade().map(Store::from_core)
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(store) => write!(f, "WeakStore({})", store.id()),
            None => f.write_str("WeakStore(<dropped>)"),
        }
    }
}
