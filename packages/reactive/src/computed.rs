//! Memoized derivations.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::atom::{resubscribe, Atom, Observer};
use crate::{lock, next_id, tracking};

type Getter<T> = Box<dyn FnMut() -> T + Send>;

struct ComputedInner<T> {
    id: u64,
    atom: Atom,
    getter: Mutex<Getter<T>>,
    cache: Mutex<Option<T>>,
    deps: Mutex<Vec<Atom>>,
    me: Weak<ComputedInner<T>>,
}

impl<T: Clone + Send + 'static> Observer for ComputedInner<T> {
    fn on_stale(&self) {
        let was_cached = lock(&self.cache).take().is_some();
        if was_cached {
            self.atom.report_changed();
        }
    }
}

/// A derived value, computed on first read and cached until one of the
/// values it read changes.
///
/// A computed value is itself observable: derivations reading it are
/// invalidated when any of its dependencies change. The getter must not read
/// the computed value it belongs to.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Computed<T> {
    pub fn new(name: impl Into<String>, getter: impl FnMut() -> T + Send + 'static) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new_cyclic(|me| ComputedInner {
                id: next_id(),
                atom: Atom::new(name),
                getter: Mutex::new(Box::new(getter)),
                cache: Mutex::new(None),
                deps: Mutex::new(Vec::new()),
                me: me.clone(),
            }),
        }
    }

    /// Read the value, recomputing it if stale.
    pub fn get(&self) -> T {
        self.inner.atom.report_observed();
        if let Some(value) = lock(&self.inner.cache).clone() {
            return value;
        }
        let (value, deps) = {
            let mut guard = lock(&self.inner.getter);
            let getter: &mut (dyn FnMut() -> T + Send) = &mut **guard;
            tracking::track(getter)
        };
        let observer: Weak<dyn Observer> = self.inner.me.clone();
        let previous = std::mem::replace(&mut *lock(&self.inner.deps), deps.clone());
        resubscribe(self.inner.id, &observer, previous, &deps);
        *lock(&self.inner.cache) = Some(value.clone());
        value
    }

    /// Whether a cached value is available.
    pub fn is_cached(&self) -> bool {
        lock(&self.inner.cache).is_some()
    }

    pub fn name(&self) -> &str {
        self.inner.atom.name()
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for atom in lock(&self.deps).drain(..) {
            atom.unsubscribe(self.id);
        }
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("name", &self.inner.atom.name())
            .finish()
    }
}
