//! Observable identity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::{lock, next_id, tracking};

/// Something that depends on atoms and must hear when they change.
pub trait Observer: Send + Sync {
    /// Called when one of the observed atoms reported a change.
    fn on_stale(&self);
}

struct AtomInner {
    id: u64,
    name: String,
    observers: Mutex<BTreeMap<u64, Weak<dyn Observer>>>,
}

/// The unit of observation.
///
/// An atom carries no value. Whoever owns the data calls
/// [`report_observed`](Atom::report_observed) when it is read and
/// [`report_changed`](Atom::report_changed) when it is written.
#[derive(Clone)]
pub struct Atom {
    inner: Arc<AtomInner>,
}

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AtomInner {
                id: next_id(),
                name: name.into(),
                observers: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register a read with the derivation currently being tracked.
    pub fn report_observed(&self) {
        tracking::report_observed(self);
    }

    /// Notify every live observer.
    ///
    /// Observers are all marked stale before any reaction runs.
    pub fn report_changed(&self) {
        let observers: Vec<Arc<dyn Observer>> = {
            let mut observers = lock(&self.inner.observers);
            observers.retain(|_, o| o.strong_count() > 0);
            observers.values().filter_map(Weak::upgrade).collect()
        };
        if observers.is_empty() {
            return;
        }
        tracking::batch(|| {
            for observer in observers {
                observer.on_stale();
            }
        });
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers)
            .values()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    pub(crate) fn subscribe(&self, observer_id: u64, observer: Weak<dyn Observer>) {
        lock(&self.inner.observers).insert(observer_id, observer);
    }

    pub(crate) fn unsubscribe(&self, observer_id: u64) {
        lock(&self.inner.observers).remove(&observer_id);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

/// Swap an observer's dependency set, keeping subscriptions in sync.
pub(crate) fn resubscribe(
    observer_id: u64,
    observer: &Weak<dyn Observer>,
    previous: Vec<Atom>,
    next: &[Atom],
) {
    for atom in &previous {
        if !next.iter().any(|a| a.id() == atom.id()) {
            atom.unsubscribe(observer_id);
        }
    }
    for atom in next {
        atom.subscribe(observer_id, observer.clone());
    }
}
