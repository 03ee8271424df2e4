//! Observable value cells.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::atom::Atom;
use crate::lock;

/// A value whose reads are tracked and whose writes notify observers.
///
/// Clones share the same cell.
pub struct Observable<T> {
    atom: Atom,
    value: Arc<Mutex<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            value: self.value.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            atom: Atom::new(name),
            value: Arc::new(Mutex::new(value)),
        }
    }

    /// Read the value, tracking it in the current derivation.
    pub fn get(&self) -> T {
        self.atom.report_observed();
        lock(&self.value).clone()
    }

    /// Read the value without tracking.
    pub fn peek(&self) -> T {
        lock(&self.value).clone()
    }

    /// Replace the value. Observers are notified only when it actually changed.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let mut current = lock(&self.value);
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.atom.report_changed();
        }
        changed
    }

    /// Compare-and-set: check the current value and replace it under one
    /// lock. `next` returns the new value, or `None` to leave the cell alone.
    /// Returns the previous value when a replacement happened.
    pub fn replace_if(&self, next: impl FnOnce(&T) -> Option<T>) -> Option<T> {
        let previous = {
            let mut current = lock(&self.value);
            let value = next(&current)?;
            if *current == value {
                return None;
            }
            std::mem::replace(&mut *current, value)
        };
        self.atom.report_changed();
        Some(previous)
    }

    /// Mutate the value in place and notify observers.
    ///
    /// `f` runs with the cell locked: it must not read this observable.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut current = lock(&self.value);
            f(&mut current)
        };
        self.atom.report_changed();
        result
    }

    pub fn atom(&self) -> &Atom {
        &self.atom
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("name", &self.atom.name())
            .field("value", &*lock(&self.value))
            .finish()
    }
}
