//! Typed interface identifiers.

use std::fmt;
use std::marker::PhantomData;

/// Identifies a registration in a [`Scope`](crate::Scope) and fixes the type
/// stored under it.
///
/// `T` may be unsized, so trait objects can be registered:
/// `InterfaceId<dyn TimeService>`.
pub struct InterfaceId<T: ?Sized> {
    ns: &'static str,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> InterfaceId<T> {
    pub const fn new(ns: &'static str) -> Self {
        Self {
            ns,
            _marker: PhantomData,
        }
    }

    /// The namespace string, e.g. `"mom.services.TimeService"`.
    pub const fn ns(&self) -> &'static str {
        self.ns
    }
}

impl<T: ?Sized> Clone for InterfaceId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for InterfaceId<T> {}

impl<T: ?Sized> PartialEq for InterfaceId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ns == other.ns
    }
}

impl<T: ?Sized> Eq for InterfaceId<T> {}

impl<T: ?Sized> fmt::Debug for InterfaceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InterfaceId({})", self.ns)
    }
}

impl<T: ?Sized> fmt::Display for InterfaceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ns)
    }
}
