//! Reactive state primitives.
//!
//! This crate is the reactive layer the store runtime is built on:
//!
//! - [`Atom`]: identity that can be observed and reports changes
//! - [`Observable`]: a value cell backed by an atom
//! - [`Computed`]: a memoized derivation, recomputed lazily when a dependency changes
//! - [`autorun`] / [`reaction`]: subscriptions re-run when tracked state changes
//! - [`batch`]: the transactional write boundary; notifications are delivered
//!   once, when the outermost batch returns
//!
//! Dependency tracking and batching are per thread. Store logic is expected to
//! run cooperatively on one thread (a current-thread tokio runtime, for
//! instance); data itself is `Send + Sync` so handles can cross task
//! boundaries.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use mom_reactive::{autorun, batch, Observable};
//!
//! let count = Observable::new("count", 1);
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let c = count.clone();
//! let s = seen.clone();
//! let disposer = autorun("log", move || s.lock().unwrap().push(c.get()));
//!
//! batch(|| {
//!     count.set(2);
//!     count.set(3);
//! });
//! assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
//!
//! disposer.dispose();
//! count.set(4);
//! assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
//! ```

mod atom;
mod computed;
mod observable;
mod reaction;
mod tracking;

pub use atom::{Atom, Observer};
pub use computed::Computed;
pub use observable::Observable;
pub use reaction::{autorun, reaction, Disposer};
pub use tracking::{batch, in_batch, untracked, MAX_REACTION_ITERATIONS};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Allocate a process-wide unique identifier for atoms and observers.
pub(crate) fn next_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
