//! Store lifecycle runtime.
//!
//! A [`StoreFactory`] turns a plain factory body into a long-lived,
//! tree-structured, reactive store:
//!
//! - the body builds a [`Model`] (public state) and optionally a
//!   [`Controller`] (private state plus `init`/`dispose` hooks) through its
//!   [`StoreContext`]
//! - [`create`] builds a root store; [`StoreContext::mount`] builds a child
//!   attached to its parent's tree
//! - every store moves through `INITIALIZING -> READY -> DISPOSING ->
//!   DISPOSED`, with one-shot [`Completion`] signals for INIT and DISPOSE
//! - disposing a store disposes its reactions and its children first
//!
//! # Example
//!
//! ```rust
//! use mom_core::{create, store_factory, ModelDef, Value};
//!
//! let counter = store_factory(|ctx, _params| {
//!     ctx.make_model(
//!         ModelDef::new()
//!             .field("value", 1)
//!             .action("increment", |m, args| {
//!                 let by = args.first().and_then(Value::as_i64).unwrap_or(1);
//!                 let value = m.get("value")?.to_i64()?;
//!                 m.set("value", value + by)?;
//!                 Ok(Value::Null)
//!             }),
//!     )?;
//!     Ok(())
//! });
//!
//! let store = create(&counter).unwrap();
//! assert!(store.is_ready());
//! store.call("increment", &[Value::from(4)]).unwrap();
//! assert_eq!(store.get("value").unwrap(), Value::from(5));
//! assert!(store.dispose().unwrap());
//! assert!(!store.dispose().unwrap());
//! ```

mod context;
mod controller;
mod error;
mod factory;
mod lifecycle;
mod model;
mod node;
mod object;
mod params;
mod runtime;
mod store;
mod value;

pub use context::{ReactionOptions, StoreContext};
pub use controller::{Controller, ControllerDef};
pub use error::{HookCause, Result, StoreError};
pub use factory::{named_store_factory, store_factory, StoreFactory, StoreFactoryBuilder};
pub use lifecycle::{Completion, HookOutcome, LifecycleState, Outcome, Phase};
pub use model::{Model, ModelDef};
pub use object::{Action, Getter};
pub use params::{Params, StoreParams};
pub use runtime::{create, dispose, Runtime, RuntimeConfig};
pub use store::{Store, StoreId, WeakStore};
pub use value::Value;

pub use mom_reactive::{batch, untracked, Disposer};
pub use mom_scope::{BoxError, InterfaceId, Scope, ScopeError};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T: ?Sized>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T: ?Sized>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
