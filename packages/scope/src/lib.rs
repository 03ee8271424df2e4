//! Dependency-injection scopes.
//!
//! A [`Scope`] is a named node in a tree of registries. Values are registered
//! under an [`InterfaceId`] and looked up by the same id:
//!
//! - lookups that miss locally continue in the parent scope
//! - registrations only affect the scope they were made in
//! - [`Scope::root`] is the process-wide default scope
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mom_scope::{InterfaceId, Scope};
//!
//! const GREETING: InterfaceId<String> = InterfaceId::new("demo.Greeting");
//!
//! let root = Scope::new_root("app");
//! root.register_object(&GREETING, Arc::new("hello".to_string()));
//!
//! let child = root.create_child_scope("child");
//! assert_eq!(*child.get(&GREETING).unwrap(), "hello");
//! assert_eq!(child.path(), "/app/child");
//! ```

mod error;
mod interface;
mod scope;

pub use error::ScopeError;
pub use interface::InterfaceId;
pub use scope::Scope;

use std::future::Future;
use std::pin::Pin;

/// Boxed error used by user-supplied factories and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
