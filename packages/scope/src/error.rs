//! Error types for scope lookups.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised while resolving an interface.
#[derive(Debug, Clone, Error)]
pub enum ScopeError {
    /// Nothing is registered under the id in the scope or its ancestors.
    #[error("interface not found: {id} (from scope {path})")]
    InterfaceNotFound { id: String, path: String },

    /// The registration holds a value of another type.
    #[error("interface {id} is registered with a different type")]
    TypeMismatch { id: String },

    /// The registration can only be resolved asynchronously.
    #[error("interface {id} is provided by an async factory; use resolve()")]
    AsyncOnly { id: String },

    /// The registered factory failed.
    #[error("factory for {id} failed: {source}")]
    Factory {
        id: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}
