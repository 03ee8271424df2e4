//! Error types for the store runtime.

use std::sync::Arc;

use mom_scope::ScopeError;
use thiserror::Error;

use crate::lifecycle::Phase;

/// Shared cause of a failed lifecycle hook.
///
/// The same cause is reported to the caller that triggered the hook and to
/// everyone awaiting the phase's completion signal.
pub type HookCause = Arc<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while building, using or disposing stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A factory was built without a body.
    #[error("[{namespace}] no factory function was provided")]
    MissingFactory { namespace: String },

    /// `make_model` was called twice in one factory invocation.
    #[error("[{namespace}] make_model() must only be called once")]
    ModelAlreadyCreated { namespace: String },

    /// `make_controller` was called twice in one factory invocation.
    #[error("[{namespace}] make_controller() must only be called once")]
    ControllerAlreadyCreated { namespace: String },

    /// The factory body returned without calling `make_model`.
    #[error("[{namespace}] invalid store factory: make_model() was never called")]
    ModelNotCreated { namespace: String },

    /// `make_model` was given a definition without members.
    #[error("[{namespace}] make_model() requires at least one member")]
    EmptyModel { namespace: String },

    /// A member name breaks the field/prop naming rules or is declared twice.
    #[error("[{namespace}] invalid member name '{name}': {reason}")]
    InvalidFieldName {
        namespace: String,
        name: String,
        reason: &'static str,
    },

    /// A context operation needs the model to exist first.
    #[error("[{store}] {operation}() requires make_model() to be called first")]
    ModelRequired {
        store: String,
        operation: &'static str,
    },

    /// An `init` or `dispose` hook failed.
    #[error("[{store}] {phase} hook failed: {source}")]
    Lifecycle {
        store: String,
        phase: Phase,
        #[source]
        source: HookCause,
    },

    /// A hook returned a future while no tokio runtime was running.
    #[error("[{store}] {phase} hook is asynchronous but no tokio runtime is running")]
    NoAsyncRuntime { store: String, phase: Phase },

    /// Read or write of a name the model does not declare.
    #[error("[{store}] unknown field '{name}'")]
    UnknownField { store: String, name: String },

    /// Write to a read-only field or computed value from outside the store.
    #[error("[{store}] '{name}' is read-only")]
    ReadOnlyField { store: String, name: String },

    /// Call of an action the model does not declare.
    #[error("[{store}] unknown action '{name}'")]
    UnknownAction { store: String, name: String },

    /// An action body returned an error.
    #[error("[{store}] action '{name}' failed: {source}")]
    Action {
        store: String,
        name: String,
        #[source]
        source: mom_scope::BoxError,
    },

    /// A value of the wrong kind, e.g. a string where an integer was expected.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The store has been disposed; its tree can no longer change.
    #[error("[{store}] store is disposed")]
    Disposed { store: String },

    /// The internal node behind a context has been released.
    #[error("[{store}] store is no longer attached")]
    Detached { store: String },

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn lifecycle(store: &str, phase: Phase, source: HookCause) -> Self {
        StoreError::Lifecycle {
            store: store.to_string(),
            phase,
            source,
        }
    }

    /// The lifecycle phase this error came from, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            StoreError::Lifecycle { phase, .. } | StoreError::NoAsyncRuntime { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }

    /// Whether this is a configuration error: a misuse of the factory API
    /// that aborts construction.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::MissingFactory { .. }
                | StoreError::ModelAlreadyCreated { .. }
                | StoreError::ControllerAlreadyCreated { .. }
                | StoreError::ModelNotCreated { .. }
                | StoreError::EmptyModel { .. }
                | StoreError::InvalidFieldName { .. }
                | StoreError::ModelRequired { .. }
        )
    }
}
