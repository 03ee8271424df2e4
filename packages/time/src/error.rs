//! Error types for time services.

use thiserror::Error;

/// Errors raised while setting up a time service.
#[derive(Debug, Error)]
pub enum TimeError {
    /// Timers need a tokio runtime to spawn onto.
    #[error("no tokio runtime available to drive timers")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// A start instant could not be parsed.
    #[error("invalid start instant '{input}': expected RFC 3339 or YYYY-MM-DD")]
    InvalidStart {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}
