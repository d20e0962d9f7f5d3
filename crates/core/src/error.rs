//! Error types for the MVCC core
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Kinds
//!
//! | Variant | Meaning | Retry? |
//! |---------|---------|--------|
//! | `Exhausted` | No free identifiers left in a scope | no |
//! | `ReservedField` | User plan touches `_eid` / `_vid` | no |
//! | `WriteConflict` | A newer committed version overlaps the write set | yes |
//! | `Deadlock` | Lock acquisition detected a cycle or timed out | yes |
//! | `Backend` | The query-processing collaborator failed | no |
//! | `Unsupported` | A data model lacks a rewrite template | no |

use std::io;
use thiserror::Error;

/// Result type alias for MVCC core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the MVCC core
#[derive(Debug, Error)]
pub enum Error {
    /// No identifiers available in the given scope
    #[error("Identifier space exhausted: {scope}")]
    Exhausted {
        /// Scope that ran out (global allocator or an entity)
        scope: String,
    },

    /// A plan references a reserved field directly
    #[error("Reserved field '{field}' cannot be written by user statements")]
    ReservedField {
        /// The offending field name
        field: String,
    },

    /// Validation found a newer committed version of a written record
    #[error("Write conflict: transaction started at {start_seq} observed commit {observed}")]
    WriteConflict {
        /// Start sequence of the rejected transaction
        start_seq: i64,
        /// Highest committed version found for the write set
        observed: i64,
    },

    /// Lock acquisition failed because of a deadlock
    #[error("Deadlock: {0}")]
    Deadlock(String),

    /// The query-processing collaborator failed to prepare or execute
    #[error("Backend failure: {message}")]
    Backend {
        /// What was being attempted
        message: String,
        /// Underlying collaborator error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The data model has no template for the requested rewrite
    #[error("Unsupported: {operation} is not implemented for the {model} data model")]
    Unsupported {
        /// Data model name
        model: String,
        /// Operation that lacks a template
        operation: String,
    },

    /// I/O error (allocator state file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted state could not be decoded
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Operation called in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller supplied an invalid argument or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an exhaustion error for a scope
    pub fn exhausted(scope: impl Into<String>) -> Self {
        Error::Exhausted {
            scope: scope.into(),
        }
    }

    /// Create a reserved-field violation
    pub fn reserved_field(field: impl Into<String>) -> Self {
        Error::ReservedField {
            field: field.into(),
        }
    }

    /// Create a backend failure without an underlying source
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend failure wrapping a collaborator error
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsupported-rewrite error
    pub fn unsupported(model: impl std::fmt::Display, operation: impl Into<String>) -> Self {
        Error::Unsupported {
            model: model.to_string(),
            operation: operation.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Whether the caller may retry with a fresh transaction
    ///
    /// Write conflicts and deadlocks are transient. Everything else is fatal
    /// for the attempt and must be propagated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WriteConflict { .. } | Error::Deadlock(_))
    }

    /// Whether the error is a user-visible rejection rather than an internal failure
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::ReservedField { .. } | Error::InvalidInput(_))
    }
}
