//! Error types for the Reverie core library.

use thiserror::Error;

use crate::types::UserId;

/// Top-level error type for all progression operations.
#[derive(Error, Debug)]
pub enum ReverieError {
    /// Malformed caller input (unknown choice type, oversized delta, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Reference to an unknown session or fragment.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The external store failed or timed out.
    #[error("Persistence error during {operation}: {reason}")]
    Persistence {
        /// Store operation that failed.
        operation: String,
        /// Underlying cause.
        reason: String,
    },

    /// A loaded affinity state violated one of its invariants.
    #[error("Inconsistent state for user {user}: {field} = {value} ({expected})")]
    StateInconsistency {
        /// Owner of the corrupted record.
        user: UserId,
        /// Which field was repaired.
        field: &'static str,
        /// The offending value as loaded.
        value: i32,
        /// The invariant the value broke.
        expected: &'static str,
    },

    /// The fragment catalog is malformed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReverieError {
    /// Shorthand for a [`ReverieError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`ReverieError::Persistence`].
    pub fn persistence(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Persistence {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may retry the failed operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

impl From<rusqlite::Error> for ReverieError {
    fn from(err: rusqlite::Error) -> Self {
        Self::persistence("sqlite", err)
    }
}

impl From<serde_json::Error> for ReverieError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ReverieError>;
