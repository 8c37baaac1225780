//! Error types for the document store.
//!
//! One error enum is shared across the workspace. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for docstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the document store
#[derive(Debug, Error)]
pub enum Error {
    /// A mutation targeted a key (or row id) that does not exist
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Schema validation rejected a document
    ///
    /// Carries the validation engine's own error detail and, when the
    /// failing record is known, its key as a diagnostic label.
    #[error("schema validation failed [{engine}]: {detail}")]
    ValidationFailed {
        /// Validation engine name (`jsonschema` or `rules`)
        engine: String,
        /// Engine-native error detail
        detail: String,
        /// Key of the record that failed, when known
        key: Option<String>,
    },

    /// A condition used an operator/value combination with no dialect mapping
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Path-style access attempted on a non-container value
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Both generated-key attempts for `add` collided with existing keys
    #[error("key collision: generated keys already exist")]
    KeyCollision,

    /// An explicit-key insert targeted a key that is already taken
    #[error("key already exists: {0}")]
    KeyExists(String),

    /// Store construction with an unknown backend name
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Malformed condition expression
    #[error("condition parse error: {0}")]
    Parse(String),

    /// Write conflict detected by the backing engine
    ///
    /// Conflict-prone operations replay under a bounded retry budget
    /// before this surfaces to the caller.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Backend/driver error
    #[error("backend error: {0}")]
    Backend(String),

    /// A registered schema document is itself unusable
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a `ValidationFailed` error from engine output
    pub fn validation(
        engine: impl Into<String>,
        detail: impl Into<String>,
        key: Option<&str>,
    ) -> Self {
        Error::ValidationFailed {
            engine: engine.into(),
            detail: detail.into(),
            key: key.map(str::to_string),
        }
    }

    /// True if the error is a retryable write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
