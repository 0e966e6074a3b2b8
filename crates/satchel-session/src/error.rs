//! Error types for session operations.

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key is absent, or the session has no identity yet.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// No entry exists under the given identity in the cache store.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Setup-time misconfiguration (no usable backend, bad schema).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A value does not fit the storage type of a first-class column.
    #[error("Column '{column}' expects {expected} values")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    /// Error from the relational store.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to encode or decode the JSON payload.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The two-phase-commit protocol could not complete.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Error from a cache store or other backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Whether this is a recoverable missing-key condition.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
