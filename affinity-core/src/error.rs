//! Error types for the affinity core library.

use thiserror::Error;

/// Top-level error type for all affinity operations.
#[derive(Error, Debug)]
pub enum AffinityError {
    /// No profile exists for the given user.
    #[error("User not found: {0}")]
    UserNotFound(crate::UserId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vector memory rejected an insert because a near-identical item exists.
    #[error("Near-duplicate memory for {user} (similarity {similarity:.3})")]
    DuplicateMemory {
        /// Owner of the rejected item.
        user: crate::UserId,
        /// Cosine similarity to the closest existing item.
        similarity: f32,
    },

    /// The embedding provider failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The text generator failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// The sentiment classifier failed.
    #[error("Classification error: {0}")]
    Classification(String),

    /// The outbound transport failed to deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AffinityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AffinityError>;
