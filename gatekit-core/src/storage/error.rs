//! Error types for the durable store and the access document files.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage primitives.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Errors coming from the subscription database.
    #[error("subscription db error: {0}")]
    SubscriptionDb(String),

    /// A stored row could not be mapped onto a typed record.
    #[error("corrupted subscription row: {0}")]
    CorruptedRecord(String),

    /// Errors coming from the access lock.
    #[error("access lock error: {0}")]
    Lock(String),

    /// Filesystem failures while reading or replacing a file.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
