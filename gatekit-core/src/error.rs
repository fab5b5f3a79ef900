use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::storage::StorageError;

/// Error outputs from `GateKit` operations.
///
/// None of these are retried inside the engine. Access document mutations
/// are idempotent, so callers may re-issue a failed provision or revoke in
/// full.
#[derive(Debug, Error)]
pub enum GateKitError {
    /// Malformed input; rejected before any mutation.
    #[error("validation_error: {0}")]
    Validation(String),
    /// The operation referenced a subscriber or credential with no record.
    #[error("not_found: {0}")]
    NotFound(String),
    /// The access document has zero or several managed inbounds, or is not
    /// a document the engine can administer.
    #[error("config_error: {0}")]
    Config(String),
    /// Reading or replacing a file failed. The previous document stays
    /// readable because writes go through a temp file and a rename.
    #[error("io_error: {0}")]
    Io(StorageError),
    /// Two records share one client credential.
    #[error("conflict_error: {0}")]
    Conflict(String),
    /// The subscription database or the access lock failed.
    #[error("storage_error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for GateKitError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Io { .. } => Self::Io(error),
            other => Self::Storage(other),
        }
    }
}

/// Discriminant of [`GateKitError`], stable for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`GateKitError::Validation`].
    ValidationError,
    /// See [`GateKitError::NotFound`].
    NotFound,
    /// See [`GateKitError::Config`].
    ConfigError,
    /// See [`GateKitError::Io`].
    IoError,
    /// See [`GateKitError::Conflict`].
    ConflictError,
    /// See [`GateKitError::Storage`].
    StorageError,
}

/// Structured `{kind, message}` form of an error, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    /// Error discriminant.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl GateKitError {
    /// Returns the error discriminant.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Io(_) => ErrorKind::IoError,
            Self::Conflict(_) => ErrorKind::ConflictError,
            Self::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Returns the structured report for this error.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Result type for `GateKit` operations.
pub type GateKitResult<T> = Result<T, GateKitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_storage_errors_map_to_io_kind() {
        let error: GateKitError = StorageError::Io {
            context: "failed to replace access document".to_string(),
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::IoError);
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn test_db_errors_map_to_storage_kind() {
        let error: GateKitError = StorageError::SubscriptionDb("locked".to_string()).into();
        assert_eq!(error.kind(), ErrorKind::StorageError);
    }

    #[test]
    fn test_report_serializes_kind_in_snake_case() {
        let report = GateKitError::NotFound("external id 99".to_string()).report();
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["kind"], "not_found");
        assert_eq!(json["message"], "not_found: external id 99");
    }
}
