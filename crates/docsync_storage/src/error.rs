//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store rejected or failed an operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A document is not usable as stored data.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl StorageError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            StorageError::backend("disk full").to_string(),
            "storage backend error: disk full"
        );
        assert_eq!(
            StorageError::invalid_document("not an object").to_string(),
            "invalid document: not an object"
        );
    }

    #[test]
    fn from_io() {
        let err: StorageError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
