//! Error types for the sync engine.

use docsync_query::GrammarError;
use docsync_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a bulk synchronization or collection operation.
///
/// Per-item storage failures during a sync are not errors; they are
/// reported in the result's `failed` list.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The query string could not be compiled.
    #[error("invalid query: {0}")]
    Grammar(#[from] GrammarError),

    /// The request body is not an array of objects.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A store operation outside per-item work failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading the input stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A per-item task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Returns true if the caller sent something unusable, as opposed to
    /// a failure on the serving side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SyncError::Grammar(_) | SyncError::BadRequest(_))
    }
}
