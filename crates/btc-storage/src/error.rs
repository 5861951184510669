//! Error types for the keyed store.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failure of the underlying store.
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// A batch was opened while another is still in progress.
    #[error("a write batch is already open")]
    BatchAlreadyOpen,

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
