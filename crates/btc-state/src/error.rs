//! Error types for the chain engine.

use thiserror::Error;

/// Chain engine errors.
#[derive(Error, Debug)]
pub enum StateError {
    /// Failure of the underlying keyed store.
    #[error("storage fault: {0}")]
    Storage(#[from] btc_storage::StorageError),

    /// A record failed to decode or encode.
    #[error("codec failure: {0}")]
    Codec(#[from] btc_model::CodecError),

    /// A referenced entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Referential integrity violated while applying a block.
    #[error("inconsistent store: {0}")]
    Inconsistent(String),

    /// A long-running query was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// A previous failure closed the engine to writes; reads are still
    /// served. Reopen the engine to write again.
    #[error("engine refuses writes after a previous failure")]
    WritesRefused,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for chain engine operations.
pub type StateResult<T> = Result<T, StateError>;
