//! Error types for the codec layer.

use thiserror::Error;

/// Codec-specific errors.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Input ended before the expected field.
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEnd(usize),

    /// A length field disagrees with the data it frames.
    #[error("length mismatch: {0}")]
    Length(String),

    /// A field carries a value outside its domain.
    #[error("invalid value: {0}")]
    Invalid(String),

    /// Bytes remained after the entity was fully decoded.
    #[error("{0} trailing bytes after decode")]
    Trailing(usize),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
