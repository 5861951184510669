//! 32-byte entity identifiers.

use crate::{CodecError, CodecResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of an entity identifier in bytes.
pub const HASH_LENGTH: usize = 32;

/// A 32-byte identifier for blocks and transactions.
///
/// Identifiers are derived by double-SHA256 over an entity's public wire
/// form and are stable across re-encodings.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// The all-zero hash. Marks a coinbase input's source and the parent of
    /// a genesis block.
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    /// Wrap raw bytes.
    pub const fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Wrap a byte slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != HASH_LENGTH {
            return Err(CodecError::Length(format!(
                "hash must be {} bytes, got {}",
                HASH_LENGTH,
                bytes.len()
            )));
        }
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Double-SHA256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(&second);
        Self(arr)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// True for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LENGTH]> for Hash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}
