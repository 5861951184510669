//! Typed key construction.
//!
//! Every key carries a 1-byte discriminant as its first byte, so all
//! entities of one kind occupy a contiguous range of the ordered keyspace.
//! New entity kinds must claim a fresh discriminant.

/// Key discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyTag {
    /// Transaction records, keyed by transaction hash.
    Tx = 0,
    /// Block records, keyed by block hash.
    Block = 1,
    /// Head records, keyed by big-endian head id.
    Head = 2,
    /// Peer records, keyed by address bytes.
    Peer = 3,
    /// Address-to-transaction index entries, keyed by address ∥ tx hash.
    Atx = 4,
}

impl KeyTag {
    /// The discriminant byte.
    pub fn prefix(self) -> u8 {
        self as u8
    }

    /// Full key: discriminant byte followed by `body`.
    pub fn key(self, body: &[u8]) -> Vec<u8> {
        let mut k = Vec::with_capacity(body.len() + 1);
        k.push(self as u8);
        k.extend_from_slice(body);
        k
    }

    /// The smallest key of this discriminant's range.
    pub fn min_key(self) -> [u8; 1] {
        [self as u8]
    }

    /// The first key after this discriminant's range.
    pub fn after_last_key(self) -> [u8; 1] {
        [self as u8 + 1]
    }

    /// True if `key` belongs to this discriminant's range.
    pub fn matches(self, key: &[u8]) -> bool {
        key.first() == Some(&(self as u8))
    }

    /// The key body with the discriminant stripped.
    pub fn body(key: &[u8]) -> &[u8] {
        &key[1..]
    }
}
