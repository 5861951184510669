//! # btc-storage
//!
//! Ordered keyed store for the block-chain engine.
//!
//! A single byte-ordered keyspace acts as a typed multi-index: the first
//! byte of every key is a [`KeyTag`] discriminant, so each entity kind
//! occupies one contiguous range and can be scanned forward or backward.
//! Writes can be grouped into an atomic batch; while a batch is open, point
//! reads go through a write-through cache so a logical operation observes
//! its own uncommitted writes.

mod database;
mod error;
mod keys;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use keys::KeyTag;

/// Storage trait abstracting the underlying database.
///
/// Allows testing engine logic against mock implementations.
pub trait KeyedStore: Send + Sync {
    /// Point read. Consults the open batch's write-through cache first.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Point write. Buffered while a batch is open.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// True if the store holds no key at all.
    fn is_empty(&self) -> StorageResult<bool>;

    /// Iterate all entries of one discriminant in ascending key order.
    fn scan(&self, tag: KeyTag) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    /// Iterate entries of one discriminant whose key body starts with
    /// `prefix`, in ascending key order.
    fn scan_prefixed(
        &self,
        tag: KeyTag,
        prefix: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    /// Iterate all entries of one discriminant in descending key order,
    /// seeded at the first key after the discriminant's range.
    fn scan_backward(
        &self,
        tag: KeyTag,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    /// Open a batch. Fails if one is already open; batches are not
    /// reentrant.
    fn begin_batch(&self) -> StorageResult<()>;

    /// Atomically flush the open batch. A no-op when none is open.
    fn commit_batch(&self) -> StorageResult<()>;

    /// Discard the open batch. A no-op when none is open.
    fn cancel_batch(&self) -> StorageResult<()>;
}
