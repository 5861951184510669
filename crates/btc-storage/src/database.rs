//! RocksDB-backed keyed store.

use crate::{KeyTag, KeyedStore, StorageError, StorageResult};
use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, Cache, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
    WriteBatch,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

type Db = DBWithThreadMode<MultiThreaded>;

/// An open batch: buffered writes plus a write-through cache so point reads
/// inside the batch observe its uncommitted writes. The cache is keyed by
/// the hex form of the key.
struct OpenBatch {
    writes: WriteBatch,
    cache: HashMap<String, Vec<u8>>,
}

/// RocksDB database wrapper.
///
/// A single ordered keyspace; the first key byte is the [`KeyTag`]
/// discriminant. At most one batch may be open at a time; while it is open
/// all writes are buffered and committed atomically. Scans read the
/// committed state and never observe an open batch.
pub struct Database {
    db: Db,
    batch: Mutex<Option<OpenBatch>>,
}

impl Database {
    /// Open or create a database at `path` with a block cache of
    /// `cache_size_mib` MiB.
    pub fn open<P: AsRef<Path>>(path: P, cache_size_mib: u64) -> StorageResult<Self> {
        let path = path.as_ref();
        info!(?path, cache_size_mib, "opening database");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(1);

        let block_cache = Cache::new_lru_cache((cache_size_mib * 1024 * 1024) as usize);
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(&block_cache);
        opts.set_block_based_table_factory(&block_opts);

        let db = Db::open(&opts, path)?;
        debug!("database opened");

        Ok(Self {
            db,
            batch: Mutex::new(None),
        })
    }
}

impl KeyedStore for Database {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        if let Some(open) = self.batch.lock().as_ref() {
            if let Some(data) = open.cache.get(&hex::encode(key)) {
                return Ok(Some(data.clone()));
            }
        }
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut slot = self.batch.lock();
        match slot.as_mut() {
            Some(open) => {
                open.writes.put(key, value);
                open.cache.insert(hex::encode(key), value.to_vec());
                Ok(())
            }
            None => Ok(self.db.put(key, value)?),
        }
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.db.iterator(IteratorMode::Start).next().is_none())
    }

    fn scan(&self, tag: KeyTag) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let seed = tag.min_key();
        let iter = self
            .db
            .iterator(IteratorMode::From(&seed, Direction::Forward))
            .filter_map(|entry| entry.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .take_while(move |(k, _)| tag.matches(k));
        Ok(Box::new(iter))
    }

    fn scan_prefixed(
        &self,
        tag: KeyTag,
        prefix: &[u8],
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let seed = tag.key(prefix);
        let prefix = prefix.to_vec();
        let iter = self
            .db
            .iterator(IteratorMode::From(&seed, Direction::Forward))
            .filter_map(|entry| entry.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .take_while(move |(k, _)| tag.matches(k) && KeyTag::body(k).starts_with(&prefix));
        Ok(Box::new(iter))
    }

    fn scan_backward(
        &self,
        tag: KeyTag,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let seed = tag.after_last_key();
        let iter = self
            .db
            .iterator(IteratorMode::From(&seed, Direction::Reverse))
            .filter_map(|entry| entry.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .take_while(move |(k, _)| tag.matches(k));
        Ok(Box::new(iter))
    }

    fn begin_batch(&self) -> StorageResult<()> {
        let mut slot = self.batch.lock();
        if slot.is_some() {
            return Err(StorageError::BatchAlreadyOpen);
        }
        *slot = Some(OpenBatch {
            writes: WriteBatch::default(),
            cache: HashMap::new(),
        });
        Ok(())
    }

    fn commit_batch(&self) -> StorageResult<()> {
        let mut slot = self.batch.lock();
        if let Some(open) = slot.take() {
            debug!(writes = open.writes.len(), "committing batch");
            self.db.write(open.writes)?;
        }
        Ok(())
    }

    fn cancel_batch(&self) -> StorageResult<()> {
        let mut slot = self.batch.lock();
        if let Some(open) = slot.take() {
            debug!(discarded = open.writes.len(), "cancelling batch");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_db() -> (Database, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Database::open(tmp.path(), 8).unwrap();
        (db, tmp)
    }

    #[test]
    fn put_get() {
        let (db, _tmp) = open_db();
        let key = KeyTag::Tx.key(b"k1");
        assert!(db.get(&key).unwrap().is_none());
        db.put(&key, b"v1").unwrap();
        assert_eq!(db.get(&key).unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn empty_detection() {
        let (db, _tmp) = open_db();
        assert!(db.is_empty().unwrap());
        db.put(&KeyTag::Peer.key(b"p"), b"x").unwrap();
        assert!(!db.is_empty().unwrap());
    }

    #[test]
    fn scan_stays_within_discriminant() {
        let (db, _tmp) = open_db();
        db.put(&KeyTag::Tx.key(b"a"), b"1").unwrap();
        db.put(&KeyTag::Block.key(b"b"), b"2").unwrap();
        db.put(&KeyTag::Block.key(b"c"), b"3").unwrap();
        db.put(&KeyTag::Head.key(b"d"), b"4").unwrap();

        let entries: Vec<_> = db.scan(KeyTag::Block).unwrap().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, b"2");
        assert_eq!(entries[1].1, b"3");
    }

    #[test]
    fn prefixed_scan() {
        let (db, _tmp) = open_db();
        db.put(&KeyTag::Atx.key(b"addr1-tx1"), &[0]).unwrap();
        db.put(&KeyTag::Atx.key(b"addr1-tx2"), &[0]).unwrap();
        db.put(&KeyTag::Atx.key(b"addr2-tx1"), &[0]).unwrap();

        let entries: Vec<_> = db.scan_prefixed(KeyTag::Atx, b"addr1").unwrap().collect();
        assert_eq!(entries.len(), 2);
        for (k, _) in entries {
            assert!(KeyTag::body(&k).starts_with(b"addr1"));
        }
    }

    #[test]
    fn backward_scan_starts_at_range_end() {
        let (db, _tmp) = open_db();
        db.put(&KeyTag::Block.key(b"a"), b"1").unwrap();
        db.put(&KeyTag::Block.key(b"z"), b"2").unwrap();
        db.put(&KeyTag::Head.key(b"h"), b"3").unwrap();

        let entries: Vec<_> = db.scan_backward(KeyTag::Block).unwrap().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, b"2");
        assert_eq!(entries[1].1, b"1");
    }

    #[test]
    fn batch_reads_its_own_writes() {
        let (db, _tmp) = open_db();
        let key = KeyTag::Tx.key(b"t");
        db.begin_batch().unwrap();
        db.put(&key, b"inside").unwrap();
        assert_eq!(db.get(&key).unwrap(), Some(b"inside".to_vec()));
        db.commit_batch().unwrap();
        assert_eq!(db.get(&key).unwrap(), Some(b"inside".to_vec()));
    }

    #[test]
    fn cancelled_batch_leaves_no_trace() {
        let (db, _tmp) = open_db();
        let key = KeyTag::Tx.key(b"t");
        db.begin_batch().unwrap();
        db.put(&key, b"inside").unwrap();
        db.cancel_batch().unwrap();
        assert!(db.get(&key).unwrap().is_none());
    }

    #[test]
    fn batches_are_not_reentrant() {
        let (db, _tmp) = open_db();
        db.begin_batch().unwrap();
        assert!(matches!(
            db.begin_batch(),
            Err(StorageError::BatchAlreadyOpen)
        ));
        db.cancel_batch().unwrap();
        db.begin_batch().unwrap();
        db.commit_batch().unwrap();
    }

    #[test]
    fn commit_without_batch_is_a_no_op() {
        let (db, _tmp) = open_db();
        db.commit_batch().unwrap();
        db.cancel_batch().unwrap();
    }
}
