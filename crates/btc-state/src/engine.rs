//! Block insertion and reorganization.
//!
//! Single-writer, multi-reader: every mutation serializes through the
//! writer lock and runs inside one store batch, so readers observe either
//! the state before a mutation or the state after its commit, never the
//! middle. A failure after the batch has opened cancels it and closes the
//! engine to further writes; reads stay available.

use crate::cache::ChainCache;
use crate::records::Records;
use crate::utxo::TxOutCache;
use crate::{EngineConfig, RelayPool, StateError, StateResult};
use btc_model::{Blk, Hash, Head, TxOut};
use btc_storage::{Database, KeyTag, KeyedStore};
use num_bigint::BigUint;
use parking_lot::{Mutex, RwLock};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of inserting a validated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The block extended the current best branch.
    ExtendedTrunk,
    /// The block landed on a side branch that remains behind.
    SideBranch { head_id: u64 },
    /// The block made a side branch win; the engine switched onto it.
    Reorganized { head_id: u64, rewound: u32 },
    /// The block hash is already stored.
    AlreadyKnown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertPlan {
    Genesis,
    Trunk,
    Side,
}

pub(crate) struct ChainState {
    pub(crate) cache: ChainCache,
    pub(crate) utxo: TxOutCache,
}

/// The persistent block-chain store.
///
/// Owns the keyed store, the in-memory chain index and the unspent-output
/// cache. Blocks arrive already validated; the engine stores, indexes,
/// reorganizes and answers queries against the current best branch.
pub struct ChainStore {
    pub(crate) store: Arc<dyn KeyedStore>,
    pub(crate) records: Records,
    pub(crate) state: RwLock<ChainState>,
    pub(crate) relay: RwLock<Option<Arc<dyn RelayPool>>>,
    rng: Mutex<StdRng>,
    wedged: AtomicBool,
}

impl ChainStore {
    /// Open the engine over a database at the configured path and rebuild
    /// the in-memory index from it.
    pub fn open(config: &EngineConfig) -> StateResult<Self> {
        let db = Database::open(&config.db_path, config.cache_size_mib)?;
        Self::with_store(Arc::new(db), config.utxo_window, StdRng::from_entropy())
    }

    /// Open the engine over an existing store with an injected random
    /// source for head-id draws.
    pub fn with_store(
        store: Arc<dyn KeyedStore>,
        utxo_window: u32,
        rng: StdRng,
    ) -> StateResult<Self> {
        let records = Records::new(Arc::clone(&store));

        let mut cache = ChainCache::new();
        Self::cache_heads(store.as_ref(), &mut cache)?;
        Self::cache_chain(store.as_ref(), &mut cache)?;

        let mut utxo = TxOutCache::new();
        Self::cache_unspent(store.as_ref(), &records, utxo_window, &mut utxo)?;

        info!(
            blocks = cache.block_count(),
            heads = cache.head_count(),
            unspent_cached = utxo.len(),
            "chain index rebuilt"
        );

        Ok(Self {
            store,
            records,
            state: RwLock::new(ChainState { cache, utxo }),
            relay: RwLock::new(None),
            rng: Mutex::new(rng),
            wedged: AtomicBool::new(false),
        })
    }

    /// Attach the relay pool consulted by transaction lookups.
    pub fn attach_relay_pool(&self, pool: Arc<dyn RelayPool>) {
        *self.relay.write() = Some(pool);
    }

    /// True if the store holds no record at all.
    pub fn is_empty(&self) -> StateResult<bool> {
        let _state = self.state.read();
        Ok(self.store.is_empty()?)
    }

    fn cache_heads(store: &dyn KeyedStore, cache: &mut ChainCache) -> StateResult<()> {
        for (_, data) in store.scan(KeyTag::Head)? {
            cache.insert_head(&Head::decode(&data)?);
        }
        Ok(())
    }

    fn cache_chain(store: &dyn KeyedStore, cache: &mut ChainCache) -> StateResult<()> {
        let mut blocks = Vec::new();
        for (_, data) in store.scan(KeyTag::Block)? {
            blocks.push(Blk::decode(&data)?);
        }
        blocks.sort_by_key(|b| b.height);
        for blk in &blocks {
            if !cache.install_block(blk) {
                return Err(StateError::Inconsistent(format!(
                    "block {} has no stored parent",
                    blk.hash
                )));
            }
        }
        Ok(())
    }

    fn cache_unspent(
        store: &dyn KeyedStore,
        records: &Records,
        window: u32,
        utxo: &mut TxOutCache,
    ) -> StateResult<()> {
        for (_, data) in store.scan_backward(KeyTag::Block)?.take(window as usize) {
            let blk = Blk::decode(&data)?;
            for tx_hash in &blk.tx_hashes {
                let tx = records.read_tx(tx_hash)?.ok_or_else(|| {
                    StateError::Inconsistent(format!(
                        "block {} lists missing transaction {}",
                        blk.hash, tx_hash
                    ))
                })?;
                for out in tx.outputs {
                    if out.available {
                        utxo.add(out);
                    }
                }
            }
        }
        Ok(())
    }

    fn ensure_writable(&self) -> StateResult<()> {
        if self.wedged.load(Ordering::SeqCst) {
            return Err(StateError::WritesRefused);
        }
        Ok(())
    }

    pub(crate) fn write_guard(&self) -> StateResult<parking_lot::RwLockWriteGuard<'_, ChainState>> {
        self.ensure_writable()?;
        Ok(self.state.write())
    }

    fn wedge(&self, context: &str) {
        self.wedged.store(true, Ordering::SeqCst);
        error!(context, "write failure, engine now refuses writes");
    }

    /// Insert a validated block.
    ///
    /// The block either extends the current best branch, extends or opens a
    /// side branch, or makes a side branch win and triggers a
    /// reorganization. All persistent effects commit atomically.
    #[instrument(skip(self, blk), fields(hash = %blk.hash))]
    pub fn insert_block(&self, mut blk: Blk) -> StateResult<InsertOutcome> {
        self.ensure_writable()?;
        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.cache.contains(&blk.hash) {
            debug!("block already stored");
            return Ok(InsertOutcome::AlreadyKnown);
        }

        let parent = match state.cache.locate(&blk.previous_hash) {
            Some(p) => Some(p.clone()),
            None if blk.is_genesis() => None,
            None => {
                return Err(StateError::NotFound(format!(
                    "parent block {}",
                    blk.previous_hash
                )))
            }
        };
        if parent.is_none() && !state.cache.is_empty() {
            return Err(StateError::Inconsistent(format!(
                "block {} has no parent and the chain is not empty",
                blk.hash
            )));
        }

        blk.height = parent.as_ref().map_or(0, |p| p.height + 1);
        for tx in &mut blk.transactions {
            tx.block_hash = blk.hash;
            for out in &mut tx.outputs {
                out.available = false;
            }
        }
        let work = work_from_compact(blk.difficulty_target);

        let (head, plan) = match &parent {
            None => {
                let id = self.draw_head_id(&state.cache)?;
                let head = Head {
                    id,
                    chain_work: work,
                    height: 0,
                    previous: None,
                };
                (head, InsertPlan::Genesis)
            }
            Some(p) => match state.cache.tip_of(&p.hash) {
                Some(id) => {
                    let cached = state.cache.head(id).ok_or_else(|| {
                        StateError::Inconsistent(format!("head {id} not cached"))
                    })?;
                    let head = Head {
                        id,
                        chain_work: &cached.chain_work + &work,
                        height: blk.height,
                        previous: cached.previous,
                    };
                    let plan = if state.cache.current_head_id() == Some(id) {
                        InsertPlan::Trunk
                    } else {
                        InsertPlan::Side
                    };
                    (head, plan)
                }
                None => {
                    let parent_blk = self.records.read_block(&p.hash)?.ok_or_else(|| {
                        StateError::Inconsistent(format!("block record {} missing", p.hash))
                    })?;
                    let base = self.cumulative_work_at(&state.cache, &parent_blk)?;
                    let id = self.draw_head_id(&state.cache)?;
                    let head = Head {
                        id,
                        chain_work: base + &work,
                        height: blk.height,
                        previous: Some(parent_blk.head_id),
                    };
                    debug!(head = id, fork_of = parent_blk.head_id, "opening side branch");
                    (head, InsertPlan::Side)
                }
            },
        };
        blk.head_id = head.id;

        self.store.begin_batch()?;
        let rewound = match self.apply_insert(state, &blk, &head, plan) {
            Ok(rewound) => rewound,
            Err(e) => {
                let _ = self.store.cancel_batch();
                self.wedge("block insertion failed");
                return Err(e);
            }
        };
        if let Err(e) = self.store.commit_batch() {
            self.wedge("batch commit failed");
            return Err(e.into());
        }

        state.cache.upsert_head(&head);
        state.cache.install_block(&blk);
        match (plan, rewound) {
            (InsertPlan::Genesis, _) => {
                state.cache.set_current(head.id);
                info!(height = blk.height, "stored genesis block");
                Ok(InsertOutcome::ExtendedTrunk)
            }
            (InsertPlan::Trunk, _) => {
                debug!(height = blk.height, "extended trunk");
                Ok(InsertOutcome::ExtendedTrunk)
            }
            (InsertPlan::Side, Some(rewound)) => {
                state.cache.set_current(head.id);
                Ok(InsertOutcome::Reorganized {
                    head_id: head.id,
                    rewound,
                })
            }
            (InsertPlan::Side, None) => Ok(InsertOutcome::SideBranch { head_id: head.id }),
        }
    }

    /// Persistent effects of one insertion, inside the open batch. Returns
    /// the number of rewound blocks when the insertion reorganized.
    fn apply_insert(
        &self,
        state: &mut ChainState,
        blk: &Blk,
        head: &Head,
        plan: InsertPlan,
    ) -> StateResult<Option<u32>> {
        self.records.write_head(head)?;
        self.records.write_block(blk)?;
        match plan {
            InsertPlan::Genesis | InsertPlan::Trunk => {
                self.forward_apply(&mut state.utxo, blk)?;
                Ok(None)
            }
            InsertPlan::Side => {
                let takeover = match state.cache.current_head() {
                    Some(current) => head.chain_work > current.chain_work,
                    None => {
                        return Err(StateError::Inconsistent(
                            "side branch without a current head".into(),
                        ))
                    }
                };
                if takeover {
                    Ok(Some(self.reorganize(state, blk)?))
                } else {
                    debug!(head = head.id, "side branch stays behind");
                    Ok(None)
                }
            }
        }
    }

    /// Switch the engine onto the branch ending in `blk`: rewind the
    /// current branch to the common ancestor, then replay the winning
    /// branch up to and including `blk`.
    fn reorganize(&self, state: &mut ChainState, blk: &Blk) -> StateResult<u32> {
        let old_tip = state
            .cache
            .trunk_hash()
            .ok_or_else(|| StateError::Inconsistent("current head has no tip".into()))?;
        let ancestor = state
            .cache
            .common_ancestor(&old_tip, &blk.previous_hash)
            .ok_or_else(|| {
                StateError::Inconsistent(format!(
                    "no common ancestor between {} and {}",
                    old_tip, blk.previous_hash
                ))
            })?;

        let unwind = state
            .cache
            .walk(&old_tip, &ancestor)
            .ok_or_else(|| StateError::Inconsistent("broken parent chain on trunk".into()))?;
        for hash in &unwind {
            let rolled = self.records.read_block_full(hash)?.ok_or_else(|| {
                StateError::Inconsistent(format!("block record {hash} missing"))
            })?;
            self.backward_apply(&mut state.utxo, &rolled)?;
        }

        let mut replay = state
            .cache
            .walk(&blk.previous_hash, &ancestor)
            .ok_or_else(|| StateError::Inconsistent("broken parent chain on side branch".into()))?;
        replay.reverse();
        for hash in &replay {
            let replayed = self.records.read_block_full(hash)?.ok_or_else(|| {
                StateError::Inconsistent(format!("block record {hash} missing"))
            })?;
            self.forward_apply(&mut state.utxo, &replayed)?;
        }
        self.forward_apply(&mut state.utxo, blk)?;

        warn!(
            rewound = unwind.len(),
            replayed = replay.len() + 1,
            ancestor = %ancestor,
            "chain reorganization"
        );
        Ok(unwind.len() as u32)
    }

    /// Apply a block's transactions in wire order: outputs become
    /// available, spent source outputs become unavailable.
    fn forward_apply(&self, utxo: &mut TxOutCache, blk: &Blk) -> StateResult<()> {
        for tx in &blk.transactions {
            let mut tx = tx.clone();
            for out in &mut tx.outputs {
                out.available = true;
                utxo.add(out.clone());
            }
            for input in &tx.inputs {
                if input.is_coinbase() {
                    continue;
                }
                let mut source = self.records.read_tx(&input.source_hash)?.ok_or_else(|| {
                    StateError::Inconsistent(format!(
                        "missing source transaction {}",
                        input.source_hash
                    ))
                })?;
                let out = source
                    .outputs
                    .get_mut(input.source_ix as usize)
                    .ok_or_else(|| {
                        StateError::Inconsistent(format!(
                            "missing output {} of {}",
                            input.source_ix, input.source_hash
                        ))
                    })?;
                out.available = false;
                self.records.write_tx(&source)?;
                utxo.remove(&input.source_hash, input.source_ix);
            }
            self.records.write_tx(&tx)?;
        }
        Ok(())
    }

    /// The inverse of [`Self::forward_apply`], in reverse transaction
    /// order: outputs become unavailable, spent source outputs are
    /// restored.
    fn backward_apply(&self, utxo: &mut TxOutCache, blk: &Blk) -> StateResult<()> {
        for tx in blk.transactions.iter().rev() {
            let mut tx = tx.clone();
            for out in &mut tx.outputs {
                out.available = false;
                utxo.remove(&tx.hash, out.ix);
            }
            for input in &tx.inputs {
                if input.is_coinbase() {
                    continue;
                }
                let mut source = self.records.read_tx(&input.source_hash)?.ok_or_else(|| {
                    StateError::Inconsistent(format!(
                        "missing source transaction {}",
                        input.source_hash
                    ))
                })?;
                let out = source
                    .outputs
                    .get_mut(input.source_ix as usize)
                    .ok_or_else(|| {
                        StateError::Inconsistent(format!(
                            "missing output {} of {}",
                            input.source_ix, input.source_hash
                        ))
                    })?;
                out.available = true;
                self.records.write_tx(&source)?;
                utxo.add(out.clone());
            }
            self.records.write_tx(&tx)?;
        }
        Ok(())
    }

    /// Cumulative work of the chain ending at `parent`, derived from its
    /// assigned head by subtracting the work of the blocks above it.
    fn cumulative_work_at(&self, cache: &ChainCache, parent: &Blk) -> StateResult<BigUint> {
        let head = cache.head(parent.head_id).ok_or_else(|| {
            StateError::Inconsistent(format!("head {} not cached", parent.head_id))
        })?;
        let tip = head
            .last
            .ok_or_else(|| StateError::Inconsistent(format!("head {} has no tip", head.id)))?;

        let mut work = head.chain_work.clone();
        let mut cursor = tip;
        while cursor != parent.hash {
            let blk = self.records.read_block(&cursor)?.ok_or_else(|| {
                StateError::Inconsistent(format!("block record {cursor} missing"))
            })?;
            let step = work_from_compact(blk.difficulty_target);
            if work < step {
                return Err(StateError::Inconsistent(format!(
                    "chain work underflow below block {cursor}"
                )));
            }
            work -= step;
            cursor = cache
                .locate(&cursor)
                .and_then(|c| c.previous)
                .ok_or_else(|| {
                    StateError::Inconsistent(format!("broken parent chain at {cursor}"))
                })?;
        }
        Ok(work)
    }

    /// Draw a head id that collides with no stored head.
    fn draw_head_id(&self, cache: &ChainCache) -> StateResult<u64> {
        let mut rng = self.rng.lock();
        loop {
            let id: u64 = rng.gen();
            if cache.has_head(id) || self.records.read_head(id)?.is_some() {
                continue;
            }
            return Ok(id);
        }
    }

    /// Resolve outputs by `(tx-hash, index)`, preferring the in-memory
    /// cache and falling back to the stored transaction. Only available
    /// outputs are returned.
    pub fn find_tx_outs(&self, need: &[(Hash, u32)]) -> StateResult<Vec<TxOut>> {
        let state = self.state.read();
        let mut outs = Vec::new();
        for (tx_hash, ix) in need {
            if let Some(out) = state.utxo.get(tx_hash, *ix) {
                outs.push(out.clone());
                continue;
            }
            if let Some(tx) = self.records.read_tx(tx_hash)? {
                if let Some(out) = tx.outputs.into_iter().nth(*ix as usize) {
                    if out.available {
                        outs.push(out);
                    }
                }
            }
        }
        Ok(outs)
    }

    /// Re-read the persisted counterpart of an output.
    pub fn get_source_reference(&self, source: &TxOut) -> StateResult<Option<TxOut>> {
        let _state = self.state.read();
        match self.records.read_tx(&source.tx_hash)? {
            Some(tx) => Ok(tx.outputs.into_iter().nth(source.ix as usize)),
            None => Ok(None),
        }
    }
}

/// Per-block work from the compact difficulty target.
fn work_from_compact(bits: u32) -> BigUint {
    let exponent = (bits >> 24) as u32;
    let mantissa = bits & 0x007f_ffff;
    if mantissa == 0 {
        return BigUint::from(1u32);
    }
    let target = if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3)) as usize
    };
    if target == BigUint::from(0u32) {
        return BigUint::from(1u32);
    }
    (BigUint::from(1u8) << 256usize) / (target + 1u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use crate::CancelToken;
    use btc_storage::{Database, StorageError, StorageResult};
    use std::io;
    use tempfile::TempDir;

    #[test]
    fn work_orders_by_target() {
        // A smaller target means more work.
        assert!(work_from_compact(bits(999)) > work_from_compact(bits(1000)));
        // Malformed compact values yield unit work.
        assert_eq!(work_from_compact(0), BigUint::from(1u32));
    }

    #[test]
    fn linear_insertion() {
        let (engine, _tmp) = engine();
        let cancel = CancelToken::new();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        assert_eq!(
            engine.insert_block(g.clone()).unwrap(),
            InsertOutcome::ExtendedTrunk
        );

        let a_tx = coinbase(1, vec![pay(50, 0xA1)]);
        let a = block(g.hash, 1010, 1000, vec![a_tx]);
        assert_eq!(
            engine.insert_block(a.clone()).unwrap(),
            InsertOutcome::ExtendedTrunk
        );

        assert_eq!(engine.get_trunk(), Some(a.hash));
        assert_eq!(engine.get_previous_block_hash(&a.hash), Some(g.hash));

        let unspent = engine
            .get_unspent_output(&[address(0xA1)], &cancel)
            .unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].value, 50);
    }

    #[test]
    fn simple_spend() {
        let (engine, _tmp) = engine();
        let cancel = CancelToken::new();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a_tx = coinbase(1, vec![pay(50, 0xA1)]);
        let a = block(g.hash, 1010, 1000, vec![a_tx.clone()]);
        engine.insert_block(a.clone()).unwrap();

        let b_tx = spend(&a_tx, 0, vec![pay(30, 0xB1), pay(20, 0xC1)]);
        let b = block(a.hash, 1020, 1000, vec![b_tx]);
        engine.insert_block(b).unwrap();

        assert!(engine
            .get_unspent_output(&[address(0xA1)], &cancel)
            .unwrap()
            .is_empty());
        let beta = engine
            .get_unspent_output(&[address(0xB1)], &cancel)
            .unwrap();
        assert_eq!(beta.len(), 1);
        assert_eq!(beta[0].value, 30);
        let gamma = engine
            .get_unspent_output(&[address(0xC1)], &cancel)
            .unwrap();
        assert_eq!(gamma.len(), 1);
        assert_eq!(gamma[0].value, 20);
    }

    #[test]
    fn heavier_side_branch_takes_over() {
        let (engine, _tmp) = engine();
        let cancel = CancelToken::new();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a = block(g.hash, 1010, 1000, vec![coinbase(1, vec![pay(50, 0xA1)])]);
        engine.insert_block(a.clone()).unwrap();

        // More work than A: switches immediately.
        let a2 = block(g.hash, 1011, 900, vec![coinbase(2, vec![pay(50, 0xD1)])]);
        let outcome = engine.insert_block(a2.clone()).unwrap();
        let head_id = match outcome {
            InsertOutcome::Reorganized { head_id, rewound } => {
                assert_eq!(rewound, 1);
                head_id
            }
            other => panic!("expected reorganization, got {other:?}"),
        };

        assert_eq!(engine.get_trunk(), Some(a2.hash));
        assert!(engine
            .get_unspent_output(&[address(0xA1)], &cancel)
            .unwrap()
            .is_empty());
        let delta = engine
            .get_unspent_output(&[address(0xD1)], &cancel)
            .unwrap();
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].value, 50);

        // Extending the winning branch keeps it current.
        let a3 = block(a2.hash, 1020, 1000, vec![coinbase(3, vec![pay(50, 0xD2)])]);
        assert_eq!(
            engine.insert_block(a3.clone()).unwrap(),
            InsertOutcome::ExtendedTrunk
        );
        assert_eq!(engine.get_trunk(), Some(a3.hash));
        let current = engine.state.read().cache.current_head_id();
        assert_eq!(current, Some(head_id));
    }

    #[test]
    fn reorganizing_back_restores_flags() {
        let (engine, _tmp) = engine();
        let cancel = CancelToken::new();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a = block(g.hash, 1010, 1000, vec![coinbase(1, vec![pay(50, 0xA1)])]);
        engine.insert_block(a.clone()).unwrap();
        let a2 = block(g.hash, 1011, 900, vec![coinbase(2, vec![pay(50, 0xD1)])]);
        engine.insert_block(a2).unwrap();

        // B does not spend A's output, so the balance of its owner comes
        // back with the branch.
        let b = block(a.hash, 1020, 1000, vec![coinbase(3, vec![pay(12, 0xB1)])]);
        let outcome = engine.insert_block(b.clone()).unwrap();
        assert!(matches!(
            outcome,
            InsertOutcome::Reorganized { rewound: 1, .. }
        ));

        assert_eq!(engine.get_trunk(), Some(b.hash));
        let alpha = engine
            .get_unspent_output(&[address(0xA1)], &cancel)
            .unwrap();
        assert_eq!(alpha.len(), 1);
        assert_eq!(alpha[0].value, 50);
        assert!(engine
            .get_unspent_output(&[address(0xD1)], &cancel)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn lighter_side_branch_stays_behind() {
        let (engine, _tmp) = engine();
        let cancel = CancelToken::new();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a = block(g.hash, 1010, 1000, vec![coinbase(1, vec![pay(50, 0xA1)])]);
        engine.insert_block(a.clone()).unwrap();

        // Less work than A.
        let side = block(g.hash, 1011, 1100, vec![coinbase(2, vec![pay(50, 0xD1)])]);
        assert!(matches!(
            engine.insert_block(side).unwrap(),
            InsertOutcome::SideBranch { .. }
        ));

        assert_eq!(engine.get_trunk(), Some(a.hash));
        // Side branch outputs are stored unavailable.
        assert!(engine
            .get_unspent_output(&[address(0xD1)], &cancel)
            .unwrap()
            .is_empty());
        assert_eq!(
            engine
                .get_unspent_output(&[address(0xA1)], &cancel)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn equal_work_does_not_flip() {
        let (engine, _tmp) = engine();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a = block(g.hash, 1010, 1000, vec![coinbase(1, vec![pay(50, 0xA1)])]);
        engine.insert_block(a.clone()).unwrap();

        // Same target, same work: the head already current keeps the slot.
        let rival = block(g.hash, 1011, 1000, vec![coinbase(2, vec![pay(50, 0xD1)])]);
        assert!(matches!(
            engine.insert_block(rival).unwrap(),
            InsertOutcome::SideBranch { .. }
        ));
        assert_eq!(engine.get_trunk(), Some(a.hash));
    }

    #[test]
    fn duplicate_insert_is_already_known() {
        let (engine, _tmp) = engine();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        assert_eq!(
            engine.insert_block(g).unwrap(),
            InsertOutcome::AlreadyKnown
        );
    }

    #[test]
    fn missing_parent_is_not_found() {
        let (engine, _tmp) = engine();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g).unwrap();

        let orphan = block(Hash::new([9; 32]), 1010, 1000, vec![coinbase(1, Vec::new())]);
        assert!(matches!(
            engine.insert_block(orphan),
            Err(StateError::NotFound(_))
        ));
        // The failed insertion did not open a batch; writes still work.
        let a = block(
            engine.get_trunk().unwrap(),
            1010,
            1000,
            vec![coinbase(2, Vec::new())],
        );
        engine.insert_block(a).unwrap();
    }

    #[test]
    fn second_root_is_rejected() {
        let (engine, _tmp) = engine();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g).unwrap();

        let rival_root = block(Hash::ZERO, 1001, 5000, vec![coinbase(1, Vec::new())]);
        assert!(matches!(
            engine.insert_block(rival_root),
            Err(StateError::Inconsistent(_))
        ));
    }

    #[test]
    fn restart_rebuilds_the_index() {
        let tmp = TempDir::new().unwrap();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        let a_tx = coinbase(1, vec![pay(50, 0xA1)]);
        let a = block(g.hash, 1010, 1000, vec![a_tx.clone()]);
        {
            let store: Arc<dyn KeyedStore> = Arc::new(Database::open(tmp.path(), 8).unwrap());
            let engine =
                ChainStore::with_store(store, 100, StdRng::seed_from_u64(11)).unwrap();
            engine.insert_block(g.clone()).unwrap();
            engine.insert_block(a.clone()).unwrap();
        }

        let store: Arc<dyn KeyedStore> = Arc::new(Database::open(tmp.path(), 8).unwrap());
        let engine = ChainStore::with_store(store, 100, StdRng::seed_from_u64(12)).unwrap();
        assert!(!engine.is_empty().unwrap());
        assert_eq!(engine.get_trunk(), Some(a.hash));
        assert_eq!(engine.get_previous_block_hash(&a.hash), Some(g.hash));

        // The unspent cache was rebuilt from the recent blocks.
        let found = engine.find_tx_outs(&[(a_tx.hash, 0)]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value, 50);
    }

    #[test]
    fn narrow_utxo_window_still_finds_outputs_on_disk() {
        let tmp = TempDir::new().unwrap();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        let a_tx = coinbase(1, vec![pay(50, 0xA1)]);
        let a = block(g.hash, 1010, 1000, vec![a_tx.clone()]);
        {
            let store: Arc<dyn KeyedStore> = Arc::new(Database::open(tmp.path(), 8).unwrap());
            let engine =
                ChainStore::with_store(store, 100, StdRng::seed_from_u64(21)).unwrap();
            engine.insert_block(g.clone()).unwrap();
            engine.insert_block(a.clone()).unwrap();
            let b = block(a.hash, 1020, 1000, vec![coinbase(2, vec![pay(10, 0xB1)])]);
            engine.insert_block(b).unwrap();
        }

        // Window of zero blocks: the cache is empty, lookups fall back to
        // the stored transaction.
        let store: Arc<dyn KeyedStore> = Arc::new(Database::open(tmp.path(), 8).unwrap());
        let engine = ChainStore::with_store(store, 0, StdRng::seed_from_u64(22)).unwrap();
        let found = engine.find_tx_outs(&[(a_tx.hash, 0)]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn spent_outputs_are_not_found() {
        let (engine, _tmp) = engine();
        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();
        let a_tx = coinbase(1, vec![pay(50, 0xA1)]);
        let a = block(g.hash, 1010, 1000, vec![a_tx.clone()]);
        engine.insert_block(a.clone()).unwrap();
        let b = block(a.hash, 1020, 1000, vec![spend(&a_tx, 0, vec![pay(50, 0xB1)])]);
        engine.insert_block(b).unwrap();

        assert!(engine.find_tx_outs(&[(a_tx.hash, 0)]).unwrap().is_empty());

        // The persisted counterpart reports the spent flag.
        let reference = engine
            .get_source_reference(&a_tx.outputs[0])
            .unwrap()
            .unwrap();
        assert!(!reference.available);
    }

    /// Store wrapper that fails batch commits on demand.
    struct FailingStore {
        inner: Database,
        fail_commit: AtomicBool,
    }

    impl KeyedStore for FailingStore {
        fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
            self.inner.put(key, value)
        }
        fn is_empty(&self) -> StorageResult<bool> {
            self.inner.is_empty()
        }
        fn scan(
            &self,
            tag: KeyTag,
        ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
            self.inner.scan(tag)
        }
        fn scan_prefixed(
            &self,
            tag: KeyTag,
            prefix: &[u8],
        ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
            self.inner.scan_prefixed(tag, prefix)
        }
        fn scan_backward(
            &self,
            tag: KeyTag,
        ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
            self.inner.scan_backward(tag)
        }
        fn begin_batch(&self) -> StorageResult<()> {
            self.inner.begin_batch()
        }
        fn commit_batch(&self) -> StorageResult<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                self.inner.cancel_batch()?;
                return Err(StorageError::Io(io::Error::other("injected commit failure")));
            }
            self.inner.commit_batch()
        }
        fn cancel_batch(&self) -> StorageResult<()> {
            self.inner.cancel_batch()
        }
    }

    #[test]
    fn commit_failure_closes_the_engine_to_writes() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FailingStore {
            inner: Database::open(tmp.path(), 8).unwrap(),
            fail_commit: AtomicBool::new(false),
        });
        let dyn_store: Arc<dyn KeyedStore> = Arc::clone(&store);
        let engine =
            ChainStore::with_store(dyn_store, 100, StdRng::seed_from_u64(31)).unwrap();

        let g = block(Hash::ZERO, 1000, 5000, vec![coinbase(0, vec![pay(25, 0xEE)])]);
        engine.insert_block(g.clone()).unwrap();

        store.fail_commit.store(true, Ordering::SeqCst);
        let a = block(g.hash, 1010, 1000, vec![coinbase(1, vec![pay(50, 0xA1)])]);
        assert!(matches!(
            engine.insert_block(a.clone()),
            Err(StateError::Storage(_))
        ));

        // Writes refuse even after the fault clears; reads keep working.
        store.fail_commit.store(false, Ordering::SeqCst);
        assert!(matches!(
            engine.insert_block(a),
            Err(StateError::WritesRefused)
        ));
        assert_eq!(engine.get_trunk(), Some(g.hash));
        assert!(engine.get_block(&g.hash).unwrap().is_some());
    }
}
