//! In-memory index of the block tree.
//!
//! Holds a header summary of every stored block and a record of every
//! chain head. Parent and previous-head links are relations resolved
//! through the lookup tables, never owning references, so competing
//! branches that share ancestry form no ownership cycles.

use btc_model::{Blk, Hash, Head};
use num_bigint::BigUint;
use std::collections::HashMap;

/// Header summary of one stored block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlock {
    pub hash: Hash,
    /// Parent block hash; `None` for genesis.
    pub previous: Option<Hash>,
    /// Creation time, unix seconds.
    pub create_time: u32,
    pub height: u32,
}

/// A materialized chain head.
#[derive(Debug, Clone)]
pub struct CachedHead {
    pub id: u64,
    pub chain_work: BigUint,
    /// Height of the branch tip.
    pub height: u32,
    /// The head this one forked from, if any.
    pub previous: Option<u64>,
    /// Tip of the branch.
    pub last: Option<Hash>,
    /// Member blocks in insertion order.
    pub blocks: Vec<Hash>,
}

impl CachedHead {
    fn from_record(head: &Head) -> Self {
        Self {
            id: head.id,
            chain_work: head.chain_work.clone(),
            height: head.height,
            previous: head.previous,
            last: None,
            blocks: Vec::new(),
        }
    }
}

/// The block tree across all known heads, plus the current best head.
#[derive(Debug, Default)]
pub struct ChainCache {
    blocks: HashMap<Hash, CachedBlock>,
    heads: HashMap<u64, CachedHead>,
    current: Option<u64>,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn head_count(&self) -> usize {
        self.heads.len()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn locate(&self, hash: &Hash) -> Option<&CachedBlock> {
        self.blocks.get(hash)
    }

    pub fn head(&self, id: u64) -> Option<&CachedHead> {
        self.heads.get(&id)
    }

    pub fn has_head(&self, id: u64) -> bool {
        self.heads.contains_key(&id)
    }

    pub fn current_head_id(&self) -> Option<u64> {
        self.current
    }

    pub fn current_head(&self) -> Option<&CachedHead> {
        self.current.and_then(|id| self.heads.get(&id))
    }

    /// Hash of the current best head's tip.
    pub fn trunk_hash(&self) -> Option<Hash> {
        self.current_head().and_then(|h| h.last)
    }

    /// Parent hash of a stored block.
    pub fn previous_block_hash(&self, hash: &Hash) -> Option<Hash> {
        self.blocks.get(hash).and_then(|b| b.previous)
    }

    /// The head whose tip is `hash`, if any.
    pub fn tip_of(&self, hash: &Hash) -> Option<u64> {
        self.heads
            .values()
            .find(|h| h.last.as_ref() == Some(hash))
            .map(|h| h.id)
    }

    /// Install a head record seen during the startup scan. The best head is
    /// the one with maximum chain-work, tie-broken by height; an earlier
    /// head keeps the slot on a full tie.
    pub fn insert_head(&mut self, head: &Head) {
        let cached = CachedHead::from_record(head);
        match self.current.and_then(|id| self.heads.get(&id)) {
            None => self.current = Some(cached.id),
            Some(best) => {
                if cached.chain_work > best.chain_work
                    || (cached.chain_work == best.chain_work && cached.height > best.height)
                {
                    self.current = Some(cached.id);
                }
            }
        }
        self.heads.insert(cached.id, cached);
    }

    /// Create or update a head from its persisted record, preserving the
    /// member list and tip of an existing entry.
    pub fn upsert_head(&mut self, head: &Head) {
        match self.heads.get_mut(&head.id) {
            Some(existing) => {
                existing.chain_work = head.chain_work.clone();
                existing.height = head.height;
                existing.previous = head.previous;
            }
            None => {
                self.heads.insert(head.id, CachedHead::from_record(head));
            }
        }
    }

    pub fn set_current(&mut self, id: u64) {
        self.current = Some(id);
    }

    /// Link a block into the tree and append it to its head's member list,
    /// advancing the head's tip if this is the highest block seen on it.
    /// Returns false when the parent is unknown.
    pub fn install_block(&mut self, blk: &Blk) -> bool {
        let previous = if blk.previous_hash.is_zero() {
            None
        } else {
            if !self.blocks.contains_key(&blk.previous_hash) {
                return false;
            }
            Some(blk.previous_hash)
        };
        self.blocks.insert(
            blk.hash,
            CachedBlock {
                hash: blk.hash,
                previous,
                create_time: blk.create_time,
                height: blk.height,
            },
        );
        let tip_height = self
            .heads
            .get(&blk.head_id)
            .and_then(|h| h.last)
            .and_then(|h| self.blocks.get(&h))
            .map(|b| b.height);
        if let Some(head) = self.heads.get_mut(&blk.head_id) {
            head.blocks.push(blk.hash);
            if tip_height.map_or(true, |t| blk.height >= t) {
                head.last = Some(blk.hash);
            }
        }
        true
    }

    /// Lowest common ancestor of two stored blocks, walking parent links.
    pub fn common_ancestor(&self, a: &Hash, b: &Hash) -> Option<Hash> {
        let mut a = self.blocks.get(a)?;
        let mut b = self.blocks.get(b)?;
        while a.height > b.height {
            a = self.blocks.get(&a.previous?)?;
        }
        while b.height > a.height {
            b = self.blocks.get(&b.previous?)?;
        }
        while a.hash != b.hash {
            a = self.blocks.get(&a.previous?)?;
            b = self.blocks.get(&b.previous?)?;
        }
        Some(a.hash)
    }

    /// Blocks from `from` down to, but not including, `to`, in descending
    /// height order along parent links. `None` when `to` is not an ancestor
    /// of `from`.
    pub fn walk(&self, from: &Hash, to: &Hash) -> Option<Vec<Hash>> {
        let mut path = Vec::new();
        let mut cursor = self.blocks.get(from)?;
        while cursor.hash != *to {
            path.push(cursor.hash);
            cursor = self.blocks.get(&cursor.previous?)?;
        }
        Some(path)
    }
}
