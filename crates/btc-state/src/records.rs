//! Typed reads and writes of entities over the keyed store.
//!
//! All entity I/O funnels through here. Writing a transaction also
//! maintains the address-to-transaction index: one entry per
//! `(owner address, tx hash)` pair, covering the owners of the
//! transaction's own outputs and the owners of every source output its
//! inputs spend.

use crate::{StateError, StateResult};
use btc_model::{Blk, Hash, Head, KnownPeer, Tx};
use btc_storage::{KeyTag, KeyedStore};
use std::sync::Arc;

pub(crate) struct Records {
    store: Arc<dyn KeyedStore>,
}

impl Records {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub fn read_tx(&self, hash: &Hash) -> StateResult<Option<Tx>> {
        match self.store.get(&KeyTag::Tx.key(hash.as_ref()))? {
            Some(data) => Ok(Some(Tx::decode(&data)?)),
            None => Ok(None),
        }
    }

    pub fn write_tx(&self, tx: &Tx) -> StateResult<()> {
        self.store.put(&KeyTag::Tx.key(tx.hash.as_ref()), &tx.encode())?;
        for out in &tx.outputs {
            for owner in out.owners() {
                self.write_atx(owner, &tx.hash)?;
            }
        }
        for input in &tx.inputs {
            if input.is_coinbase() {
                continue;
            }
            let source = self.read_tx(&input.source_hash)?.ok_or_else(|| {
                StateError::Inconsistent(format!(
                    "transaction {} spends missing transaction {}",
                    tx.hash, input.source_hash
                ))
            })?;
            let out = source.outputs.get(input.source_ix as usize).ok_or_else(|| {
                StateError::Inconsistent(format!(
                    "transaction {} spends missing output {} of {}",
                    tx.hash, input.source_ix, input.source_hash
                ))
            })?;
            for owner in out.owners() {
                self.write_atx(owner, &tx.hash)?;
            }
        }
        Ok(())
    }

    fn write_atx(&self, address: &str, tx_hash: &Hash) -> StateResult<()> {
        let mut body = Vec::with_capacity(address.len() + tx_hash.as_ref().len());
        body.extend_from_slice(address.as_bytes());
        body.extend_from_slice(tx_hash.as_ref());
        self.store.put(&KeyTag::Atx.key(&body), &[0u8])?;
        Ok(())
    }

    /// Header form: the stored record, transactions not joined.
    pub fn read_block(&self, hash: &Hash) -> StateResult<Option<Blk>> {
        match self.store.get(&KeyTag::Block.key(hash.as_ref()))? {
            Some(data) => Ok(Some(Blk::decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Full form: transactions joined in listed order, head attached.
    pub fn read_block_full(&self, hash: &Hash) -> StateResult<Option<Blk>> {
        let Some(mut blk) = self.read_block(hash)? else {
            return Ok(None);
        };
        blk.head = self.read_head(blk.head_id)?;
        let mut transactions = Vec::with_capacity(blk.tx_hashes.len());
        for tx_hash in &blk.tx_hashes {
            let tx = self.read_tx(tx_hash)?.ok_or_else(|| {
                StateError::Inconsistent(format!(
                    "block {} lists missing transaction {}",
                    hash, tx_hash
                ))
            })?;
            transactions.push(tx);
        }
        blk.transactions = transactions;
        Ok(Some(blk))
    }

    /// Persist a block record and every member transaction.
    pub fn write_block(&self, blk: &Blk) -> StateResult<()> {
        self.store
            .put(&KeyTag::Block.key(blk.hash.as_ref()), &blk.encode())?;
        for tx in &blk.transactions {
            self.write_tx(tx)?;
        }
        Ok(())
    }

    pub fn read_head(&self, id: u64) -> StateResult<Option<Head>> {
        match self.store.get(&KeyTag::Head.key(&id.to_be_bytes()))? {
            Some(data) => Ok(Some(Head::decode(&data)?)),
            None => Ok(None),
        }
    }

    pub fn write_head(&self, head: &Head) -> StateResult<()> {
        self.store
            .put(&KeyTag::Head.key(&head.id.to_be_bytes()), &head.encode())?;
        Ok(())
    }

    pub fn read_peer(&self, address: &str) -> StateResult<Option<KnownPeer>> {
        match self.store.get(&KeyTag::Peer.key(address.as_bytes()))? {
            Some(data) => Ok(Some(KnownPeer::decode(&data)?)),
            None => Ok(None),
        }
    }

    pub fn write_peer(&self, peer: &KnownPeer) -> StateResult<()> {
        self.store
            .put(&KeyTag::Peer.key(peer.address.as_bytes()), &peer.encode())?;
        Ok(())
    }
}
