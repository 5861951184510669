//! Read-only query surface.
//!
//! All queries run under the shared reader lock and observe the committed
//! state; an undecodable record degrades to a miss instead of failing the
//! query. Address-wide enumerations honor a cancellation token between
//! index entries and block reads.

use crate::statement::{
    AccountPosting, AccountStatement, PostingEntry, ReceivedOutput, SpentOutput,
};
use crate::{CancelToken, ChainStore, StateError, StateResult};
use btc_model::{Blk, Hash, Tx, TxOut};
use btc_storage::KeyTag;
use std::collections::HashMap;
use tracing::{instrument, warn};

/// Map a codec failure on a read to a miss, logging it.
fn recover_undecodable<T>(result: StateResult<Option<T>>, what: &str) -> StateResult<Option<T>> {
    match result {
        Err(StateError::Codec(e)) => {
            warn!(what, error = %e, "undecodable record treated as missing");
            Ok(None)
        }
        other => other,
    }
}

impl ChainStore {
    /// Full block: header, member transactions in listed order, assigned
    /// head.
    pub fn get_block(&self, hash: &Hash) -> StateResult<Option<Blk>> {
        let _state = self.state.read();
        recover_undecodable(self.records.read_block_full(hash), "block")
    }

    /// Transaction lookup, preferring the relay pool when one is attached.
    pub fn get_transaction(&self, hash: &Hash) -> StateResult<Option<Tx>> {
        if let Some(pool) = self.relay.read().as_ref() {
            if let Some(tx) = pool.get_transaction(hash) {
                return Ok(Some(tx));
            }
        }
        let _state = self.state.read();
        recover_undecodable(self.records.read_tx(hash), "transaction")
    }

    /// Hash of the current best head's tip.
    pub fn get_trunk(&self) -> Option<Hash> {
        self.state.read().cache.trunk_hash()
    }

    /// Parent hash of a stored block.
    pub fn get_previous_block_hash(&self, hash: &Hash) -> Option<Hash> {
        self.state.read().cache.previous_block_hash(hash)
    }

    /// Transactions related to any of the addresses: every transaction
    /// that receives to the address or spends from an output it owned.
    fn related_txs(&self, addresses: &[String], cancel: &CancelToken) -> StateResult<Vec<Tx>> {
        let mut related = Vec::new();
        for address in addresses {
            for (key, _) in self.store.scan_prefixed(KeyTag::Atx, address.as_bytes())? {
                cancel.check()?;
                let body = KeyTag::body(&key);
                let Ok(tx_hash) = Hash::from_slice(&body[address.len()..]) else {
                    continue;
                };
                match self.records.read_tx(&tx_hash)? {
                    Some(tx) => related.push(tx),
                    None => warn!(%tx_hash, "index entry for missing transaction"),
                }
            }
        }
        Ok(related)
    }

    /// Unspent outputs owned by any of the addresses.
    #[instrument(skip(self, cancel), fields(addresses = addresses.len()))]
    pub fn get_unspent_output(
        &self,
        addresses: &[String],
        cancel: &CancelToken,
    ) -> StateResult<Vec<TxOut>> {
        let _state = self.state.read();
        self.unspent_inner(addresses, cancel)
    }

    fn unspent_inner(
        &self,
        addresses: &[String],
        cancel: &CancelToken,
    ) -> StateResult<Vec<TxOut>> {
        let mut result = Vec::new();
        for tx in self.related_txs(addresses, cancel)? {
            for out in tx.outputs {
                if out.available && out.owned_by_any(addresses) {
                    result.push(out);
                }
            }
        }
        Ok(result)
    }

    /// Outputs spent away from the addresses since `from_time`.
    #[instrument(skip(self, cancel), fields(addresses = addresses.len(), from_time))]
    pub fn get_spent(
        &self,
        addresses: &[String],
        from_time: u32,
        cancel: &CancelToken,
    ) -> StateResult<Vec<SpentOutput>> {
        let _state = self.state.read();
        self.spent_inner(addresses, from_time, cancel)
    }

    fn spent_inner(
        &self,
        addresses: &[String],
        from_time: u32,
        cancel: &CancelToken,
    ) -> StateResult<Vec<SpentOutput>> {
        let mut result = Vec::new();
        for tx in self.related_txs(addresses, cancel)? {
            for input in &tx.inputs {
                if input.is_coinbase() {
                    continue;
                }
                cancel.check()?;
                let Some(source) = self.records.read_tx(&input.source_hash)? else {
                    warn!(source = %input.source_hash, "spend references missing transaction");
                    continue;
                };
                let Some(block) = self.records.read_block(&source.block_hash)? else {
                    continue;
                };
                if block.create_time < from_time {
                    continue;
                }
                let Some(out) = source.outputs.into_iter().nth(input.source_ix as usize) else {
                    continue;
                };
                if out.owned_by_any(addresses) {
                    result.push(SpentOutput {
                        output: out,
                        block_time: block.create_time,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Outputs received by the addresses since `from_time`.
    #[instrument(skip(self, cancel), fields(addresses = addresses.len(), from_time))]
    pub fn get_received(
        &self,
        addresses: &[String],
        from_time: u32,
        cancel: &CancelToken,
    ) -> StateResult<Vec<ReceivedOutput>> {
        let _state = self.state.read();
        self.received_inner(addresses, from_time, cancel)
    }

    fn received_inner(
        &self,
        addresses: &[String],
        from_time: u32,
        cancel: &CancelToken,
    ) -> StateResult<Vec<ReceivedOutput>> {
        let mut result = Vec::new();
        for tx in self.related_txs(addresses, cancel)? {
            cancel.check()?;
            let Some(block) = self.records.read_block(&tx.block_hash)? else {
                continue;
            };
            if block.create_time < from_time {
                continue;
            }
            for out in tx.outputs {
                if out.owned_by_any(addresses) {
                    result.push(ReceivedOutput {
                        output: out,
                        block_time: block.create_time,
                    });
                }
            }
        }
        Ok(result)
    }

    /// Account statement for the addresses over the window starting at
    /// `from_time`.
    ///
    /// The opening balance is the current unspent outputs minus those that
    /// appear as received inside the window; postings are the received and
    /// spent movements, ascending by timestamp with received before spent
    /// at equal timestamps.
    #[instrument(skip(self, cancel), fields(addresses = addresses.len(), from_time))]
    pub fn get_account_statement(
        &self,
        addresses: &[String],
        from_time: u32,
        cancel: &CancelToken,
    ) -> StateResult<AccountStatement> {
        let state = self.state.read();
        let trunk = state
            .cache
            .trunk_hash()
            .ok_or_else(|| StateError::NotFound("no chain head".into()))?;
        let trunk_blk = self
            .records
            .read_block(&trunk)?
            .ok_or_else(|| StateError::Inconsistent(format!("block record {trunk} missing")))?;

        let mut balance: HashMap<(Hash, u32), TxOut> = self
            .unspent_inner(addresses, cancel)?
            .into_iter()
            .map(|out| ((out.tx_hash, out.ix), out))
            .collect();

        let mut postings = Vec::new();
        for spent in self.spent_inner(addresses, from_time, cancel)? {
            postings.push(AccountPosting {
                timestamp: spent.block_time,
                entry: PostingEntry::Spent(spent.output),
            });
        }
        for received in self.received_inner(addresses, from_time, cancel)? {
            balance.remove(&(received.output.tx_hash, received.output.ix));
            postings.push(AccountPosting {
                timestamp: received.block_time,
                entry: PostingEntry::Received(received.output),
            });
        }
        postings.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.entry.rank().cmp(&b.entry.rank()))
        });

        Ok(AccountStatement {
            most_recent_block: trunk,
            extracted: trunk_blk.create_time,
            opening: trunk_blk.create_time,
            opening_balances: balance.into_values().collect(),
            postings,
        })
    }
}
