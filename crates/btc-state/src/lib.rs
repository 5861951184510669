//! # btc-state
//!
//! The reorganization-aware chain engine: an in-memory index of the block
//! tree across all competing heads, the mutator that applies validated
//! blocks and moves the unspent-output state forward and backward across
//! branch switches, and the read-only query surface for wallet-style
//! clients.
//!
//! ## Architecture
//!
//! - [`ChainStore`]: owns the keyed store and serializes all mutation
//! - `ChainCache`: block-tree summaries and head bookkeeping
//! - `TxOutCache`: advisory in-memory unspent-output cache
//! - Query surface: block/transaction lookup, unspent outputs, account
//!   statements, stored peers

mod cache;
mod config;
mod engine;
mod error;
mod peers;
mod query;
mod records;
mod statement;
mod utxo;

pub use cache::{CachedBlock, CachedHead, ChainCache};
pub use config::EngineConfig;
pub use engine::{ChainStore, InsertOutcome};
pub use error::{StateError, StateResult};
pub use statement::{
    AccountPosting, AccountStatement, PostingEntry, ReceivedOutput, SpentOutput,
};
pub use utxo::TxOutCache;

use btc_model::{Hash, Tx};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Relay pool collaborator: answers transaction lookups from memory before
/// the store is consulted.
pub trait RelayPool: Send + Sync {
    fn get_transaction(&self, hash: &Hash) -> Option<Tx>;
}

/// Cooperative cancellation flag for long-running queries.
///
/// Checked between index entries and between block reads; a cancelled
/// query surfaces [`StateError::Cancelled`] with no side effects.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> StateResult<()> {
        if self.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        Ok(())
    }
}
