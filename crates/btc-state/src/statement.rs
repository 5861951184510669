//! Account statement types.

use btc_model::{Hash, TxOut};

/// An output received by the queried address set, stamped with the
/// create-time of its containing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedOutput {
    pub output: TxOut,
    pub block_time: u32,
}

/// An output spent away from the queried address set, stamped with the
/// create-time of the block containing the source transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentOutput {
    pub output: TxOut,
    pub block_time: u32,
}

/// One movement on an account statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostingEntry {
    Received(TxOut),
    Spent(TxOut),
}

impl PostingEntry {
    /// Sort rank at equal timestamps: received sorts before spent.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            PostingEntry::Received(_) => 0,
            PostingEntry::Spent(_) => 1,
        }
    }
}

/// A timestamped statement entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPosting {
    /// Unix seconds of the containing block.
    pub timestamp: u32,
    pub entry: PostingEntry,
}

/// Account statement for an address set: the opening balance at the start
/// of the window and the ordered movements since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatement {
    /// Hash of the best block at extraction time.
    pub most_recent_block: Hash,
    /// Create-time of the best block; the extraction instant.
    pub extracted: u32,
    /// Opening timestamp, equal to the extraction instant.
    pub opening: u32,
    /// Unspent outputs making up the opening balance.
    pub opening_balances: Vec<TxOut>,
    /// Movements inside the window, ascending by timestamp; received
    /// before spent at equal timestamps.
    pub postings: Vec<AccountPosting>,
}
