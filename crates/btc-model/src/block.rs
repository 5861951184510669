//! Stored blocks.

use crate::wire::{Reader, Writer};
use crate::{CodecResult, Hash, Head, Tx};

/// A stored block: the 80-byte public header, the engine's internal fields
/// (height, assigned head) and the ordered transaction hash list.
///
/// `transactions` and `head` are joined on demand by full reads and never
/// enter the encoded form; equality ignores them.
#[derive(Debug, Clone, Default)]
pub struct Blk {
    /// Derived identifier, double-SHA256 over the header.
    pub hash: Hash,
    pub version: u32,
    /// Parent block hash; all-zero for genesis.
    pub previous_hash: Hash,
    pub merkle_root: Hash,
    /// Creation time, unix seconds.
    pub create_time: u32,
    /// Compact difficulty target.
    pub difficulty_target: u32,
    pub nonce: u32,
    /// Height on its branch; genesis is 0.
    pub height: u32,
    /// Identifier of the head this block was assigned to.
    pub head_id: u64,
    /// Hashes of the member transactions, in wire order.
    pub tx_hashes: Vec<Hash>,
    /// Member transactions; populated only on full reads.
    pub transactions: Vec<Tx>,
    /// The assigned head record; populated only on full reads.
    pub head: Option<Head>,
}

impl PartialEq for Blk {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.version == other.version
            && self.previous_hash == other.previous_hash
            && self.merkle_root == other.merkle_root
            && self.create_time == other.create_time
            && self.difficulty_target == other.difficulty_target
            && self.nonce == other.nonce
            && self.height == other.height
            && self.head_id == other.head_id
            && self.tx_hashes == other.tx_hashes
    }
}

impl Eq for Blk {}

impl Blk {
    /// Build a block around its transactions, computing the block hash and
    /// stamping each transaction's containing-block relation.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        version: u32,
        previous_hash: Hash,
        merkle_root: Hash,
        create_time: u32,
        difficulty_target: u32,
        nonce: u32,
        mut transactions: Vec<Tx>,
    ) -> Self {
        let mut blk = Self {
            hash: Hash::ZERO,
            version,
            previous_hash,
            merkle_root,
            create_time,
            difficulty_target,
            nonce,
            height: 0,
            head_id: 0,
            tx_hashes: transactions.iter().map(|t| t.hash).collect(),
            transactions: Vec::new(),
            head: None,
        };
        blk.hash = blk.compute_hash();
        for tx in &mut transactions {
            tx.block_hash = blk.hash;
        }
        blk.transactions = transactions;
        blk
    }

    /// Double-SHA256 over the 80-byte header.
    pub fn compute_hash(&self) -> Hash {
        let mut w = Writer::new();
        self.encode_header(&mut w);
        Hash::digest(&w.into_bytes())
    }

    fn encode_header(&self, w: &mut Writer) {
        w.write_u32(self.version);
        w.write_hash(&self.previous_hash);
        w.write_hash(&self.merkle_root);
        w.write_u32(self.create_time);
        w.write_u32(self.difficulty_target);
        w.write_u32(self.nonce);
    }

    /// Stored form: header, then height, assigned head id and the
    /// transaction hash list.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_header(&mut w);
        w.write_u32(self.height);
        w.write_u64(self.head_id);
        w.write_var_int(self.tx_hashes.len() as u64);
        for hash in &self.tx_hashes {
            w.write_hash(hash);
        }
        w.into_bytes()
    }

    /// Decode a stored block, recomputing its derived hash. Transactions
    /// are not part of the record; the result carries none.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        let version = r.read_u32()?;
        let previous_hash = r.read_hash()?;
        let merkle_root = r.read_hash()?;
        let create_time = r.read_u32()?;
        let difficulty_target = r.read_u32()?;
        let nonce = r.read_u32()?;
        let height = r.read_u32()?;
        let head_id = r.read_u64()?;
        let count = r.read_var_int()?;
        let mut tx_hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            tx_hashes.push(r.read_hash()?);
        }
        r.finish()?;

        let mut blk = Self {
            hash: Hash::ZERO,
            version,
            previous_hash,
            merkle_root,
            create_time,
            difficulty_target,
            nonce,
            height,
            head_id,
            tx_hashes,
            transactions: Vec::new(),
            head: None,
        };
        blk.hash = blk.compute_hash();
        Ok(blk)
    }

    /// True for a block with no parent.
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_zero()
    }
}
