//! Transactions, their inputs and outputs.

use crate::wire::{Reader, Writer};
use crate::{script, CodecResult, Hash};

/// A transaction input.
///
/// `tx_hash` names the containing transaction; `source_hash`/`source_ix`
/// name the output being spent. Both are relations resolved through the
/// store, never owning references. An all-zero `source_hash` marks a
/// coinbase input, which has no referent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Hash of the containing transaction.
    pub tx_hash: Hash,
    /// Hash of the transaction whose output is spent.
    pub source_hash: Hash,
    /// Index of the spent output within its transaction.
    pub source_ix: u32,
    /// Sequence number.
    pub sequence: u32,
    /// Unlocking script bytes.
    pub script: Vec<u8>,
}

impl TxIn {
    /// An input spending `source_hash[source_ix]`.
    pub fn spending(source_hash: Hash, source_ix: u32, script: Vec<u8>) -> Self {
        Self {
            tx_hash: Hash::ZERO,
            source_hash,
            source_ix,
            sequence: u32::MAX,
            script,
        }
    }

    /// A coinbase input: zero source hash, no referent.
    pub fn coinbase(script: Vec<u8>) -> Self {
        Self {
            tx_hash: Hash::ZERO,
            source_hash: Hash::ZERO,
            source_ix: u32::MAX,
            sequence: u32::MAX,
            script,
        }
    }

    /// True if this input is a coinbase input.
    pub fn is_coinbase(&self) -> bool {
        self.source_hash.is_zero()
    }
}

/// A transaction output.
///
/// Owner addresses are derived from standard locking scripts at
/// construction; up to three of them, fewer when the script names fewer
/// keys. `available` is true iff the output is unspent on the branch the
/// engine currently represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Hash of the containing transaction.
    pub tx_hash: Hash,
    /// Index within the containing transaction.
    pub ix: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Locking script bytes.
    pub script: Vec<u8>,
    /// First derived owner address.
    pub owner1: Option<String>,
    /// Second derived owner address (multisig only).
    pub owner2: Option<String>,
    /// Third derived owner address (multisig only).
    pub owner3: Option<String>,
    /// Unspent on the current branch.
    pub available: bool,
}

impl TxOut {
    /// Build an output, deriving its owners from the locking script.
    pub fn new(value: u64, script: Vec<u8>) -> Self {
        let mut owners = script::extract_owners(&script).into_iter();
        Self {
            tx_hash: Hash::ZERO,
            ix: 0,
            value,
            script,
            owner1: owners.next(),
            owner2: owners.next(),
            owner3: owners.next(),
            available: false,
        }
    }

    /// The derived owner addresses, in order.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.owner1
            .iter()
            .chain(self.owner2.iter())
            .chain(self.owner3.iter())
            .map(String::as_str)
    }

    /// True if any owner is contained in `addresses`.
    pub fn owned_by_any(&self, addresses: &[String]) -> bool {
        self.owners().any(|o| addresses.iter().any(|a| a == o))
    }
}

/// A transaction: hash, public wire fields and the internal fields the
/// engine maintains (containing block, availability, owners).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    /// Derived identifier, double-SHA256 over the public wire form.
    pub hash: Hash,
    pub version: u32,
    pub lock_time: u32,
    /// Hash of the block this transaction belongs to.
    pub block_hash: Hash,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Tx {
    /// Build a transaction, computing its hash and stamping the parent
    /// relation and index on every input and output.
    pub fn assemble(version: u32, lock_time: u32, inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        let mut tx = Self {
            hash: Hash::ZERO,
            version,
            lock_time,
            block_hash: Hash::ZERO,
            inputs,
            outputs,
        };
        tx.hash = tx.compute_hash();
        for input in &mut tx.inputs {
            input.tx_hash = tx.hash;
        }
        for (ix, output) in tx.outputs.iter_mut().enumerate() {
            output.tx_hash = tx.hash;
            output.ix = ix as u32;
        }
        tx
    }

    /// Double-SHA256 over the public wire form.
    pub fn compute_hash(&self) -> Hash {
        let mut w = Writer::new();
        self.encode_public(&mut w);
        Hash::digest(&w.into_bytes())
    }

    fn encode_public(&self, w: &mut Writer) {
        w.write_u32(self.version);
        w.write_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            w.write_hash(&input.source_hash);
            w.write_u32(input.source_ix);
            w.write_var_bytes(&input.script);
            w.write_u32(input.sequence);
        }
        w.write_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            w.write_u64(output.value);
            w.write_var_bytes(&output.script);
        }
        w.write_u32(self.lock_time);
    }

    /// Stored form: public wire fields followed by the internal fields, in
    /// order: containing block hash, then per output the available flag and
    /// the three owner slots as length-prefixed UTF-8 (empty slot encodes as
    /// a zero length).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_public(&mut w);
        w.write_hash(&self.block_hash);
        for output in &self.outputs {
            w.write_u8(output.available as u8);
            for owner in [&output.owner1, &output.owner2, &output.owner3] {
                w.write_var_string(owner.as_deref().unwrap_or(""));
            }
        }
        w.into_bytes()
    }

    /// Decode a stored transaction, recomputing its derived hash.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);

        let version = r.read_u32()?;
        let input_count = r.read_var_int()?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let source_hash = r.read_hash()?;
            let source_ix = r.read_u32()?;
            let script = r.read_var_bytes()?;
            let sequence = r.read_u32()?;
            inputs.push(TxIn {
                tx_hash: Hash::ZERO,
                source_hash,
                source_ix,
                sequence,
                script,
            });
        }

        let output_count = r.read_var_int()?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for ix in 0..output_count {
            let value = r.read_u64()?;
            let script = r.read_var_bytes()?;
            outputs.push(TxOut {
                tx_hash: Hash::ZERO,
                ix: ix as u32,
                value,
                script,
                owner1: None,
                owner2: None,
                owner3: None,
                available: false,
            });
        }
        let lock_time = r.read_u32()?;

        let block_hash = r.read_hash()?;
        for output in &mut outputs {
            output.available = r.read_u8()? != 0;
            let mut owners = [None, None, None];
            for slot in &mut owners {
                let s = r.read_var_string()?;
                if !s.is_empty() {
                    *slot = Some(s);
                }
            }
            let [owner1, owner2, owner3] = owners;
            output.owner1 = owner1;
            output.owner2 = owner2;
            output.owner3 = owner3;
        }
        r.finish()?;

        let mut tx = Self {
            hash: Hash::ZERO,
            version,
            lock_time,
            block_hash,
            inputs,
            outputs,
        };
        tx.hash = tx.compute_hash();
        for input in &mut tx.inputs {
            input.tx_hash = tx.hash;
        }
        for output in &mut tx.outputs {
            output.tx_hash = tx.hash;
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2pkh_script;

    fn sample_tx() -> Tx {
        let mut paid = TxOut::new(5_000_000_000, p2pkh_script(&[9u8; 20]));
        paid.available = true;
        let change = TxOut::new(1_000, vec![0x6a]); // non-standard, no owner
        let mut tx = Tx::assemble(
            1,
            0,
            vec![TxIn::spending(Hash::new([3u8; 32]), 1, vec![0xab, 0xcd])],
            vec![paid, change],
        );
        tx.block_hash = Hash::new([7u8; 32]);
        tx
    }

    #[test]
    fn round_trip() {
        let tx = sample_tx();
        let decoded = Tx::decode(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn hash_ignores_internal_fields() {
        let mut tx = sample_tx();
        let hash = tx.hash;
        tx.block_hash = Hash::new([1u8; 32]);
        tx.outputs[0].available = false;
        assert_eq!(tx.compute_hash(), hash);
    }

    #[test]
    fn assemble_stamps_relations() {
        let tx = sample_tx();
        assert_eq!(tx.outputs[0].tx_hash, tx.hash);
        assert_eq!(tx.outputs[1].ix, 1);
        assert_eq!(tx.inputs[0].tx_hash, tx.hash);
    }

    #[test]
    fn owners_derived_from_script() {
        let tx = sample_tx();
        assert!(tx.outputs[0].owner1.is_some());
        assert!(tx.outputs[0].owner2.is_none());
        assert!(tx.outputs[1].owner1.is_none());
    }

    #[test]
    fn coinbase_detection() {
        assert!(TxIn::coinbase(vec![1, 2]).is_coinbase());
        assert!(!TxIn::spending(Hash::new([1u8; 32]), 0, vec![]).is_coinbase());
    }
}
