//! # btc-model
//!
//! Block-chain entities and their deterministic wire codec.
//!
//! Every entity round-trips through its stored form:
//! `decode(encode(x)) == x`. Public fields follow the little-endian wire
//! conventions; the engine's internal fields (height, assigned head,
//! availability, derived owners) are appended after them in a fixed order.
//! The codec is stateless and is the only place bytes become entities.

mod block;
mod error;
mod hash;
mod head;
mod peer;
pub mod script;
mod tx;
pub mod wire;

pub use block::Blk;
pub use error::{CodecError, CodecResult};
pub use hash::{Hash, HASH_LENGTH};
pub use head::Head;
pub use peer::KnownPeer;
pub use tx::{Tx, TxIn, TxOut};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_hash() -> impl Strategy<Value = Hash> {
        prop::array::uniform32(any::<u8>()).prop_map(Hash::new)
    }

    fn arb_owner() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[1-9A-HJ-NP-Za-km-z]{25,34}")
    }

    fn arb_txout(ix: u32) -> impl Strategy<Value = TxOut> {
        (
            any::<u64>(),
            prop::collection::vec(any::<u8>(), 0..64),
            arb_owner(),
            arb_owner(),
            arb_owner(),
            any::<bool>(),
        )
            .prop_map(move |(value, script, owner1, owner2, owner3, available)| TxOut {
                tx_hash: Hash::ZERO,
                ix,
                value,
                script,
                owner1,
                owner2,
                owner3,
                available,
            })
    }

    fn arb_txin() -> impl Strategy<Value = TxIn> {
        (
            arb_hash(),
            any::<u32>(),
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..64),
        )
            .prop_map(|(source_hash, source_ix, sequence, script)| TxIn {
                tx_hash: Hash::ZERO,
                source_hash,
                source_ix,
                sequence,
                script,
            })
    }

    fn arb_tx() -> impl Strategy<Value = Tx> {
        (
            any::<u32>(),
            any::<u32>(),
            prop::collection::vec(arb_txin(), 0..4),
            prop::collection::vec(arb_txout(0), 0..4),
            arb_hash(),
        )
            .prop_map(|(version, lock_time, inputs, mut outputs, block_hash)| {
                for (ix, out) in outputs.iter_mut().enumerate() {
                    out.ix = ix as u32;
                }
                let mut tx = Tx::assemble(version, lock_time, inputs, outputs);
                tx.block_hash = block_hash;
                tx
            })
    }

    proptest! {
        #[test]
        fn tx_round_trip(tx in arb_tx()) {
            prop_assert_eq!(Tx::decode(&tx.encode()).unwrap(), tx);
        }

        #[test]
        fn blk_round_trip(
            version in any::<u32>(),
            previous in arb_hash(),
            merkle in arb_hash(),
            time in any::<u32>(),
            bits in any::<u32>(),
            nonce in any::<u32>(),
            height in any::<u32>(),
            head_id in any::<u64>(),
            tx_hashes in prop::collection::vec(arb_hash(), 0..8),
        ) {
            let mut blk = Blk::assemble(version, previous, merkle, time, bits, nonce, Vec::new());
            blk.height = height;
            blk.head_id = head_id;
            blk.tx_hashes = tx_hashes;
            prop_assert_eq!(Blk::decode(&blk.encode()).unwrap(), blk);
        }

        #[test]
        fn head_round_trip(
            id in any::<u64>(),
            work in prop::collection::vec(any::<u8>(), 0..40),
            height in any::<u32>(),
            previous in prop::option::of(any::<u64>()),
        ) {
            let head = Head {
                id,
                chain_work: num_bigint::BigUint::from_bytes_be(&work),
                height,
                previous,
            };
            prop_assert_eq!(Head::decode(&head.encode()).unwrap(), head);
        }

        #[test]
        fn peer_round_trip(
            address in "[ -~]{1,64}",
            banned_until in any::<u64>(),
            preference in any::<i64>(),
            response_time in any::<u64>(),
        ) {
            let peer = KnownPeer { address, banned_until, preference, response_time };
            prop_assert_eq!(KnownPeer::decode(&peer.encode()).unwrap(), peer);
        }
    }
}
