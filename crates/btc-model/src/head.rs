//! Chain heads.

use crate::wire::{Reader, Writer};
use crate::CodecResult;
use num_bigint::BigUint;

/// A chain head: the tip of one branch of the block tree.
///
/// Heads forked from an earlier head record it in `previous`; the first
/// head has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    /// Opaque 64-bit identifier, collision-free among stored heads.
    pub id: u64,
    /// Cumulative work along this branch.
    pub chain_work: BigUint,
    /// Height of the branch tip.
    pub height: u32,
    /// The head this one forked from, if any.
    pub previous: Option<u64>,
}

impl Head {
    /// Stored form: id, chain-work as a length-prefixed big-endian
    /// magnitude, height, then the optional previous-head id behind a
    /// presence flag.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u64(self.id);
        w.write_var_bytes(&self.chain_work.to_bytes_be());
        w.write_u32(self.height);
        match self.previous {
            Some(prev) => {
                w.write_u8(1);
                w.write_u64(prev);
            }
            None => w.write_u8(0),
        }
        w.into_bytes()
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        let id = r.read_u64()?;
        let chain_work = BigUint::from_bytes_be(&r.read_var_bytes()?);
        let height = r.read_u32()?;
        let previous = match r.read_u8()? {
            0 => None,
            _ => Some(r.read_u64()?),
        };
        r.finish()?;
        Ok(Self {
            id,
            chain_work,
            height,
            previous,
        })
    }
}
