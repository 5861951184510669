//! Known peer records.

use crate::wire::{Reader, Writer};
use crate::CodecResult;

/// An observed network peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPeer {
    /// Network address string; the record's key.
    pub address: String,
    /// Unix seconds until which the peer is banned; 0 when not banned.
    pub banned_until: u64,
    /// Preference score; lower connects first.
    pub preference: i64,
    /// Last observed response time in milliseconds.
    pub response_time: u64,
}

impl KnownPeer {
    /// A fresh, unbanned record for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            banned_until: 0,
            preference: 0,
            response_time: 0,
        }
    }

    /// True if the ban window has passed as of `now` (unix seconds).
    pub fn is_connectable(&self, now: u64) -> bool {
        self.banned_until < now
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_var_string(&self.address);
        w.write_u64(self.banned_until);
        w.write_i64(self.preference);
        w.write_u64(self.response_time);
        w.into_bytes()
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = Reader::new(data);
        let address = r.read_var_string()?;
        let banned_until = r.read_u64()?;
        let preference = r.read_i64()?;
        let response_time = r.read_u64()?;
        r.finish()?;
        Ok(Self {
            address,
            banned_until,
            preference,
            response_time,
        })
    }
}
