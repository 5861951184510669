//! Stored peer records and the discovery view.

use crate::{ChainStore, StateError, StateResult};
use btc_model::KnownPeer;
use btc_storage::KeyTag;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ChainStore {
    /// Store or update an observed peer record.
    pub fn store_peer(&self, peer: &KnownPeer) -> StateResult<()> {
        let _state = self.write_guard()?;
        self.records.write_peer(peer)
    }

    /// Look up one peer by address.
    pub fn find_peer(&self, address: &str) -> StateResult<Option<KnownPeer>> {
        let _state = self.state.read();
        match self.records.read_peer(address) {
            Err(StateError::Codec(e)) => {
                warn!(address, error = %e, "undecodable peer record treated as missing");
                Ok(None)
            }
            other => other,
        }
    }

    /// Peers whose ban window has passed, ordered by preference and then
    /// response time, ascending.
    pub fn get_connectable_peers(&self) -> StateResult<Vec<KnownPeer>> {
        let _state = self.state.read();
        let now = unix_now();
        let mut peers = Vec::new();
        for (_, data) in self.store.scan(KeyTag::Peer)? {
            match KnownPeer::decode(&data) {
                Ok(peer) => {
                    if peer.is_connectable(now) {
                        peers.push(peer);
                    }
                }
                Err(e) => warn!(error = %e, "skipping undecodable peer record"),
            }
        }
        peers.sort_by(|a, b| {
            a.preference
                .cmp(&b.preference)
                .then_with(|| a.response_time.cmp(&b.response_time))
        });
        Ok(peers)
    }

    /// Addresses of candidate peers for a fresh connection round.
    pub fn discover(&self) -> StateResult<Vec<String>> {
        Ok(self
            .get_connectable_peers()?
            .into_iter()
            .map(|peer| peer.address)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::engine;

    #[test]
    fn store_and_find() {
        let (engine, _tmp) = engine();
        let mut peer = KnownPeer::new("198.51.100.4:8333");
        peer.response_time = 120;
        engine.store_peer(&peer).unwrap();

        assert_eq!(engine.find_peer(&peer.address).unwrap().unwrap(), peer);
        assert!(engine.find_peer("203.0.113.1:8333").unwrap().is_none());

        // Updating a record overwrites it in place.
        peer.response_time = 80;
        engine.store_peer(&peer).unwrap();
        assert_eq!(
            engine.find_peer(&peer.address).unwrap().unwrap().response_time,
            80
        );
    }

    #[test]
    fn connectable_excludes_banned_and_sorts() {
        let (engine, _tmp) = engine();

        let mut banned = KnownPeer::new("198.51.100.1:8333");
        banned.banned_until = unix_now() + 3600;
        engine.store_peer(&banned).unwrap();

        let mut slow = KnownPeer::new("198.51.100.2:8333");
        slow.response_time = 900;
        engine.store_peer(&slow).unwrap();

        let mut fast = KnownPeer::new("198.51.100.3:8333");
        fast.response_time = 10;
        engine.store_peer(&fast).unwrap();

        let mut preferred = KnownPeer::new("198.51.100.4:8333");
        preferred.preference = -1;
        preferred.response_time = 500;
        engine.store_peer(&preferred).unwrap();

        let peers = engine.get_connectable_peers().unwrap();
        let addresses: Vec<_> = peers.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec![
                "198.51.100.4:8333",
                "198.51.100.3:8333",
                "198.51.100.2:8333"
            ]
        );

        assert_eq!(engine.discover().unwrap(), addresses);
    }
}
