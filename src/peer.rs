//! Peer directory: records pulled from the rendezvous service.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// One directory entry. `id` is the peer's random numeric id, used only for
/// the connector/listener tie-break; a registry that does not echo ids
/// yields 0 here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub address: Ipv4Addr,
    pub port: u16,
    pub id: u64,
}

impl PeerRecord {
    pub fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

/// Name-keyed peer map. Single writer (the directory-sync loop); entries are
/// added or overwritten, never removed.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    /// Last-write-wins merge of a directory snapshot, skipping the local
    /// name. Applying the same snapshot twice is idempotent.
    pub fn merge(&mut self, records: impl IntoIterator<Item = PeerRecord>, self_name: &str) {
        for record in records {
            if record.name == self_name {
                continue;
            }
            if !self.peers.contains_key(&record.name) {
                log::info!(
                    "new peer {} at {}:{}",
                    record.name,
                    record.address,
                    record.port
                );
            }
            self.peers.insert(record.name.clone(), record);
        }
    }

    pub fn get(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.get(name)
    }

    /// Reverse lookup by last-known endpoint, used to attribute inbound UDP
    /// datagrams to a peer.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&PeerRecord> {
        match addr {
            SocketAddr::V4(v4) => self.peers.values().find(|peer| peer.endpoint() == v4),
            SocketAddr::V6(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(name: &str, port: u16, id: u64) -> PeerRecord {
        PeerRecord {
            name: name.to_string(),
            address: Ipv4Addr::new(1, 2, 3, 4),
            port,
            id,
        }
    }

    #[test]
    fn merge_skips_self_and_is_idempotent() {
        let mut table = PeerTable::default();
        let snapshot = vec![record("a", 1000, 1), record("b", 2000, 2)];
        table.merge(snapshot.clone(), "a");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("b"), Some(&record("b", 2000, 2)));

        table.merge(snapshot, "a");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("b"), Some(&record("b", 2000, 2)));
    }

    #[test]
    fn merge_overwrites_last_write_wins() {
        let mut table = PeerTable::default();
        table.merge(vec![record("b", 2000, 2)], "a");
        table.merge(vec![record("b", 2001, 2)], "a");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("b").unwrap().port, 2001);
    }

    #[test]
    fn find_by_addr() {
        let mut table = PeerTable::default();
        table.merge(vec![record("b", 2000, 2)], "a");
        let hit: SocketAddr = "1.2.3.4:2000".parse().unwrap();
        let miss: SocketAddr = "1.2.3.4:2001".parse().unwrap();
        assert_eq!(table.find_by_addr(hit).map(|p| p.name.as_str()), Some("b"));
        assert!(table.find_by_addr(miss).is_none());
    }
}
