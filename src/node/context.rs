//! Shared node state. All fields sit behind `Arc`s so the context clones
//! cheaply into the maintain loops; the peer table has a single writer (the
//! directory-sync loop) and the phase a single writer (the runner).

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::atomic::AtomicCell;
use parking_lot::RwLock;

use crate::error::StateError;
use crate::peer::{PeerRecord, PeerTable};
use crate::state::ConnectionPhase;

#[derive(Clone)]
pub struct NodeContext {
    name: Arc<String>,
    friend: Option<Arc<String>>,
    node_id: u64,
    public_endpoint: Arc<RwLock<Option<SocketAddrV4>>>,
    peers: Arc<RwLock<PeerTable>>,
    seq: Arc<AtomicU64>,
    phase: Arc<AtomicCell<ConnectionPhase>>,
}

impl NodeContext {
    pub(crate) fn new(name: String, friend: Option<String>, node_id: u64) -> Self {
        Self {
            name: Arc::new(name),
            friend: friend.map(Arc::new),
            node_id,
            public_endpoint: Arc::new(RwLock::new(None)),
            peers: Arc::new(RwLock::new(PeerTable::default())),
            seq: Arc::new(AtomicU64::new(1)),
            phase: Arc::new(AtomicCell::new(ConnectionPhase::Init)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn friend(&self) -> Option<&str> {
        self.friend.as_deref().map(String::as_str)
    }

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase.load()
    }

    /// Forward-only phase setter; only the runner calls this. Re-setting
    /// the current phase is a no-op and reports `Ok(false)`.
    pub(crate) fn set_phase(&self, next: ConnectionPhase) -> Result<bool, StateError> {
        let current = self.phase.load();
        if next == current {
            return Ok(false);
        }
        if next.rank() < current.rank() {
            return Err(StateError::BackwardPhase {
                current,
                requested: next,
            });
        }
        log::info!("{}: phase {current} -> {next}", self.name);
        self.phase.store(next);
        Ok(true)
    }

    pub fn public_endpoint(&self) -> Option<SocketAddrV4> {
        *self.public_endpoint.read()
    }

    /// Records a newly decoded public endpoint. Returns true only when the
    /// value differs from the current one; each true return is worth
    /// exactly one registry upsert.
    pub(crate) fn update_public_endpoint(&self, endpoint: SocketAddrV4) -> bool {
        let mut guard = self.public_endpoint.write();
        if *guard == Some(endpoint) {
            return false;
        }
        log::info!("{}: public endpoint is now {endpoint}", self.name);
        guard.replace(endpoint);
        true
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn merge_peers(&self, records: Vec<PeerRecord>) {
        self.peers.write().merge(records, &self.name);
    }

    pub fn peer(&self, name: &str) -> Option<PeerRecord> {
        self.peers.read().get(name).cloned()
    }

    pub(crate) fn peer_by_addr(&self, addr: SocketAddr) -> Option<PeerRecord> {
        self.peers.read().find_by_addr(addr).cloned()
    }

    pub(crate) fn peer_endpoints(&self) -> Vec<(String, SocketAddrV4)> {
        self.peers
            .read()
            .iter()
            .map(|peer| (peer.name.clone(), peer.endpoint()))
            .collect()
    }

    /// The designated peer's directory record, if both are known.
    pub fn friend_record(&self) -> Option<PeerRecord> {
        self.friend().and_then(|name| self.peer(name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn context() -> NodeContext {
        NodeContext::new("a".to_string(), Some("b".to_string()), 100)
    }

    #[test]
    fn phase_moves_forward_only() {
        let ctx = context();
        assert!(ctx.set_phase(ConnectionPhase::DiscoveringAddress).unwrap());
        assert!(ctx.set_phase(ConnectionPhase::AddressDiscovered).unwrap());
        // re-setting the current phase is a no-op, not an error
        assert!(!ctx.set_phase(ConnectionPhase::AddressDiscovered).unwrap());
        assert!(matches!(
            ctx.set_phase(ConnectionPhase::DiscoveringAddress),
            Err(StateError::BackwardPhase { .. })
        ));
        assert_eq!(ctx.phase(), ConnectionPhase::AddressDiscovered);
    }

    #[test]
    fn endpoint_updates_deduplicate() {
        let ctx = context();
        let first = SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 1000);
        let second = SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 1001);
        assert!(ctx.update_public_endpoint(first));
        assert!(!ctx.update_public_endpoint(first));
        assert!(ctx.update_public_endpoint(second));
        assert!(!ctx.update_public_endpoint(second));
        assert_eq!(ctx.public_endpoint(), Some(second));
    }

    #[test]
    fn sequence_is_monotonic() {
        let ctx = context();
        let a = ctx.next_seq();
        let b = ctx.next_seq();
        assert!(b > a);
    }
}
