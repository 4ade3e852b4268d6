// In-memory connection
// Records every outbound frame instead of writing to a socket

use crate::transport::{Connection, PeerHandle, TransportError};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Where a recorded frame was addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Direct(PeerHandle, Vec<u8>),
    Broadcast(Vec<u8>),
}

impl Outbound {
    pub fn data(&self) -> &[u8] {
        match self {
            Outbound::Direct(_, data) | Outbound::Broadcast(data) => data,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryConnection {
    peers: Mutex<BTreeSet<PeerHandle>>,
    sent: Mutex<Vec<Outbound>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a peer as connected
    pub fn add_peer(&self, peer: PeerHandle) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.insert(peer);
        }
    }

    pub fn remove_peer(&self, peer: &PeerHandle) {
        if let Ok(mut peers) = self.peers.lock() {
            peers.remove(peer);
        }
    }

    /// Drain everything sent so far
    pub fn take_sent(&self) -> Vec<Outbound> {
        self.sent
            .lock()
            .map(|mut sent| std::mem::take(&mut *sent))
            .unwrap_or_default()
    }

    /// Drain and keep only broadcast payloads
    pub fn take_broadcasts(&self) -> Vec<Vec<u8>> {
        self.take_sent()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Broadcast(data) => Some(data),
                Outbound::Direct(..) => None,
            })
            .collect()
    }
}

impl Connection for MemoryConnection {
    fn send(&self, peer: &PeerHandle, data: &[u8]) -> Result<(), TransportError> {
        let known = self
            .peers
            .lock()
            .map(|p| p.contains(peer))
            .unwrap_or(false);
        if !known {
            return Err(TransportError::NotConnected);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Outbound::Direct(*peer, data.to_vec()));
        }
        Ok(())
    }

    fn broadcast(&self, data: &[u8]) -> usize {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Outbound::Broadcast(data.to_vec()));
        }
        self.peer_count()
    }

    fn peer_count(&self) -> usize {
        self.peers.lock().map(|p| p.len()).unwrap_or(0)
    }
}
