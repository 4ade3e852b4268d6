// Peer Management - connected peers and their sync bookkeeping

use crate::transport::PeerHandle;
use std::collections::HashMap;

/// State of a peer connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    /// Connected, snapshot not yet sent
    Connected,
    /// Our snapshot was delivered
    Synced,
}

/// Statistics about a peer registry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub connected_peers: usize,
    pub synced_peers: usize,
    pub messages_received: u64,
}

/// Information about a connected peer
#[derive(Clone, Debug)]
pub struct PeerInfo {
    handle: PeerHandle,
    address: String,
    state: PeerState,
    connected_at: u64,
    /// Last time we heard from this peer (unix timestamp ms)
    last_seen: u64,
    messages_received: u64,
}

impl PeerInfo {
    /// Create peer info for a fresh connection
    pub fn new(handle: PeerHandle, address: &str, now: u64) -> Self {
        Self {
            handle,
            address: address.to_string(),
            state: PeerState::Connected,
            connected_at: now,
            last_seen: now,
            messages_received: 0,
        }
    }

    /// Get the transport handle
    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    /// Get the remote address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the sync state
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Get when the peer connected
    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    /// Get when the peer last sent a message
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Get the number of messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Record an inbound message
    pub fn touch(&mut self, now: u64) {
        self.last_seen = now;
        self.messages_received += 1;
    }
}

/// Registry of live peers, keyed by transport handle
#[derive(Clone, Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerHandle, PeerInfo>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no peers are tracked
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Get the number of tracked peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Check if a peer is tracked
    pub fn has_peer(&self, handle: &PeerHandle) -> bool {
        self.peers.contains_key(handle)
    }

    /// Add a peer, replacing any stale entry with the same handle
    pub fn add_peer(&mut self, handle: PeerHandle, address: &str, now: u64) {
        self.peers.insert(handle, PeerInfo::new(handle, address, now));
    }

    /// Remove a peer, returning its info
    pub fn remove_peer(&mut self, handle: &PeerHandle) -> Option<PeerInfo> {
        self.peers.remove(handle)
    }

    /// Get info for a peer
    pub fn get_peer(&self, handle: &PeerHandle) -> Option<&PeerInfo> {
        self.peers.get(handle)
    }

    /// Note traffic from a peer; unknown handles are registered on the fly
    pub fn touch(&mut self, handle: &PeerHandle, now: u64) {
        self.peers
            .entry(*handle)
            .or_insert_with(|| PeerInfo::new(*handle, "unknown", now))
            .touch(now);
    }

    /// Mark a peer as having received our snapshot
    pub fn mark_synced(&mut self, handle: &PeerHandle) {
        if let Some(peer) = self.peers.get_mut(handle) {
            peer.state = PeerState::Synced;
        }
    }

    /// Get all tracked peers
    pub fn all_peers(&self) -> Vec<&PeerInfo> {
        self.peers.values().collect()
    }

    /// Get peer statistics
    pub fn stats(&self) -> PeerStats {
        PeerStats {
            connected_peers: self.peers.len(),
            synced_peers: self
                .peers
                .values()
                .filter(|p| p.state == PeerState::Synced)
                .count(),
            messages_received: self.peers.values().map(|p| p.messages_received).sum(),
        }
    }
}
