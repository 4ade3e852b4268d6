// Transport Traits and Core Types
// The connection collaborator: opaque peer handles, inbound events and the
// fire-and-forget send surface the node writes through

use rand::RngCore;
use std::fmt;
use thiserror::Error;

// ============================================================================
// PEER HANDLE
// ============================================================================

/// Opaque identifier for one live peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle([u8; 16]);

impl PeerHandle {
    /// Generate a random handle
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Events delivered by a transport to the node's dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer connection was established
    Connected {
        peer: PeerHandle,
        address: String,
        outbound: bool,
    },
    /// A complete message frame arrived
    Message { peer: PeerHandle, data: Vec<u8> },
    /// A peer connection closed
    Disconnected { peer: PeerHandle, reason: String },
}

impl TransportEvent {
    pub fn peer(&self) -> &PeerHandle {
        match self {
            TransportEvent::Connected { peer, .. }
            | TransportEvent::Message { peer, .. }
            | TransportEvent::Disconnected { peer, .. } => peer,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Transport-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Not connected to peer")]
    NotConnected,

    #[error("Connection timed out")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    #[error("Frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::IoError(e.to_string())
    }
}

// ============================================================================
// CONNECTION TRAIT
// ============================================================================

/// Outbound side of the connection collaborator.
///
/// Sends never block the caller: a frame is queued for the peer's writer or
/// the call fails immediately.
pub trait Connection {
    /// Queue a frame for one peer
    fn send(&self, peer: &PeerHandle, data: &[u8]) -> Result<(), TransportError>;

    /// Queue a frame for every connected peer, returning how many accepted it
    fn broadcast(&self, data: &[u8]) -> usize;

    /// Number of live connections
    fn peer_count(&self) -> usize;
}
