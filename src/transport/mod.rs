// Transport module - THE WIRE
// Provides the connection collaborator: TCP for real peers, memory for tests

mod memory;
mod tcp;
mod traits;

pub use memory::{MemoryConnection, Outbound};
pub use tcp::{encode_frame, TcpTransport, TcpTransportConfig, DEFAULT_MAX_FRAME_BYTES};
pub use traits::{Connection, PeerHandle, TransportError, TransportEvent};
