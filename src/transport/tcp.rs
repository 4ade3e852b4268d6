// TCP Transport Implementation
// Length-prefixed frames over tokio TCP streams.
//
// Frame: 4-byte big-endian length followed by that many bytes of payload.
// Each connection gets a reader task feeding the shared event channel and a
// writer task draining a bounded per-peer queue.

use crate::transport::{Connection, PeerHandle, TransportError, TransportEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 for random)
    pub bind_port: u16,
    /// Maximum number of simultaneous connections
    pub max_connections: usize,
    /// Outbound connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Largest accepted frame
    pub max_frame_bytes: usize,
    /// Frames buffered per peer before sends fail
    pub send_queue: usize,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            max_connections: 64,
            connect_timeout_secs: 10,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            send_queue: 256,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }
}

// ============================================================================
// FRAMING
// ============================================================================

/// Prefix a payload with its big-endian length
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

async fn read_frame(
    reader: &mut OwnedReadHalf,
    max_frame_bytes: usize,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: max_frame_bytes,
        });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

struct PeerLink {
    address: SocketAddr,
    writer: mpsc::Sender<Vec<u8>>,
}

type LinkTable = Arc<Mutex<HashMap<PeerHandle, PeerLink>>>;

/// TCP transport. Inbound events arrive on the receiver returned by `bind`.
pub struct TcpTransport {
    config: TcpTransportConfig,
    local_address: SocketAddr,
    links: LinkTable,
    event_tx: mpsc::Sender<TransportEvent>,
    listener_handle: JoinHandle<()>,
}

impl TcpTransport {
    /// Bind the listener and start accepting peers
    pub async fn bind(
        config: TcpTransportConfig,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(1024);
        let bind_addr = format!("{}:{}", config.bind_address, config.bind_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let local_address = listener.local_addr()?;

        let links: LinkTable = Arc::new(Mutex::new(HashMap::new()));
        let listener_handle = {
            let links = links.clone();
            let event_tx = event_tx.clone();
            let config = config.clone();
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            if let Err(e) =
                                attach(stream, addr, false, &config, &links, &event_tx).await
                            {
                                warn!(%addr, error = %e, "rejected inbound peer");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "listener stopped");
                            break;
                        }
                    }
                }
            })
        };

        debug!(%local_address, "tcp transport listening");
        Ok((
            Self {
                config,
                local_address,
                links,
                event_tx,
                listener_handle,
            },
            event_rx,
        ))
    }

    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    /// Dial a peer at `host:port`
    pub async fn connect(&self, address: &str) -> Result<PeerHandle, TransportError> {
        let addr: SocketAddr = tokio::net::lookup_host(address)
            .await
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))?;

        let stream = timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        attach(stream, addr, true, &self.config, &self.links, &self.event_tx).await
    }

    /// Drop a peer's link; its tasks wind down when the socket closes
    pub fn disconnect(&self, peer: &PeerHandle) -> Result<(), TransportError> {
        let mut links = self.links.lock().map_err(|_| poisoned())?;
        links.remove(peer).map(|_| ()).ok_or(TransportError::NotConnected)
    }

    /// Remote address of a connected peer
    pub fn peer_address(&self, peer: &PeerHandle) -> Option<SocketAddr> {
        self.links.lock().ok()?.get(peer).map(|l| l.address)
    }

    /// Stop accepting and drop every link
    pub fn shutdown(&self) {
        self.listener_handle.abort();
        if let Ok(mut links) = self.links.lock() {
            links.clear();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.listener_handle.abort();
    }
}

impl Connection for TcpTransport {
    fn send(&self, peer: &PeerHandle, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > self.config.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                limit: self.config.max_frame_bytes,
            });
        }
        let links = self.links.lock().map_err(|_| poisoned())?;
        let link = links.get(peer).ok_or(TransportError::NotConnected)?;
        link.writer
            .try_send(encode_frame(data))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn broadcast(&self, data: &[u8]) -> usize {
        let peers: Vec<PeerHandle> = match self.links.lock() {
            Ok(links) => links.keys().copied().collect(),
            Err(_) => return 0,
        };
        peers
            .iter()
            .filter(|peer| match self.send(peer, data) {
                Ok(()) => true,
                Err(e) => {
                    debug!(%peer, error = %e, "broadcast skipped peer");
                    false
                }
            })
            .count()
    }

    fn peer_count(&self) -> usize {
        self.links.lock().map(|l| l.len()).unwrap_or(0)
    }
}

fn poisoned() -> TransportError {
    TransportError::IoError("link table lock poisoned".into())
}

/// Register a stream and spawn its reader and writer tasks
async fn attach(
    stream: TcpStream,
    address: SocketAddr,
    outbound: bool,
    config: &TcpTransportConfig,
    links: &LinkTable,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<PeerHandle, TransportError> {
    stream.set_nodelay(config.nodelay).ok();
    let peer = PeerHandle::generate();
    let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(config.send_queue);

    {
        let mut table = links.lock().map_err(|_| poisoned())?;
        if table.len() >= config.max_connections {
            return Err(TransportError::MaxConnectionsReached);
        }
        table.insert(
            peer,
            PeerLink {
                address,
                writer: write_tx,
            },
        );
    }

    // Connected must be queued before the reader can emit the peer's first frame
    let _ = event_tx
        .send(TransportEvent::Connected {
            peer,
            address: address.to_string(),
            outbound,
        })
        .await;

    let (reader, writer) = stream.into_split();
    tokio::spawn(write_loop(writer, write_rx));
    tokio::spawn(read_loop(
        peer,
        reader,
        config.max_frame_bytes,
        links.clone(),
        event_tx.clone(),
    ));
    Ok(peer)
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    peer: PeerHandle,
    mut reader: OwnedReadHalf,
    max_frame_bytes: usize,
    links: LinkTable,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let reason = loop {
        match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(data)) => {
                if event_tx
                    .send(TransportEvent::Message { peer, data })
                    .await
                    .is_err()
                {
                    break "node stopped".to_string();
                }
            }
            Ok(None) => break "connection closed".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    if let Ok(mut table) = links.lock() {
        table.remove(&peer);
    }
    let _ = event_tx
        .send(TransportEvent::Disconnected { peer, reason })
        .await;
}
