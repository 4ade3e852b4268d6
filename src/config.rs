// Node configuration
//
// Defaults, overridden by environment (`PEERPREDICT_*`), overridden by
// command-line flags in the binary.

use crate::market::DEFAULT_MARKET_DURATION_MS;
use crate::transport::{TcpTransportConfig, DEFAULT_MAX_FRAME_BYTES};
use crate::wallet::DEFAULT_WELCOME_BONUS;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_HOME: &str = "PEERPREDICT_HOME";
pub const ENV_PORT: &str = "PEERPREDICT_PORT";
pub const ENV_BIND: &str = "PEERPREDICT_BIND";
pub const ENV_PEERS: &str = "PEERPREDICT_PEERS";
pub const DEFAULT_PORT: u16 = 7878;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Wallet file and market database live here
    pub data_dir: PathBuf,
    pub bind_address: String,
    pub port: u16,
    /// Peers dialled at startup, as `host:port`
    pub bootstrap_peers: Vec<String>,
    /// Credit given to a freshly generated wallet
    pub welcome_bonus: u64,
    /// Deadline offset for markets created without one
    pub market_duration_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            bootstrap_peers: Vec::new(),
            welcome_bonus: DEFAULT_WELCOME_BONUS,
            market_duration_ms: DEFAULT_MARKET_DURATION_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

fn default_data_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".peerpredict")
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `PEERPREDICT_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(home) = env::var(ENV_HOME) {
            config.data_dir = PathBuf::from(home);
        }
        if let Ok(port) = env::var(ENV_PORT) {
            config.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        if let Ok(bind) = env::var(ENV_BIND) {
            config.bind_address = bind;
        }
        if let Ok(peers) = env::var(ENV_PEERS) {
            config.bootstrap_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bootstrap_peer(mut self, peer: &str) -> Self {
        self.bootstrap_peers.push(peer.to_string());
        self
    }

    pub fn with_welcome_bonus(mut self, bonus: u64) -> Self {
        self.welcome_bonus = bonus;
        self
    }

    pub fn with_market_duration_ms(mut self, ms: u64) -> Self {
        self.market_duration_ms = ms;
        self
    }

    /// sled database directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("markets")
    }

    pub fn transport_config(&self) -> TcpTransportConfig {
        TcpTransportConfig::new()
            .with_bind_address(&self.bind_address)
            .with_bind_port(self.port)
            .with_max_frame_bytes(self.max_frame_bytes)
    }
}
