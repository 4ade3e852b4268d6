// peerpredict - peer-replicated prediction market
//
// A local ledger with stake locking, a market state machine with
// proportional payouts, and last-writer-wins replication of markets
// between peers.

pub mod cli;
pub mod clock;
pub mod config;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod market;
pub mod node;
pub mod registry;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod wallet;

pub use config::NodeConfig;
pub use node::{Node, NodeError};
