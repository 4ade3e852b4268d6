// Node module - THE REPLICA
// Composes wallet, registry and merge engine; runs the event loop

mod runtime;
mod service;
mod views;

pub use runtime::run;
pub use service::{NewMarket, Node, NodeError, Resolution};
pub use views::{MarketFilter, MarketView, NodeStatus, DEFAULT_HISTORY_LIMIT};
