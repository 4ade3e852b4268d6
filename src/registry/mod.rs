// Registry module - WHERE MARKETS LIVE
// Handles the market map, its persistence and snapshot merging

mod markets;

pub use markets::{market_key, MarketRegistry, RegistryError, MARKET_KEY_PREFIX};
