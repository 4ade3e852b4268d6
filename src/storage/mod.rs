// Storage module - PERSISTENCE
// Handles the durable ordered key-value map (sled on disk, BTreeMap in memory)

mod store;

pub use store::{KvStore, MemoryStore, SledStore, StorageStats, StoreError};
