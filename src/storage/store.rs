// Store - durable ordered map from string keys to JSON values
//
// `KvStore` is the seam the registry persists through. `SledStore` is the
// crash-safe on-disk implementation; `MemoryStore` backs tests and
// ephemeral nodes.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed for key {key}: {reason}")]
    DeserializationFailed { key: String, reason: String },

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of keys in the database
    pub key_count: usize,
    /// Approximate disk size in bytes (0 for in-memory stores)
    pub disk_size_bytes: u64,
}

/// Durable ordered map contract
pub trait KvStore {
    /// Insert or replace a value
    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Fetch a value
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// All entries whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Make previous writes durable
    fn flush(&self) -> Result<(), StoreError>;

    fn stats(&self) -> Result<StorageStats, StoreError>;
}

// ============================================================================
// SLED
// ============================================================================

/// On-disk store using sled. Writes are durable after flush.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn decode(key: &[u8], bytes: &[u8]) -> Result<(String, Value), StoreError> {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = serde_json::from_slice(bytes).map_err(|e| StoreError::DeserializationFailed {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        Ok((key, value))
    }
}

impl KvStore for SledStore {
    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.db.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(key.as_bytes(), &bytes)?.1)),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let mut entries = Vec::new();
        for result in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = result?;
            entries.push(Self::decode(&key, &value)?);
        }
        Ok(entries)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            key_count: self.db.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Volatile store with the same ordering guarantees
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::DatabaseError("memory store lock poisoned".into())
    }
}

impl KvStore for MemoryStore {
    fn put(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats, StoreError> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(StorageStats {
            key_count: entries.len(),
            disk_size_bytes: 0,
        })
    }
}
