// Market Registry - the owned map of markets and their durable backing
//
// Each mutation is applied to a copy, persisted under `prediction:<id>`, and
// only then committed to memory, so a storage failure leaves no trace.

use crate::market::{Market, MarketError, Settlement, Vote};
use crate::storage::{KvStore, StoreError};
use crate::sync::{MergeDecision, MergeOutcome, MergePolicy};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Key prefix for persisted markets
pub const MARKET_KEY_PREFIX: &str = "prediction:";

pub fn market_key(id: &str) -> String {
    format!("{}{}", MARKET_KEY_PREFIX, id)
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Market not found: {0}")]
    NotFound(String),

    #[error("Market already exists: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Market encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub struct MarketRegistry<S: KvStore> {
    store: S,
    markets: BTreeMap<String, Market>,
}

impl<S: KvStore> MarketRegistry<S> {
    /// Load every persisted market. Entries that fail to decode are skipped.
    pub fn open(store: S) -> Result<Self, RegistryError> {
        let mut markets = BTreeMap::new();
        for (key, value) in store.scan_prefix(MARKET_KEY_PREFIX)? {
            match serde_json::from_value::<Market>(value) {
                Ok(mut market) => {
                    if let Err(e) = market.normalize() {
                        warn!(%key, error = %e, "skipping invalid stored market");
                        continue;
                    }
                    markets.insert(market.id().to_string(), market);
                }
                Err(e) => warn!(%key, error = %e, "skipping undecodable stored market"),
            }
        }
        debug!(count = markets.len(), "market registry loaded");
        Ok(Self { store, markets })
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<&Market> {
        self.markets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Markets in id order
    pub fn iter(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// Owned copies of every market, for a sync message
    pub fn snapshot(&self) -> Vec<Market> {
        self.markets.values().cloned().collect()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // LOCAL OPERATIONS
    // ========================================================================

    /// Register a newly created market
    pub fn insert_new(&mut self, market: Market) -> Result<(), RegistryError> {
        if self.markets.contains_key(market.id()) {
            return Err(RegistryError::Duplicate(market.id().to_string()));
        }
        self.commit(market)
    }

    pub fn vote(
        &mut self,
        id: &str,
        voter: &str,
        choice: &str,
        stake: u64,
        now: u64,
    ) -> Result<Option<Vote>, RegistryError> {
        self.update(id, |m| m.add_vote(voter, choice, stake, now))
    }

    pub fn resolve(
        &mut self,
        id: &str,
        outcome: &str,
        resolver: &str,
        now: u64,
    ) -> Result<Settlement, RegistryError> {
        self.update(id, |m| m.resolve(outcome, resolver, now))
    }

    /// Apply a resolution decided by a peer
    pub fn apply_resolution(
        &mut self,
        id: &str,
        outcome: &str,
        resolver: &str,
        now: u64,
    ) -> Result<Settlement, RegistryError> {
        self.update(id, |m| m.apply_resolution(outcome, resolver, now))
    }

    pub fn verify(
        &mut self,
        id: &str,
        verifier: &str,
        outcome: &str,
        now: u64,
    ) -> Result<Option<Settlement>, RegistryError> {
        self.update(id, |m| m.submit_verification(verifier, outcome, now))
    }

    // ========================================================================
    // REMOTE SNAPSHOTS
    // ========================================================================

    /// Reconcile a remote snapshot using `policy`
    pub fn merge(
        &mut self,
        mut remote: Market,
        policy: &dyn MergePolicy,
    ) -> Result<MergeOutcome, RegistryError> {
        remote.normalize()?;
        let local = self.markets.get(remote.id());
        let existed = local.is_some();

        match policy.decide(local, &remote) {
            MergeDecision::KeepLocal => Ok(MergeOutcome::Discarded),
            MergeDecision::AdoptRemote => {
                self.commit(remote)?;
                Ok(if existed {
                    MergeOutcome::Replaced
                } else {
                    MergeOutcome::Added
                })
            }
        }
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn update<T>(
        &mut self,
        id: &str,
        op: impl FnOnce(&mut Market) -> Result<T, MarketError>,
    ) -> Result<T, RegistryError> {
        let mut market = self
            .markets
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let result = op(&mut market)?;
        self.commit(market)?;
        Ok(result)
    }

    fn commit(&mut self, market: Market) -> Result<(), RegistryError> {
        let value = serde_json::to_value(&market)?;
        self.store.put(&market_key(market.id()), &value)?;
        self.store.flush()?;
        self.markets.insert(market.id().to_string(), market);
        Ok(())
    }
}
