// Read-only views over a node for presentation layers

use crate::market::{Market, MarketStats, Settlement, Vote};
use crate::node::service::Node;
use crate::storage::KvStore;
use crate::sync::{MergeStats, PeerStats};
use crate::transport::Connection;
use crate::wallet::{LedgerInfo, Transaction, TransactionKind};
use serde::Serialize;
use std::str::FromStr;

/// Default page size for transaction history
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MarketFilter {
    #[default]
    All,
    /// Not yet resolved
    Active,
    Resolved,
    /// Markets this node holds a vote in
    Voted,
}

impl FromStr for MarketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "all" => Ok(MarketFilter::All),
            "active" => Ok(MarketFilter::Active),
            "resolved" => Ok(MarketFilter::Resolved),
            "voted" => Ok(MarketFilter::Voted),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    pub market: Market,
    pub stats: MarketStats,
    pub my_vote: Option<Vote>,
    pub settlement: Option<Settlement>,
    pub my_payout: Option<u64>,
    pub claimed: bool,
}

#[derive(Clone, Debug)]
pub struct NodeStatus {
    pub wallet: LedgerInfo,
    pub markets: usize,
    pub active_markets: usize,
    pub resolved_markets: usize,
    pub peers: PeerStats,
    pub merge: MergeStats,
    pub connections: usize,
}

impl<S: KvStore, C: Connection> Node<S, C> {
    pub fn wallet_info(&self) -> LedgerInfo {
        self.ledger.info()
    }

    /// Newest-first history, optionally restricted to one kind
    pub fn transactions(&self, limit: usize, kind: Option<TransactionKind>) -> Vec<Transaction> {
        self.ledger
            .transactions(limit, kind)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Markets matching `filter`, newest first
    pub fn list_markets(&self, filter: MarketFilter) -> Vec<&Market> {
        let me = self.ledger.address();
        let mut markets: Vec<&Market> = self
            .registry
            .iter()
            .filter(|m| match filter {
                MarketFilter::All => true,
                MarketFilter::Active => !m.is_resolved(),
                MarketFilter::Resolved => m.is_resolved(),
                MarketFilter::Voted => m.vote_of(me).is_some(),
            })
            .collect();
        markets.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        markets
    }

    pub fn market_view(&self, market_id: &str) -> Option<MarketView> {
        let market = self.registry.get(market_id)?;
        let me = self.ledger.address();
        let settlement = market.settlement().ok();
        let my_payout = settlement.as_ref().and_then(|s| s.payout_for(me));

        Some(MarketView {
            market: market.clone(),
            stats: market.stats(),
            my_vote: market.vote_of(me).cloned(),
            settlement,
            my_payout,
            claimed: self.ledger.has_claimed(market_id),
        })
    }

    pub fn status(&self) -> NodeStatus {
        let resolved = self.registry.iter().filter(|m| m.is_resolved()).count();
        NodeStatus {
            wallet: self.ledger.info(),
            markets: self.registry.len(),
            active_markets: self.registry.len() - resolved,
            resolved_markets: resolved,
            peers: self.peers.stats(),
            merge: self.engine.stats().clone(),
            connections: self.connection.peer_count(),
        }
    }
}
