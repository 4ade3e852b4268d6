// Transaction records - the immutable entries of a ledger's history

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Transfer,
    Bet,
    Winnings,
    Reward,
    /// Stake forfeited when a market resolves against the local vote
    Loss,
    /// Stake released back to the available balance
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Bet => "bet",
            TransactionKind::Winnings => "winnings",
            TransactionKind::Reward => "reward",
            TransactionKind::Loss => "loss",
            TransactionKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "transfer" => Ok(TransactionKind::Transfer),
            "bet" => Ok(TransactionKind::Bet),
            "winnings" => Ok(TransactionKind::Winnings),
            "reward" => Ok(TransactionKind::Reward),
            "loss" | "losses" => Ok(TransactionKind::Loss),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Settlement state of an entry. Records that omit it were applied in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Confirmed,
}

/// A single ledger entry. Negative amounts are outflows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub timestamp: u64,
    pub description: String,
    #[serde(default, alias = "toAddress", skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(default, alias = "predictionId", skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl Transaction {
    /// Start a confirmed entry with a fresh id
    pub fn new(kind: TransactionKind, amount: i64, description: impl Into<String>, now: u64) -> Self {
        Self {
            id: crate::ids::transaction_id(),
            kind,
            amount,
            timestamp: now,
            description: description.into(),
            counterparty: None,
            market_id: None,
            choice: None,
            fee: None,
            status: TransactionStatus::Confirmed,
            tx_hash: None,
        }
    }

    pub fn with_counterparty(mut self, address: &str) -> Self {
        self.counterparty = Some(address.to_string());
        self
    }

    pub fn with_market(mut self, market_id: &str) -> Self {
        self.market_id = Some(market_id.to_string());
        self
    }

    pub fn with_choice(mut self, choice: &str) -> Self {
        self.choice = Some(choice.to_string());
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_tx_hash(mut self, hash: String) -> Self {
        self.tx_hash = Some(hash);
        self
    }

    /// True when this entry is a winnings credit for the given market
    pub fn is_winnings_for(&self, market_id: &str) -> bool {
        self.kind == TransactionKind::Winnings && self.market_id.as_deref() == Some(market_id)
    }
}
