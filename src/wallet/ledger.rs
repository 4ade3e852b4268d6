// Ledger - the local account: balance, locked stake and transaction history
//
// Invariant after every operation: 0 <= locked <= balance.
// Every operation validates before mutating; a failed call leaves the
// ledger untouched.

use crate::identity::{validate_address, Keypair};
use crate::wallet::transaction::{Transaction, TransactionKind, TransactionStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Smallest accepted deposit and withdrawal
pub const MIN_DEPOSIT: u64 = 1;
/// Largest accepted single deposit
pub const MAX_DEPOSIT: u64 = 1_000_000;
/// Fee charged on winnings, in basis points (1%)
pub const WINNINGS_FEE_BPS: u64 = 100;
/// Number of history entries retained
pub const HISTORY_LIMIT: usize = 100;
/// Starting credit for a freshly generated wallet
pub const DEFAULT_WELCOME_BONUS: u64 = 1000;

/// Errors from ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: u64, reason: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Winnings already claimed for market {0}")]
    AlreadyClaimed(String),

    #[error("No open stake for market {0}")]
    NoOpenStake(String),

    #[error("Balance would overflow")]
    BalanceOverflow,
}

/// Fee withheld from a gross winnings amount (floor of 1%)
pub fn winnings_fee(gross: u64) -> u64 {
    ((gross as u128 * WINNINGS_FEE_BPS as u128) / 10_000) as u64
}

/// Summary returned to presentation layers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerInfo {
    pub address: String,
    pub balance: u64,
    pub locked: u64,
    pub available: u64,
    pub connected: bool,
    pub transaction_count: usize,
    pub created_at: u64,
}

/// The per-node account
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    address: String,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    balance: u64,
    #[serde(default, alias = "lockedBalance")]
    locked: u64,
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    connected: bool,
    /// Stake currently locked per market
    #[serde(default)]
    positions: BTreeMap<String, u64>,
    /// Markets whose winnings were credited
    #[serde(default)]
    claimed: BTreeSet<String>,
}

impl Ledger {
    /// Empty ledger bound to an address
    pub fn new(address: String, private_key: Option<String>, now: u64) -> Self {
        Self {
            address,
            private_key,
            balance: 0,
            locked: 0,
            transactions: Vec::new(),
            created_at: now,
            connected: false,
            positions: BTreeMap::new(),
            claimed: BTreeSet::new(),
        }
    }

    /// Fresh local wallet with a generated key and an optional welcome credit
    pub fn generate(welcome_bonus: u64, now: u64) -> Self {
        let keypair = Keypair::generate();
        let mut ledger = Self::new(keypair.address(), Some(keypair.secret_hex()), now);
        if welcome_bonus > 0 {
            ledger.balance = welcome_bonus;
            ledger.record(Transaction::new(
                TransactionKind::Reward,
                welcome_bonus as i64,
                format!("Welcome bonus - {} tokens", welcome_bonus),
                now,
            ));
        }
        ledger
    }

    /// Ledger for an externally managed wallet; no private key is held
    pub fn connect_external(address: &str, now: u64) -> Result<Self, LedgerError> {
        validate_address(address).map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;
        let mut ledger = Self::new(address.trim().to_string(), None, now);
        ledger.connected = true;
        Ok(ledger)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn locked(&self) -> u64 {
        self.locked
    }

    /// balance - locked
    pub fn available(&self) -> u64 {
        self.balance.saturating_sub(self.locked)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Full history, newest first
    pub fn history(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Up to `limit` newest entries, optionally of a single kind
    pub fn transactions(&self, limit: usize, kind: Option<TransactionKind>) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|tx| kind.map_or(true, |k| tx.kind == k))
            .take(limit)
            .collect()
    }

    /// Stake locked for a market by this ledger
    pub fn open_stake(&self, market_id: &str) -> u64 {
        self.positions.get(market_id).copied().unwrap_or(0)
    }

    /// Markets with a locked stake
    pub fn open_positions(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.positions.iter()
    }

    /// Whether winnings for a market were already credited
    pub fn has_claimed(&self, market_id: &str) -> bool {
        self.claimed.contains(market_id)
            || self.transactions.iter().any(|tx| tx.is_winnings_for(market_id))
    }

    pub fn info(&self) -> LedgerInfo {
        LedgerInfo {
            address: self.address.clone(),
            balance: self.balance,
            locked: self.locked,
            available: self.available(),
            connected: self.connected,
            transaction_count: self.transactions.len(),
            created_at: self.created_at,
        }
    }

    /// Verify 0 <= locked <= balance
    pub fn check_invariants(&self) -> bool {
        self.locked <= self.balance
    }

    // ========================================================================
    // FUNDS MOVEMENT
    // ========================================================================

    /// Credit an external deposit within [MIN_DEPOSIT, MAX_DEPOSIT]
    pub fn deposit(
        &mut self,
        amount: u64,
        tx_hash: Option<String>,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        if !(MIN_DEPOSIT..=MAX_DEPOSIT).contains(&amount) {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: format!("deposit must be between {} and {}", MIN_DEPOSIT, MAX_DEPOSIT),
            });
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;

        self.balance = balance;
        let tx = Transaction::new(
            TransactionKind::Deposit,
            amount as i64,
            format!("Deposit of {} tokens", amount),
            now,
        )
        .with_tx_hash(tx_hash.unwrap_or_else(crate::ids::deposit_reference));
        Ok(self.record(tx))
    }

    /// Debit towards an external address; settlement happens off-ledger
    pub fn withdraw(
        &mut self,
        amount: u64,
        destination: &str,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        validate_address(destination).map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;
        self.ensure_available(amount)?;
        if amount < MIN_DEPOSIT {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: format!("minimum withdrawal is {}", MIN_DEPOSIT),
            });
        }

        self.balance -= amount;
        let tx = Transaction::new(
            TransactionKind::Withdraw,
            -(amount as i64),
            format!("Withdrawal to {}", destination),
            now,
        )
        .with_counterparty(destination)
        .with_status(TransactionStatus::Pending);
        Ok(self.record(tx))
    }

    /// Local book-entry debit; the recipient node is not credited here
    pub fn transfer(
        &mut self,
        amount: u64,
        destination: &str,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        validate_address(destination).map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "transfer must be positive".into(),
            });
        }
        self.ensure_available(amount)?;

        self.balance -= amount;
        let tx = Transaction::new(
            TransactionKind::Transfer,
            -(amount as i64),
            format!("Transfer to {}", destination),
            now,
        )
        .with_counterparty(destination);
        Ok(self.record(tx))
    }

    // ========================================================================
    // LOCKING
    // ========================================================================

    /// Move funds from available to locked
    pub fn lock(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.ensure_available(amount)?;
        self.locked += amount;
        Ok(())
    }

    /// Release locked funds, clamping at zero
    pub fn unlock(&mut self, amount: u64) {
        self.locked = self.locked.saturating_sub(amount);
    }

    /// Lock a stake for a market and record the bet
    pub fn deduct_bet(
        &mut self,
        amount: u64,
        market_id: &str,
        choice: &str,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount,
                reason: "stake must be positive".into(),
            });
        }
        self.lock(amount)?;
        *self.positions.entry(market_id.to_string()).or_insert(0) += amount;

        let tx = Transaction::new(
            TransactionKind::Bet,
            -(amount as i64),
            format!("Bet on \"{}\"", choice),
            now,
        )
        .with_market(market_id)
        .with_choice(choice);
        Ok(self.record(tx))
    }

    /// Return part of an open stake to the available balance
    pub fn release_stake(
        &mut self,
        amount: u64,
        market_id: &str,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        let open = self.open_stake(market_id);
        if open == 0 {
            return Err(LedgerError::NoOpenStake(market_id.to_string()));
        }
        let amount = amount.min(open);

        self.unlock(amount);
        self.reduce_position(market_id, amount);
        let tx = Transaction::new(
            TransactionKind::Refund,
            amount as i64,
            format!("Stake released for {}", market_id),
            now,
        )
        .with_market(market_id);
        Ok(self.record(tx))
    }

    // ========================================================================
    // SETTLEMENT
    // ========================================================================

    /// Credit a market payout net of the 1% fee.
    ///
    /// The lock is reduced by the gross amount, floored at the stake still
    /// open in other markets.
    pub fn add_winnings(
        &mut self,
        amount: u64,
        market_id: &str,
        now: u64,
    ) -> Result<Transaction, LedgerError> {
        if self.has_claimed(market_id) {
            return Err(LedgerError::AlreadyClaimed(market_id.to_string()));
        }
        let fee = winnings_fee(amount);
        let net = amount - fee;
        let balance = self
            .balance
            .checked_add(net)
            .ok_or(LedgerError::BalanceOverflow)?;

        self.positions.remove(market_id);
        let still_open: u64 = self.positions.values().sum();
        self.balance = balance;
        self.locked = self.locked.saturating_sub(amount).max(still_open.min(self.locked));
        self.claimed.insert(market_id.to_string());

        let tx = Transaction::new(
            TransactionKind::Winnings,
            net as i64,
            format!("Winnings from {}", market_id),
            now,
        )
        .with_market(market_id)
        .with_fee(fee);
        Ok(self.record(tx))
    }

    /// Forfeit the open stake of a market that resolved against us
    pub fn settle_loss(&mut self, market_id: &str, now: u64) -> Result<Transaction, LedgerError> {
        let stake = self
            .positions
            .remove(market_id)
            .ok_or_else(|| LedgerError::NoOpenStake(market_id.to_string()))?;
        let forfeited = stake.min(self.locked);

        self.locked -= forfeited;
        self.balance -= forfeited;
        let tx = Transaction::new(
            TransactionKind::Loss,
            -(forfeited as i64),
            format!("Stake lost on {}", market_id),
            now,
        )
        .with_market(market_id);
        Ok(self.record(tx))
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn ensure_available(&self, required: u64) -> Result<(), LedgerError> {
        let available = self.available();
        if required > available {
            return Err(LedgerError::InsufficientFunds {
                available,
                required,
            });
        }
        Ok(())
    }

    fn reduce_position(&mut self, market_id: &str, amount: u64) {
        if let Some(open) = self.positions.get_mut(market_id) {
            *open = open.saturating_sub(amount);
            if *open == 0 {
                self.positions.remove(market_id);
            }
        }
    }

    fn record(&mut self, tx: Transaction) -> Transaction {
        self.transactions.insert(0, tx.clone());
        self.transactions.truncate(HISTORY_LIMIT);
        tx
    }
}
