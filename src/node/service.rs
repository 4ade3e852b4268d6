// Node - composes the ledger, market registry and merge engine
//
// The single owner of all mutable state for one replica. Local commands and
// inbound peer messages both run through `&mut self`, so mutations are
// sequential. Every local mutation is persisted before it is broadcast.

use crate::config::NodeConfig;
use crate::identity::validate_address;
use crate::ids;
use crate::market::{Market, MarketError, Settlement, Vote};
use crate::registry::{MarketRegistry, RegistryError};
use crate::storage::{KvStore, StoreError};
use crate::sync::{
    DepositMessage, MergeEngine, MergeError, MergeEvent, Message, PeerRegistry, ProtocolError,
    ResolveMessage, VerifyMessage, VoteMessage,
};
use crate::transport::{Connection, PeerHandle, TransportError, TransportEvent};
use crate::wallet::{Ledger, LedgerError, RecordError, Transaction, WalletFile};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Market {0} is closed for voting")]
    MarketClosed(String),

    #[error("No winnings to claim for market {0}")]
    NothingToClaim(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Registry(RegistryError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Wallet(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<RegistryError> for NodeError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => NodeError::NotFound(id),
            RegistryError::Market(e) => NodeError::Market(e),
            other => NodeError::Registry(other),
        }
    }
}

/// Outcome of resolving a market locally
#[derive(Debug)]
pub struct Resolution {
    pub settlement: Settlement,
    /// Our winnings credit or stake settlement, if any
    pub position: Result<Option<Transaction>, NodeError>,
}

/// Parameters for a new market
#[derive(Clone, Debug, Default)]
pub struct NewMarket {
    pub question: String,
    /// Defaults to Yes/No when empty
    pub options: Vec<String>,
    /// Absolute deadline in ms; defaults to now + configured duration
    pub deadline: Option<u64>,
    /// Optional stake placed by the creator at creation
    pub initial_vote: Option<(String, u64)>,
    /// Require this many verifiers to resolve
    pub verifiers: Option<usize>,
}

impl NewMarket {
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn with_deadline(mut self, deadline: u64) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_initial_vote(mut self, choice: &str, stake: u64) -> Self {
        self.initial_vote = Some((choice.to_string(), stake));
        self
    }

    pub fn with_verifiers(mut self, count: usize) -> Self {
        self.verifiers = Some(count);
        self
    }
}

pub struct Node<S: KvStore, C: Connection> {
    pub(super) config: NodeConfig,
    pub(super) ledger: Ledger,
    pub(super) wallet_file: WalletFile,
    pub(super) registry: MarketRegistry<S>,
    pub(super) engine: MergeEngine,
    pub(super) peers: PeerRegistry,
    pub(super) connection: C,
}

impl<S: KvStore, C: Connection> Node<S, C> {
    /// Open a node, loading `wallet.json` or generating a fresh wallet
    pub fn open(config: NodeConfig, store: S, connection: C, now: u64) -> Result<Self, NodeError> {
        let wallet_file = WalletFile::primary(&config.data_dir);
        let ledger = match wallet_file.load()? {
            Some(ledger) => ledger,
            None => {
                let ledger = Ledger::generate(config.welcome_bonus, now);
                wallet_file.save(&ledger)?;
                info!(address = %ledger.address(), "generated new wallet");
                ledger
            }
        };
        Self::with_ledger(config, ledger, wallet_file, store, connection)
    }

    /// Assemble a node around an existing ledger
    pub fn with_ledger(
        config: NodeConfig,
        ledger: Ledger,
        wallet_file: WalletFile,
        store: S,
        connection: C,
    ) -> Result<Self, NodeError> {
        let registry = MarketRegistry::open(store)?;
        info!(
            address = %ledger.address(),
            markets = registry.len(),
            "node ready"
        );
        Ok(Self {
            config,
            ledger,
            wallet_file,
            registry,
            engine: MergeEngine::default(),
            peers: PeerRegistry::new(),
            connection,
        })
    }

    pub fn address(&self) -> &str {
        self.ledger.address()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &MarketRegistry<S> {
        &self.registry
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // ========================================================================
    // WALLET OPERATIONS
    // ========================================================================

    /// Credit a deposit and announce it to peers
    pub fn deposit(
        &mut self,
        amount: u64,
        tx_hash: Option<String>,
        now: u64,
    ) -> Result<Transaction, NodeError> {
        let tx = self.update_ledger(|l| l.deposit(amount, tx_hash, now))?;
        self.broadcast(&Message::Deposit(DepositMessage {
            address: self.ledger.address().to_string(),
            amount,
            timestamp: now,
        }));
        Ok(tx)
    }

    pub fn withdraw(
        &mut self,
        amount: u64,
        destination: &str,
        now: u64,
    ) -> Result<Transaction, NodeError> {
        self.update_ledger(|l| l.withdraw(amount, destination, now))
    }

    /// Local debit only; the recipient's node is not credited
    pub fn transfer(
        &mut self,
        amount: u64,
        destination: &str,
        now: u64,
    ) -> Result<Transaction, NodeError> {
        self.update_ledger(|l| l.transfer(amount, destination, now))
    }

    /// Switch identity to an externally managed wallet.
    ///
    /// The previous wallet stays on disk; the connected one is loaded from
    /// `wallet_<address>.json` when present.
    pub fn connect_wallet(&mut self, address: &str, now: u64) -> Result<&Ledger, NodeError> {
        let address = address.trim();
        validate_address(address).map_err(|e| LedgerError::InvalidAddress(e.to_string()))?;

        let wallet_file = WalletFile::for_address(&self.config.data_dir, address);
        let ledger = match wallet_file.load()? {
            Some(ledger) => ledger,
            None => Ledger::connect_external(address, now)?,
        };
        wallet_file.save(&ledger)?;

        info!(%address, "connected external wallet");
        self.ledger = ledger;
        self.wallet_file = wallet_file;
        Ok(&self.ledger)
    }

    // ========================================================================
    // MARKET OPERATIONS
    // ========================================================================

    /// Create, persist and announce a market
    pub fn create_market(&mut self, spec: NewMarket, now: u64) -> Result<Market, NodeError> {
        let options = if spec.options.is_empty() {
            crate::market::yes_no()
        } else {
            spec.options
        };
        let deadline = spec
            .deadline
            .unwrap_or_else(|| now.saturating_add(self.config.market_duration_ms));
        if deadline <= now {
            return Err(NodeError::InvalidInput("deadline must be in the future".into()));
        }

        let me = self.ledger.address().to_string();
        let mut market = Market::new(ids::market_id(), &spec.question, options, &me, deadline, now)?;
        if let Some(count) = spec.verifiers {
            market = market.with_verifiers(count)?;
        }

        let initial = match spec.initial_vote {
            Some((choice, stake)) if stake > 0 => {
                market.add_vote(&me, &choice, stake, now)?;
                Some((choice, stake))
            }
            _ => None,
        };

        let id = market.id().to_string();
        let stored = market.clone();
        self.update_ledger_then(
            |l| match &initial {
                Some((choice, stake)) => l.deduct_bet(*stake, &id, choice, now).map(drop),
                None => Ok(()),
            },
            |registry| registry.insert_new(stored),
        )?;

        info!(market = %market.id(), question = %market.question(), "created market");
        self.broadcast(&Message::create(market.clone()));
        Ok(market)
    }

    /// Stake on an option, replacing any previous vote.
    ///
    /// Only the difference from the stake already locked is charged or
    /// released.
    pub fn cast_vote(
        &mut self,
        market_id: &str,
        choice: &str,
        stake: u64,
        now: u64,
    ) -> Result<Vote, NodeError> {
        let market = self
            .registry
            .get(market_id)
            .ok_or_else(|| NodeError::NotFound(market_id.to_string()))?;
        if market.is_resolved() {
            return Err(MarketError::AlreadyResolved.into());
        }
        if !market.is_open(now) {
            return Err(NodeError::MarketClosed(market_id.to_string()));
        }
        if !market.options().iter().any(|o| o == choice) {
            return Err(MarketError::InvalidChoice {
                choice: choice.to_string(),
                options: market.options().to_vec(),
            }
            .into());
        }
        if stake == 0 {
            return Err(NodeError::InvalidInput("stake must be positive".into()));
        }

        let locked = self.ledger.open_stake(market_id);
        if stake > locked && stake - locked > self.ledger.available() {
            return Err(LedgerError::InsufficientFunds {
                available: self.ledger.available(),
                required: stake - locked,
            }
            .into());
        }

        let me = self.ledger.address().to_string();
        self.update_ledger_then(
            |l| {
                if stake > locked {
                    l.deduct_bet(stake - locked, market_id, choice, now)?;
                } else if stake < locked {
                    l.release_stake(locked - stake, market_id, now)?;
                }
                Ok(())
            },
            |registry| registry.vote(market_id, &me, choice, stake, now),
        )?;

        let vote = Vote {
            voter: me.clone(),
            choice: choice.to_string(),
            stake,
            timestamp: now,
        };
        debug!(market = %market_id, %choice, stake, "vote cast");
        self.broadcast(&Message::Vote(VoteMessage {
            market_id: market_id.to_string(),
            voter: me,
            choice: choice.to_string(),
            stake,
            timestamp: now,
        }));
        Ok(vote)
    }

    /// Resolve a market as this node and settle our own position.
    ///
    /// Once the resolution is stored and announced the call succeeds; a
    /// failure to credit or settle our stake is reported in the result.
    pub fn resolve_market(
        &mut self,
        market_id: &str,
        outcome: &str,
        now: u64,
    ) -> Result<Resolution, NodeError> {
        let me = self.ledger.address().to_string();
        let settlement = self.registry.resolve(market_id, outcome, &me, now)?;

        info!(market = %market_id, %outcome, winners = settlement.winners.len(), "resolved market");
        self.broadcast(&Message::Resolve(ResolveMessage {
            market_id: market_id.to_string(),
            outcome: outcome.to_string(),
            resolved_by: me,
            timestamp: now,
        }));

        let position = if settlement.payout_for(self.ledger.address()).is_some() {
            self.claim_winnings(market_id, now).map(Some)
        } else {
            self.settle_local_position(market_id, now)
        };
        if let Err(e) = &position {
            warn!(market = %market_id, error = %e, "resolved but failed to settle own position");
        }
        Ok(Resolution {
            settlement,
            position,
        })
    }

    /// Cast this node's verifier vote on a consensus market
    pub fn submit_verification(
        &mut self,
        market_id: &str,
        outcome: &str,
        now: u64,
    ) -> Result<Option<Settlement>, NodeError> {
        let me = self.ledger.address().to_string();
        let decided = self.registry.verify(market_id, &me, outcome, now)?;

        self.broadcast(&Message::Verify(VerifyMessage {
            market_id: market_id.to_string(),
            verifier: me,
            outcome: outcome.to_string(),
            timestamp: now,
        }));
        if decided.is_some() {
            info!(market = %market_id, "verifier consensus reached");
            if let Err(e) = self.settle_local_position(market_id, now) {
                warn!(market = %market_id, error = %e, "consensus reached but failed to settle own position");
            }
        }
        Ok(decided)
    }

    /// Credit our payout from a resolved market, once
    pub fn claim_winnings(&mut self, market_id: &str, now: u64) -> Result<Transaction, NodeError> {
        let market = self
            .registry
            .get(market_id)
            .ok_or_else(|| NodeError::NotFound(market_id.to_string()))?;
        let settlement = market.settlement()?;
        if self.ledger.has_claimed(market_id) {
            return Err(LedgerError::AlreadyClaimed(market_id.to_string()).into());
        }
        let payout = settlement
            .payout_for(self.ledger.address())
            .ok_or_else(|| NodeError::NothingToClaim(market_id.to_string()))?;

        let tx = self.update_ledger(|l| l.add_winnings(payout, market_id, now))?;
        info!(market = %market_id, payout, "winnings credited");
        Ok(tx)
    }

    /// Apply a resolved market to our own stake.
    ///
    /// Losing stakes are forfeited, stakes whose vote is missing from the
    /// resolved market are released, winning stakes wait for `claim_winnings`.
    pub fn settle_local_position(
        &mut self,
        market_id: &str,
        now: u64,
    ) -> Result<Option<Transaction>, NodeError> {
        let Some(market) = self.registry.get(market_id) else {
            return Ok(None);
        };
        if !market.is_resolved() || self.ledger.open_stake(market_id) == 0 {
            return Ok(None);
        }
        let settlement = market.settlement()?;
        let me = self.ledger.address();
        let voted = market.vote_of(me).is_some();
        let won = settlement.payout_for(me).is_some();

        let tx = if !voted {
            self.update_ledger(|l| l.release_stake(u64::MAX, market_id, now))?
        } else if won {
            return Ok(None);
        } else {
            self.update_ledger(|l| l.settle_loss(market_id, now))?
        };
        debug!(market = %market_id, kind = %tx.kind, "settled local position");
        Ok(Some(tx))
    }

    // ========================================================================
    // PEER EVENTS
    // ========================================================================

    /// Route a transport event
    pub fn handle_event(&mut self, event: TransportEvent, now: u64) {
        match event {
            TransportEvent::Connected { peer, address, .. } => self.on_connect(peer, &address, now),
            TransportEvent::Message { peer, data } => {
                if let Err(e) = self.on_message(&peer, &data, now) {
                    warn!(%peer, error = %e, "failed to apply peer message");
                }
            }
            TransportEvent::Disconnected { peer, reason } => self.on_disconnect(&peer, &reason),
        }
    }

    /// Send our full market snapshot to a newly connected peer
    pub fn on_connect(&mut self, peer: PeerHandle, address: &str, now: u64) {
        self.peers.add_peer(peer, address, now);
        info!(%peer, %address, "peer connected");

        match Message::sync(self.registry.snapshot()).to_bytes() {
            Ok(bytes) => match self.connection.send(&peer, &bytes) {
                Ok(()) => self.peers.mark_synced(&peer),
                Err(e) => warn!(%peer, error = %e, "failed to send sync"),
            },
            Err(e) => warn!(error = %e, "failed to encode sync"),
        }
    }

    /// Apply an inbound frame and settle any market it resolved
    pub fn on_message(
        &mut self,
        peer: &PeerHandle,
        data: &[u8],
        now: u64,
    ) -> Result<Vec<MergeEvent>, NodeError> {
        self.peers.touch(peer, now);
        let events = self.engine.process_bytes(&mut self.registry, data, now)?;

        for event in &events {
            if let Some(market_id) = event.touched_market() {
                self.settle_local_position(market_id, now)?;
            }
        }
        Ok(events)
    }

    pub fn on_disconnect(&mut self, peer: &PeerHandle, reason: &str) {
        if self.peers.remove_peer(peer).is_some() {
            info!(%peer, %reason, "peer disconnected");
        }
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    /// Apply a ledger operation to a copy, persist it, then commit
    fn update_ledger<T>(
        &mut self,
        op: impl FnOnce(&mut Ledger) -> Result<T, LedgerError>,
    ) -> Result<T, NodeError> {
        let mut next = self.ledger.clone();
        let result = op(&mut next)?;
        self.wallet_file.save(&next)?;
        self.ledger = next;
        Ok(result)
    }

    /// Stage and persist a ledger operation, then run a registry step.
    ///
    /// The ledger is committed only when the step succeeds; otherwise the
    /// wallet file is rewritten from the unchanged ledger.
    fn update_ledger_then<T>(
        &mut self,
        op: impl FnOnce(&mut Ledger) -> Result<(), LedgerError>,
        step: impl FnOnce(&mut MarketRegistry<S>) -> Result<T, RegistryError>,
    ) -> Result<T, NodeError> {
        let mut next = self.ledger.clone();
        op(&mut next)?;
        self.wallet_file.save(&next)?;

        match step(&mut self.registry) {
            Ok(value) => {
                self.ledger = next;
                Ok(value)
            }
            Err(e) => {
                if let Err(restore) = self.wallet_file.save(&self.ledger) {
                    warn!(error = %restore, "failed to restore wallet file");
                }
                Err(e.into())
            }
        }
    }

    /// Fire-and-forget delivery to every connected peer
    fn broadcast(&self, msg: &Message) {
        match msg.to_bytes() {
            Ok(bytes) => {
                let delivered = self.connection.broadcast(&bytes);
                debug!(kind = ?msg.message_type(), delivered, "broadcast");
            }
            Err(e) => warn!(error = %e, "failed to encode broadcast"),
        }
    }
}
