// Merge Engine - applies inbound peer messages to the market registry
//
// Dispatch is an exhaustive match over `Message`. Snapshot reconciliation is
// delegated to the configured `MergePolicy`. Messages that cannot be applied
// are reported as `Ignored`, never as errors; only storage failures propagate.

use crate::market::Settlement;
use crate::registry::{MarketRegistry, RegistryError};
use crate::storage::KvStore;
use crate::sync::merge::{LastWriterWins, MergeOutcome, MergePolicy};
use crate::sync::protocol::{
    DepositMessage, Message, ResolveMessage, SyncMessage, VerifyMessage, VoteMessage,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Effects of applying a message
#[derive(Clone, Debug, PartialEq)]
pub enum MergeEvent {
    MarketAdded(String),
    MarketReplaced(String),
    SnapshotDiscarded(String),
    VoteApplied { market_id: String, voter: String },
    MarketResolved {
        market_id: String,
        settlement: Settlement,
    },
    VerificationRecorded { market_id: String, verifier: String },
    DepositObserved { address: String, amount: u64 },
    Ignored(String),
}

impl MergeEvent {
    /// Market whose state may now be resolved
    pub fn touched_market(&self) -> Option<&str> {
        match self {
            MergeEvent::MarketAdded(id) | MergeEvent::MarketReplaced(id) => Some(id),
            MergeEvent::MarketResolved { market_id, .. } => Some(market_id),
            _ => None,
        }
    }
}

/// Statistics about the merge engine
#[derive(Clone, Debug, Default)]
pub struct MergeStats {
    pub messages_processed: u64,
    pub messages_ignored: u64,
    pub markets_added: u64,
    pub markets_replaced: u64,
    pub snapshots_discarded: u64,
    pub votes_applied: u64,
    pub resolutions_applied: u64,
    pub verifications_applied: u64,
    pub deposits_observed: u64,
}

pub struct MergeEngine {
    policy: Box<dyn MergePolicy>,
    stats: MergeStats,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new(Box::new(LastWriterWins))
    }
}

impl MergeEngine {
    pub fn new(policy: Box<dyn MergePolicy>) -> Self {
        Self {
            policy,
            stats: MergeStats::default(),
        }
    }

    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Decode and apply a raw frame. Undecodable frames are dropped.
    pub fn process_bytes<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        bytes: &[u8],
        now: u64,
    ) -> Result<Vec<MergeEvent>, MergeError> {
        match Message::from_bytes(bytes) {
            Ok(msg) => self.process_message(registry, msg, now),
            Err(e) => {
                debug!(error = %e, "dropping malformed peer message");
                self.stats.messages_ignored += 1;
                Ok(vec![MergeEvent::Ignored(e.to_string())])
            }
        }
    }

    /// Apply one message
    pub fn process_message<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        msg: Message,
        now: u64,
    ) -> Result<Vec<MergeEvent>, MergeError> {
        self.stats.messages_processed += 1;

        let events = match msg {
            Message::Sync(SyncMessage { markets }) => {
                let mut events = Vec::with_capacity(markets.len());
                for market in markets {
                    events.push(self.merge_snapshot(registry, market)?);
                }
                events
            }
            Message::Create(create) => vec![self.merge_snapshot(registry, create.market)?],
            Message::Vote(vote) => vec![self.apply_vote(registry, vote, now)?],
            Message::Resolve(resolve) => vec![self.apply_resolve(registry, resolve, now)?],
            Message::Verify(verify) => self.apply_verify(registry, verify, now)?,
            Message::Deposit(DepositMessage {
                address, amount, ..
            }) => {
                info!(%address, amount, "peer reported a deposit");
                self.stats.deposits_observed += 1;
                vec![MergeEvent::DepositObserved { address, amount }]
            }
            Message::Unknown => vec![MergeEvent::Ignored("unknown message type".into())],
        };

        if events.iter().all(|e| matches!(e, MergeEvent::Ignored(_))) {
            self.stats.messages_ignored += 1;
        }
        Ok(events)
    }

    // ========================================================================
    // HANDLERS
    // ========================================================================

    fn merge_snapshot<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        market: crate::market::Market,
    ) -> Result<MergeEvent, MergeError> {
        let id = market.id().to_string();
        match registry.merge(market, self.policy.as_ref()) {
            Ok(MergeOutcome::Added) => {
                self.stats.markets_added += 1;
                debug!(market = %id, "adopted new market");
                Ok(MergeEvent::MarketAdded(id))
            }
            Ok(MergeOutcome::Replaced) => {
                self.stats.markets_replaced += 1;
                debug!(market = %id, "replaced market with newer snapshot");
                Ok(MergeEvent::MarketReplaced(id))
            }
            Ok(MergeOutcome::Discarded) => {
                self.stats.snapshots_discarded += 1;
                Ok(MergeEvent::SnapshotDiscarded(id))
            }
            Err(RegistryError::Market(e)) => Ok(ignored(&id, e)),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_vote<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        vote: VoteMessage,
        now: u64,
    ) -> Result<MergeEvent, MergeError> {
        match registry.vote(&vote.market_id, &vote.voter, &vote.choice, vote.stake, now) {
            Ok(_) => {
                self.stats.votes_applied += 1;
                Ok(MergeEvent::VoteApplied {
                    market_id: vote.market_id,
                    voter: vote.voter,
                })
            }
            Err(e) => soft(&vote.market_id, e),
        }
    }

    fn apply_resolve<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        resolve: ResolveMessage,
        now: u64,
    ) -> Result<MergeEvent, MergeError> {
        let already = registry
            .get(&resolve.market_id)
            .map_or(false, |m| m.is_resolved());
        if already {
            return Ok(ignored(&resolve.market_id, "already resolved"));
        }

        match registry.apply_resolution(
            &resolve.market_id,
            &resolve.outcome,
            &resolve.resolved_by,
            now,
        ) {
            Ok(settlement) => {
                self.stats.resolutions_applied += 1;
                info!(market = %resolve.market_id, outcome = %resolve.outcome, "peer resolved market");
                Ok(MergeEvent::MarketResolved {
                    market_id: resolve.market_id,
                    settlement,
                })
            }
            Err(e) => soft(&resolve.market_id, e),
        }
    }

    fn apply_verify<S: KvStore>(
        &mut self,
        registry: &mut MarketRegistry<S>,
        verify: VerifyMessage,
        now: u64,
    ) -> Result<Vec<MergeEvent>, MergeError> {
        match registry.verify(&verify.market_id, &verify.verifier, &verify.outcome, now) {
            Ok(decided) => {
                self.stats.verifications_applied += 1;
                let mut events = vec![MergeEvent::VerificationRecorded {
                    market_id: verify.market_id.clone(),
                    verifier: verify.verifier,
                }];
                if let Some(settlement) = decided {
                    self.stats.resolutions_applied += 1;
                    events.push(MergeEvent::MarketResolved {
                        market_id: verify.market_id,
                        settlement,
                    });
                }
                Ok(events)
            }
            Err(e) => Ok(vec![soft(&verify.market_id, e)?]),
        }
    }
}

fn ignored(market_id: &str, reason: impl std::fmt::Display) -> MergeEvent {
    debug!(market = %market_id, %reason, "ignoring peer update");
    MergeEvent::Ignored(format!("{}: {}", market_id, reason))
}

/// Domain rejections become `Ignored`; storage failures propagate
fn soft(market_id: &str, err: RegistryError) -> Result<MergeEvent, MergeError> {
    match err {
        RegistryError::Market(_) | RegistryError::NotFound(_) | RegistryError::Duplicate(_) => {
            Ok(ignored(market_id, err))
        }
        other => Err(other.into()),
    }
}
