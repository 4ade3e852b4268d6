// Market - a single prediction's state machine
//
// Open -> Resolved(outcome). Votes and resolution are the only mutations;
// every mutation advances `updated_at`, which orders replicas under LWW.

use crate::market::consensus::{VerifierPanel, MAX_VERIFIERS, MIN_VERIFIERS};
use crate::market::payout::{MarketStats, Settlement};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const DEFAULT_MARKET_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Resolver recorded when a verifier panel settles the market
pub const CONSENSUS_RESOLVER: &str = "consensus";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid choice '{choice}', expected one of {options:?}")]
    InvalidChoice { choice: String, options: Vec<String> },

    #[error("Market already resolved")]
    AlreadyResolved,

    #[error("Market not resolved yet")]
    NotResolved,

    #[error("Market has no verifier panel")]
    NoVerifierPanel,

    #[error("Market resolves by verifier consensus")]
    ConsensusRequired,
}

/// One voter's current position
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter: String,
    pub choice: String,
    pub stake: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    id: String,
    question: String,
    options: Vec<String>,
    creator: String,
    created_at: u64,
    deadline: u64,
    votes: BTreeMap<String, Vote>,
    option_stake: BTreeMap<String, u64>,
    total_stake: u64,
    resolved: bool,
    resolution: Option<String>,
    #[serde(default)]
    resolved_at: Option<u64>,
    #[serde(default)]
    resolved_by: Option<String>,
    updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verification: Option<VerifierPanel>,
}

impl Market {
    /// Create a market after validating its question and options
    pub fn new(
        id: impl Into<String>,
        question: &str,
        options: Vec<String>,
        creator: &str,
        deadline: u64,
        now: u64,
    ) -> Result<Self, MarketError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(MarketError::InvalidInput("question must not be empty".into()));
        }
        let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();
        validate_options(&options)?;

        let option_stake = options.iter().map(|o| (o.clone(), 0)).collect();
        Ok(Self {
            id: id.into(),
            question: question.to_string(),
            options,
            creator: creator.to_string(),
            created_at: now,
            deadline,
            votes: BTreeMap::new(),
            option_stake,
            total_stake: 0,
            resolved: false,
            resolution: None,
            resolved_at: None,
            resolved_by: None,
            updated_at: now,
            verification: None,
        })
    }

    /// Require `count` verifier votes to resolve instead of a single resolver
    pub fn with_verifiers(mut self, count: usize) -> Result<Self, MarketError> {
        if !(MIN_VERIFIERS..=MAX_VERIFIERS).contains(&count) {
            return Err(MarketError::InvalidInput(format!(
                "verifier count must be between {} and {}",
                MIN_VERIFIERS, MAX_VERIFIERS
            )));
        }
        self.verification = Some(VerifierPanel::new(count));
        Ok(self)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Get the market ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the question
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Get the options, in creation order
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Get the creator's address
    pub fn creator(&self) -> &str {
        &self.creator
    }

    /// Get the creation time in ms
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Get the voting deadline in ms
    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// Iterate over votes, ordered by voter
    pub fn votes(&self) -> impl Iterator<Item = &Vote> {
        self.votes.values()
    }

    /// Get a voter's current vote
    pub fn vote_of(&self, voter: &str) -> Option<&Vote> {
        self.votes.get(voter)
    }

    /// Get the number of voters
    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Get the stake on one option
    pub fn option_stake(&self, option: &str) -> u64 {
        self.option_stake.get(option).copied().unwrap_or(0)
    }

    /// Get the stake across all options
    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    /// Check if the market is resolved
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Get the winning option
    pub fn resolution(&self) -> Option<&str> {
        self.resolution.as_deref()
    }

    /// Get when the market was resolved
    pub fn resolved_at(&self) -> Option<u64> {
        self.resolved_at
    }

    /// Get who resolved the market
    pub fn resolved_by(&self) -> Option<&str> {
        self.resolved_by.as_deref()
    }

    /// Get the last-modified time used for merging
    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Get the verifier panel, if resolution needs consensus
    pub fn verification(&self) -> Option<&VerifierPanel> {
        self.verification.as_ref()
    }

    /// Accepting votes: unresolved and before the deadline
    pub fn is_open(&self, now: u64) -> bool {
        !self.resolved && now < self.deadline
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Record a vote, replacing the voter's previous one.
    ///
    /// Returns the replaced vote.
    pub fn add_vote(
        &mut self,
        voter: &str,
        choice: &str,
        stake: u64,
        now: u64,
    ) -> Result<Option<Vote>, MarketError> {
        if self.resolved {
            return Err(MarketError::AlreadyResolved);
        }
        self.ensure_option(choice)?;
        if stake == 0 {
            return Err(MarketError::InvalidInput("stake must be positive".into()));
        }

        let previous = self.votes.insert(
            voter.to_string(),
            Vote {
                voter: voter.to_string(),
                choice: choice.to_string(),
                stake,
                timestamp: now,
            },
        );
        if let Some(old) = &previous {
            if let Some(s) = self.option_stake.get_mut(&old.choice) {
                *s = s.saturating_sub(old.stake);
            }
        }
        *self.option_stake.entry(choice.to_string()).or_insert(0) += stake;
        self.total_stake = self.votes.values().map(|v| v.stake).sum();
        self.touch(now);
        Ok(previous)
    }

    /// Resolve by single-resolver authority. Irreversible.
    pub fn resolve(
        &mut self,
        outcome: &str,
        resolver: &str,
        now: u64,
    ) -> Result<Settlement, MarketError> {
        if self.resolved {
            return Err(MarketError::AlreadyResolved);
        }
        self.ensure_option(outcome)?;
        if self.verification.is_some() {
            return Err(MarketError::ConsensusRequired);
        }
        Ok(self.finalize(outcome, resolver, now))
    }

    /// Apply a remote resolution as stated, regardless of the verifier panel.
    ///
    /// Used when the resolving peer already reached the decision.
    pub fn apply_resolution(
        &mut self,
        outcome: &str,
        resolver: &str,
        now: u64,
    ) -> Result<Settlement, MarketError> {
        if self.resolved {
            return Err(MarketError::AlreadyResolved);
        }
        self.ensure_option(outcome)?;
        Ok(self.finalize(outcome, resolver, now))
    }

    /// Record a verifier's outcome; resolves the market once consensus is reached
    pub fn submit_verification(
        &mut self,
        verifier: &str,
        outcome: &str,
        now: u64,
    ) -> Result<Option<Settlement>, MarketError> {
        if self.resolved {
            return Err(MarketError::AlreadyResolved);
        }
        self.ensure_option(outcome)?;
        let panel = self
            .verification
            .as_mut()
            .ok_or(MarketError::NoVerifierPanel)?;

        panel.record(verifier, outcome);
        let decided = panel.tally();
        self.touch(now);

        Ok(decided.map(|outcome| self.finalize(&outcome, CONSENSUS_RESOLVER, now)))
    }

    // ========================================================================
    // DERIVED VIEWS
    // ========================================================================

    /// Payouts for a resolved market
    pub fn settlement(&self) -> Result<Settlement, MarketError> {
        match (&self.resolution, self.resolved) {
            (Some(outcome), true) => Ok(Settlement::compute(outcome, self.votes.values())),
            _ => Err(MarketError::NotResolved),
        }
    }

    /// Per-option vote counts and stake shares
    pub fn stats(&self) -> MarketStats {
        MarketStats::compute(&self.options, self.votes.values())
    }

    /// totalStake == sum(optionStake) == sum(vote stakes), all keyed by valid options
    pub fn check_invariants(&self) -> bool {
        let from_votes: u64 = self.votes.values().map(|v| v.stake).sum();
        let from_options: u64 = self.option_stake.values().sum();
        let mut regrouped: BTreeMap<&str, u64> = BTreeMap::new();
        for vote in self.votes.values() {
            *regrouped.entry(vote.choice.as_str()).or_insert(0) += vote.stake;
        }

        self.total_stake == from_votes
            && from_options == from_votes
            && self
                .option_stake
                .iter()
                .all(|(o, s)| regrouped.get(o.as_str()).copied().unwrap_or(0) == *s)
            && self.option_stake.keys().all(|o| self.options.contains(o))
            && self.resolution.as_ref().map_or(true, |r| self.options.contains(r))
            && self.resolved == self.resolution.is_some()
    }

    /// Rebuild aggregates from votes and reject structurally invalid snapshots.
    ///
    /// Applied to every market received from a peer before it is adopted.
    pub fn normalize(&mut self) -> Result<(), MarketError> {
        validate_options(&self.options)?;
        if self.resolved != self.resolution.is_some() {
            return Err(MarketError::InvalidInput(
                "resolution flag and outcome disagree".into(),
            ));
        }
        if let Some(outcome) = &self.resolution {
            if !self.options.contains(outcome) {
                return Err(MarketError::InvalidChoice {
                    choice: outcome.clone(),
                    options: self.options.clone(),
                });
            }
        }

        let options = &self.options;
        self.votes
            .retain(|voter, v| v.stake > 0 && options.contains(&v.choice) && *voter == v.voter);

        let mut option_stake: BTreeMap<String, u64> =
            self.options.iter().map(|o| (o.clone(), 0)).collect();
        for vote in self.votes.values() {
            *option_stake.entry(vote.choice.clone()).or_insert(0) += vote.stake;
        }
        self.option_stake = option_stake;
        self.total_stake = self.votes.values().map(|v| v.stake).sum();
        Ok(())
    }

    // ========================================================================
    // INTERNAL
    // ========================================================================

    fn finalize(&mut self, outcome: &str, resolver: &str, now: u64) -> Settlement {
        self.resolved = true;
        self.resolution = Some(outcome.to_string());
        self.resolved_at = Some(now);
        self.resolved_by = Some(resolver.to_string());
        self.touch(now);
        Settlement::compute(outcome, self.votes.values())
    }

    fn ensure_option(&self, choice: &str) -> Result<(), MarketError> {
        if self.options.iter().any(|o| o == choice) {
            Ok(())
        } else {
            Err(MarketError::InvalidChoice {
                choice: choice.to_string(),
                options: self.options.clone(),
            })
        }
    }

    fn touch(&mut self, now: u64) {
        self.updated_at = now.max(self.updated_at + 1);
    }

    #[cfg(test)]
    pub(crate) fn set_updated_at(&mut self, updated_at: u64) {
        self.updated_at = updated_at;
    }
}

fn validate_options(options: &[String]) -> Result<(), MarketError> {
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
        return Err(MarketError::InvalidInput(format!(
            "a market needs between {} and {} options",
            MIN_OPTIONS, MAX_OPTIONS
        )));
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err(MarketError::InvalidInput("options must not be empty".into()));
    }
    let distinct: BTreeSet<&String> = options.iter().collect();
    if distinct.len() != options.len() {
        return Err(MarketError::InvalidInput("options must be distinct".into()));
    }
    Ok(())
}

/// The default binary option set
pub fn yes_no() -> Vec<String> {
    vec!["Yes".to_string(), "No".to_string()]
}
