// Verifier consensus - supermajority resolution for verifier-gated markets

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_VERIFIERS: usize = 3;
pub const MAX_VERIFIERS: usize = 10;
/// Share of cast verifications an outcome needs, in percent
pub const CONSENSUS_THRESHOLD_PERCENT: usize = 66;

/// Votes needed for an outcome given `cast` verifications: ceil(cast * 66%)
pub fn consensus_threshold(cast: usize) -> usize {
    (cast * CONSENSUS_THRESHOLD_PERCENT).div_ceil(100)
}

/// Verifier votes collected for one market
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierPanel {
    /// Verifications required before consensus is evaluated
    pub required: usize,
    /// verifier address -> proposed outcome
    pub verifications: BTreeMap<String, String>,
}

impl VerifierPanel {
    pub fn new(required: usize) -> Self {
        Self {
            required,
            verifications: BTreeMap::new(),
        }
    }

    /// Record a verifier's outcome, replacing their previous one
    pub fn record(&mut self, verifier: &str, outcome: &str) -> Option<String> {
        self.verifications
            .insert(verifier.to_string(), outcome.to_string())
    }

    pub fn cast(&self) -> usize {
        self.verifications.len()
    }

    /// Outcome that reached the threshold, if any.
    ///
    /// Nothing is decided until `required` verifications exist.
    pub fn tally(&self) -> Option<String> {
        let cast = self.cast();
        if cast < self.required || cast == 0 {
            return None;
        }
        let threshold = consensus_threshold(cast);

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for outcome in self.verifications.values() {
            *counts.entry(outcome.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .find(|(_, count)| *count >= threshold)
            .map(|(outcome, _)| outcome.to_string())
    }
}
