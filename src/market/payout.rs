// Payout computation and market statistics
//
// Both are pure functions of a market's votes.

use crate::market::prediction::Vote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of settling a resolved market
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub outcome: String,
    pub total_stake: u64,
    pub winning_stake: u64,
    pub losing_stake: u64,
    pub winners: Vec<String>,
    pub losers: Vec<String>,
    /// Gross payout per winning voter: stake plus pro-rata share of the losing pool
    pub payouts: BTreeMap<String, u64>,
}

impl Settlement {
    /// Split votes into winners and losers and compute payouts.
    ///
    /// With no stake on the outcome nothing is paid and the losing pool
    /// stays where it is.
    pub fn compute<'a>(outcome: &str, votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut winners = Vec::new();
        let mut losers = Vec::new();
        let mut winning_stake = 0u64;
        let mut losing_stake = 0u64;
        let mut winning_votes = Vec::new();

        for vote in votes {
            if vote.choice == outcome {
                winning_stake += vote.stake;
                winners.push(vote.voter.clone());
                winning_votes.push(vote);
            } else {
                losing_stake += vote.stake;
                losers.push(vote.voter.clone());
            }
        }

        let mut payouts = BTreeMap::new();
        if winning_stake > 0 {
            for vote in winning_votes {
                let share = (vote.stake as u128 * losing_stake as u128) / winning_stake as u128;
                payouts.insert(vote.voter.clone(), vote.stake + share as u64);
            }
        }

        Self {
            outcome: outcome.to_string(),
            total_stake: winning_stake + losing_stake,
            winning_stake,
            losing_stake,
            winners,
            losers,
            payouts,
        }
    }

    /// Payout owed to a voter, if they won
    pub fn payout_for(&self, voter: &str) -> Option<u64> {
        self.payouts.get(voter).copied()
    }

    pub fn total_paid(&self) -> u64 {
        self.payouts.values().sum()
    }

    /// Stake left unassigned by floor rounding (or the whole pool when nobody won)
    pub fn dust(&self) -> u64 {
        self.total_stake - self.total_paid()
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionStats {
    pub option: String,
    pub votes: usize,
    pub stake: u64,
    /// Share of total stake, rounded to the nearest percent
    pub percentage: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub total_votes: usize,
    pub total_stake: u64,
    pub options: Vec<OptionStats>,
}

impl MarketStats {
    pub fn compute<'a>(options: &[String], votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut per_option: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
        let mut total_votes = 0;
        let mut total_stake = 0u64;
        for vote in votes {
            let entry = per_option.entry(vote.choice.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += vote.stake;
            total_votes += 1;
            total_stake += vote.stake;
        }

        let options = options
            .iter()
            .map(|option| {
                let (votes, stake) = per_option.get(option.as_str()).copied().unwrap_or((0, 0));
                let percentage = if total_stake == 0 {
                    0
                } else {
                    ((stake as u128 * 200 + total_stake as u128) / (2 * total_stake as u128)) as u64
                };
                OptionStats {
                    option: option.clone(),
                    votes,
                    stake,
                    percentage,
                }
            })
            .collect();

        Self {
            total_votes,
            total_stake,
            options,
        }
    }
}
