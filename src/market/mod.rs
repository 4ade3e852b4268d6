// Market module - WHAT PEOPLE BET ON
// Handles the prediction state machine, payouts and verifier consensus

mod consensus;
mod payout;
mod prediction;

pub use consensus::{
    consensus_threshold, VerifierPanel, CONSENSUS_THRESHOLD_PERCENT, MAX_VERIFIERS,
    MIN_VERIFIERS,
};
pub use payout::{MarketStats, OptionStats, Settlement};
pub use prediction::{
    yes_no, Market, MarketError, Vote, CONSENSUS_RESOLVER, DEFAULT_MARKET_DURATION_MS,
    MAX_OPTIONS, MIN_OPTIONS,
};
