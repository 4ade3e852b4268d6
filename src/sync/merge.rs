// Merge policy - how a remote market snapshot is reconciled with the local one
//
// Whole-object last-writer-wins on `updatedAt`. Kept behind `MergePolicy`
// so a field-level merge can replace it without touching dispatch.

use crate::market::Market;

/// What to do with a remote snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDecision {
    AdoptRemote,
    KeepLocal,
}

/// Result of merging one snapshot into the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The market was unknown locally
    Added,
    /// The remote copy replaced the local one
    Replaced,
    /// The local copy was kept
    Discarded,
}

impl MergeOutcome {
    pub fn adopted(&self) -> bool {
        !matches!(self, MergeOutcome::Discarded)
    }
}

pub trait MergePolicy: Send + Sync {
    fn decide(&self, local: Option<&Market>, remote: &Market) -> MergeDecision;
}

/// Adopt the remote copy when there is no local copy or it is strictly newer.
///
/// Resolution is irreversible: an unresolved snapshot never replaces a
/// resolved one, whatever its timestamp.
pub fn last_writer_wins(local: Option<&Market>, remote: &Market) -> MergeDecision {
    match local {
        None => MergeDecision::AdoptRemote,
        Some(local) if local.is_resolved() && !remote.is_resolved() => MergeDecision::KeepLocal,
        Some(local) if remote.updated_at() > local.updated_at() => MergeDecision::AdoptRemote,
        Some(_) => MergeDecision::KeepLocal,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LastWriterWins;

impl MergePolicy for LastWriterWins {
    fn decide(&self, local: Option<&Market>, remote: &Market) -> MergeDecision {
        last_writer_wins(local, remote)
    }
}
