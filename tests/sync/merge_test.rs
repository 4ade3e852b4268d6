// Merge Tests
// Last-writer-wins reconciliation through the registry

use peerpredict::market::{yes_no, Market};
use peerpredict::registry::MarketRegistry;
use peerpredict::storage::{KvStore, MemoryStore};
use peerpredict::sync::{last_writer_wins, LastWriterWins, MergeDecision, MergeOutcome};

fn market_at(updated_at: u64, question: &str) -> Market {
    let market = Market::new("pred-1", question, yes_no(), "c", u64::MAX, 1).unwrap();
    let mut json = serde_json::to_value(&market).unwrap();
    json["updatedAt"] = serde_json::json!(updated_at);
    serde_json::from_value(json).unwrap()
}

fn registry_with(market: Market) -> MarketRegistry<MemoryStore> {
    let mut registry = MarketRegistry::open(MemoryStore::new()).unwrap();
    registry.insert_new(market).unwrap();
    registry
}

#[test]
fn test_newer_remote_replaces_local() {
    let mut registry = registry_with(market_at(5, "local?"));
    let outcome = registry.merge(market_at(10, "remote?"), &LastWriterWins).unwrap();

    assert_eq!(outcome, MergeOutcome::Replaced);
    assert_eq!(registry.get("pred-1").unwrap().question(), "remote?");
    assert_eq!(registry.get("pred-1").unwrap().updated_at(), 10);
}

#[test]
fn test_older_remote_is_discarded() {
    let mut registry = registry_with(market_at(10, "local?"));
    let outcome = registry.merge(market_at(5, "remote?"), &LastWriterWins).unwrap();

    assert_eq!(outcome, MergeOutcome::Discarded);
    assert!(!outcome.adopted());
    assert_eq!(registry.get("pred-1").unwrap().question(), "local?");
}

#[test]
fn test_merge_order_does_not_matter() {
    let mut first = MarketRegistry::open(MemoryStore::new()).unwrap();
    first.merge(market_at(5, "old?"), &LastWriterWins).unwrap();
    first.merge(market_at(10, "new?"), &LastWriterWins).unwrap();

    let mut second = MarketRegistry::open(MemoryStore::new()).unwrap();
    second.merge(market_at(10, "new?"), &LastWriterWins).unwrap();
    second.merge(market_at(5, "old?"), &LastWriterWins).unwrap();

    assert_eq!(first.get("pred-1"), second.get("pred-1"));
}

#[test]
fn test_adopted_snapshot_is_persisted() {
    let mut registry = MarketRegistry::open(MemoryStore::new()).unwrap();
    let outcome = registry.merge(market_at(3, "q?"), &LastWriterWins).unwrap();

    assert_eq!(outcome, MergeOutcome::Added);
    assert!(registry.store().get("prediction:pred-1").unwrap().is_some());
}

#[test]
fn test_remote_aggregates_are_recomputed() {
    let mut market = market_at(3, "q?");
    market.add_vote("alice", "Yes", 40, 4).unwrap();
    let mut json = serde_json::to_value(&market).unwrap();
    json["totalStake"] = serde_json::json!(1_000_000);
    json["optionStake"]["No"] = serde_json::json!(77);
    let tampered: Market = serde_json::from_value(json).unwrap();

    let mut registry = MarketRegistry::open(MemoryStore::new()).unwrap();
    registry.merge(tampered, &LastWriterWins).unwrap();
    let stored = registry.get("pred-1").unwrap();

    assert_eq!(stored.total_stake(), 40);
    assert_eq!(stored.option_stake("No"), 0);
    assert!(stored.check_invariants());
}

#[test]
fn test_structurally_invalid_remote_is_rejected() {
    let mut json = serde_json::to_value(market_at(3, "q?")).unwrap();
    json["options"] = serde_json::json!(["Only"]);
    let invalid: Market = serde_json::from_value(json).unwrap();

    let mut registry = MarketRegistry::open(MemoryStore::new()).unwrap();
    assert!(registry.merge(invalid, &LastWriterWins).is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_comparator_ties_keep_local() {
    let local = market_at(8, "a?");
    let remote = market_at(8, "b?");

    assert_eq!(last_writer_wins(Some(&local), &remote), MergeDecision::KeepLocal);
    assert_eq!(last_writer_wins(Some(&remote), &local), MergeDecision::KeepLocal);
}

#[test]
fn test_late_vote_snapshot_cannot_unresolve() {
    let mut local = market_at(1, "q?");
    local.add_vote("alice", "Yes", 50, 2).unwrap();
    local.resolve("Yes", "c", 10).unwrap();
    let mut registry = registry_with(local);

    // A peer that missed the resolution took a vote later
    let mut remote = market_at(1, "q?");
    remote.add_vote("alice", "Yes", 50, 2).unwrap();
    remote.add_vote("bob", "No", 30, 20).unwrap();
    assert!(remote.updated_at() > registry.get("pred-1").unwrap().updated_at());

    let outcome = registry.merge(remote, &LastWriterWins).unwrap();
    let stored = registry.get("pred-1").unwrap();

    assert_eq!(outcome, MergeOutcome::Discarded);
    assert!(stored.is_resolved());
    assert_eq!(stored.resolution(), Some("Yes"));
    assert!(stored.vote_of("bob").is_none());
}

#[test]
fn test_resolved_remote_still_replaces_unresolved_local() {
    let mut registry = registry_with(market_at(5, "q?"));
    let mut remote = market_at(5, "q?");
    remote.resolve("No", "c", 9).unwrap();

    let outcome = registry.merge(remote, &LastWriterWins).unwrap();

    assert_eq!(outcome, MergeOutcome::Replaced);
    assert!(registry.get("pred-1").unwrap().is_resolved());
}
