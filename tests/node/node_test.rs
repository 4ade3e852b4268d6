// Node Tests
// Local operations against an in-memory store and connection

use peerpredict::identity::{encode_check, PAYER_VERSION};
use peerpredict::market::MarketError;
use peerpredict::node::{MarketFilter, NewMarket};
use peerpredict::storage::{MemoryStore, SledStore};
use peerpredict::sync::Message;
use peerpredict::transport::{Connection, MemoryConnection, Outbound, PeerHandle};
use peerpredict::wallet::{LedgerError, RecordError, TransactionKind};
use peerpredict::{Node, NodeConfig, NodeError};
use tempfile::TempDir;

const START: u64 = 1_700_000_000_000;

fn node(dir: &TempDir) -> Node<MemoryStore, MemoryConnection> {
    Node::open(
        NodeConfig::new().with_data_dir(dir.path()),
        MemoryStore::new(),
        MemoryConnection::new(),
        START,
    )
    .unwrap()
}

fn decode(bytes: &[u8]) -> Message {
    Message::from_bytes(bytes).unwrap()
}

// ============================================================================
// WALLET
// ============================================================================

#[test]
fn test_open_generates_and_reloads_wallet() {
    let dir = TempDir::new().unwrap();
    let address = {
        let mut first = node(&dir);
        first.deposit(250, None, START + 1).unwrap();
        first.address().to_string()
    };

    let second = node(&dir);
    assert_eq!(second.address(), address);
    assert_eq!(second.ledger().balance(), 1250);
    assert!(dir.path().join("wallet.json").exists());
}

#[test]
fn test_open_refuses_overlocked_wallet() {
    let dir = TempDir::new().unwrap();
    let address = encode_check(&[6u8; 20], PAYER_VERSION);
    std::fs::write(
        dir.path().join("wallet.json"),
        serde_json::json!({
            "address": address,
            "balance": 0,
            "lockedBalance": 100,
            "transactions": [],
            "createdAt": START
        })
        .to_string(),
    )
    .unwrap();

    let opened = Node::open(
        NodeConfig::new().with_data_dir(dir.path()),
        MemoryStore::new(),
        MemoryConnection::new(),
        START,
    );
    assert!(matches!(opened, Err(NodeError::Wallet(RecordError::Inconsistent(_)))));
}

#[test]
fn test_deposit_is_announced() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    n.deposit(10, Some("0xfeed".into()), START).unwrap();

    let sent = n.connection().take_broadcasts();
    assert_eq!(sent.len(), 1);
    assert!(matches!(decode(&sent[0]), Message::Deposit(d) if d.amount == 10));
}

#[test]
fn test_failed_withdraw_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let dest = encode_check(&[9u8; 20], PAYER_VERSION);

    let err = n.withdraw(5000, &dest, START).unwrap_err();
    assert!(matches!(
        err,
        NodeError::Ledger(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(n.ledger().balance(), 1000);
    assert_eq!(n.ledger().history().len(), 1);
}

#[test]
fn test_connect_wallet_switches_identity() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let external = encode_check(&[5u8; 20], PAYER_VERSION);

    let ledger = n.connect_wallet(&external, START).unwrap();
    assert!(ledger.is_connected());
    assert_eq!(ledger.balance(), 0);
    assert_eq!(n.address(), external);
    assert!(dir
        .path()
        .join(format!("wallet_{}.json", external))
        .exists());

    assert!(matches!(
        n.connect_wallet("garbage", START),
        Err(NodeError::Ledger(LedgerError::InvalidAddress(_)))
    ));
}

// ============================================================================
// MARKETS
// ============================================================================

#[test]
fn test_create_market_defaults() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let market = n.create_market(NewMarket::new("Rain tomorrow?"), START).unwrap();

    assert!(market.id().starts_with("pred-"));
    assert_eq!(market.options(), &["Yes".to_string(), "No".to_string()]);
    assert_eq!(market.deadline(), START + n.config().market_duration_ms);
    assert_eq!(market.creator(), n.address());

    let sent = n.connection().take_broadcasts();
    assert!(matches!(decode(&sent[0]), Message::Create(c) if c.market == market));
}

#[test]
fn test_create_with_initial_vote_locks_stake() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let market = n
        .create_market(
            NewMarket::new("Who wins?")
                .with_options(&["A", "B", "C"])
                .with_initial_vote("B", 300),
            START,
        )
        .unwrap();

    assert_eq!(market.option_stake("B"), 300);
    assert_eq!(n.ledger().locked(), 300);
    assert_eq!(n.ledger().open_stake(market.id()), 300);
}

#[test]
fn test_create_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);

    assert!(matches!(
        n.create_market(NewMarket::new(""), START),
        Err(NodeError::Market(MarketError::InvalidInput(_)))
    ));
    assert!(matches!(
        n.create_market(NewMarket::new("Past?").with_deadline(START - 1), START),
        Err(NodeError::InvalidInput(_))
    ));
    assert!(matches!(
        n.create_market(NewMarket::new("Rich?").with_initial_vote("Yes", 5000), START),
        Err(NodeError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));
    assert!(n.registry().is_empty());
}

#[test]
fn test_revote_charges_only_the_difference() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?"), START)
        .unwrap()
        .id()
        .to_string();

    n.cast_vote(&id, "Yes", 100, START + 1).unwrap();
    n.cast_vote(&id, "No", 40, START + 2).unwrap();
    assert_eq!(n.ledger().locked(), 40);
    assert_eq!(n.ledger().history()[0].kind, TransactionKind::Refund);

    n.cast_vote(&id, "No", 70, START + 3).unwrap();
    assert_eq!(n.ledger().locked(), 70);
    assert_eq!(n.ledger().balance(), 1000);

    let market = n.registry().get(&id).unwrap();
    assert_eq!(market.total_stake(), 70);
    assert_eq!(market.option_stake("Yes"), 0);
}

#[test]
fn test_vote_guards() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?").with_deadline(START + 10), START)
        .unwrap()
        .id()
        .to_string();

    assert!(matches!(
        n.cast_vote("pred-missing", "Yes", 1, START),
        Err(NodeError::NotFound(_))
    ));
    assert!(matches!(
        n.cast_vote(&id, "Maybe", 1, START),
        Err(NodeError::Market(MarketError::InvalidChoice { .. }))
    ));
    assert!(matches!(
        n.cast_vote(&id, "Yes", 0, START),
        Err(NodeError::InvalidInput(_))
    ));
    assert!(matches!(
        n.cast_vote(&id, "Yes", 1001, START),
        Err(NodeError::Ledger(LedgerError::InsufficientFunds { .. }))
    ));
    assert!(matches!(
        n.cast_vote(&id, "Yes", 1, START + 10),
        Err(NodeError::MarketClosed(_))
    ));
    assert_eq!(n.ledger().locked(), 0);
}

#[test]
fn test_resolver_auto_claims() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?").with_initial_vote("Yes", 200), START)
        .unwrap()
        .id()
        .to_string();

    let resolution = n.resolve_market(&id, "Yes", START + 5).unwrap();
    assert_eq!(resolution.settlement.payout_for(n.address()), Some(200));
    assert!(matches!(resolution.position, Ok(Some(ref tx)) if tx.kind == TransactionKind::Winnings));
    assert_eq!(n.ledger().balance(), 1000 + 198);
    assert_eq!(n.ledger().locked(), 0);

    assert!(matches!(
        n.claim_winnings(&id, START + 6),
        Err(NodeError::Ledger(LedgerError::AlreadyClaimed(_)))
    ));
    assert!(matches!(
        n.resolve_market(&id, "No", START + 7),
        Err(NodeError::Market(MarketError::AlreadyResolved))
    ));
}

#[test]
fn test_claim_requires_resolution() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?"), START)
        .unwrap()
        .id()
        .to_string();

    assert!(matches!(
        n.claim_winnings(&id, START),
        Err(NodeError::Market(MarketError::NotResolved))
    ));
}

#[test]
fn test_consensus_market_needs_verifiers() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?").with_verifiers(3), START)
        .unwrap()
        .id()
        .to_string();

    assert!(matches!(
        n.resolve_market(&id, "Yes", START),
        Err(NodeError::Market(MarketError::ConsensusRequired))
    ));
    assert_eq!(n.submit_verification(&id, "Yes", START + 1).unwrap(), None);
    let sent = n.connection().take_broadcasts();
    assert!(matches!(decode(sent.last().unwrap()), Message::Verify(_)));
}

// ============================================================================
// VIEWS
// ============================================================================

#[test]
fn test_list_markets_filters_newest_first() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let old = n.create_market(NewMarket::new("Old?"), START).unwrap();
    let new = n.create_market(NewMarket::new("New?"), START + 100).unwrap();
    n.cast_vote(old.id(), "Yes", 10, START + 101).unwrap();
    n.resolve_market(new.id(), "No", START + 102).unwrap();

    let all: Vec<&str> = n.list_markets(MarketFilter::All).iter().map(|m| m.id()).collect();
    assert_eq!(all, vec![new.id(), old.id()]);
    assert_eq!(n.list_markets(MarketFilter::Active)[0].id(), old.id());
    assert_eq!(n.list_markets(MarketFilter::Resolved)[0].id(), new.id());
    assert_eq!(n.list_markets(MarketFilter::Voted).len(), 1);

    let status = n.status();
    assert_eq!(status.markets, 2);
    assert_eq!(status.resolved_markets, 1);
    assert_eq!(status.wallet.locked, 10);
}

#[test]
fn test_market_view_reports_own_position() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let id = n
        .create_market(NewMarket::new("Q?").with_initial_vote("No", 30), START)
        .unwrap()
        .id()
        .to_string();

    let view = n.market_view(&id).unwrap();
    assert_eq!(view.my_vote.unwrap().stake, 30);
    assert_eq!(view.stats.options[1].percentage, 100);
    assert!(view.settlement.is_none());
    assert!(n.market_view("pred-none").is_none());
}

#[test]
fn test_history_view_filters_kind() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    n.deposit(5, None, START).unwrap();
    n.deposit(6, None, START + 1).unwrap();

    let deposits = n.transactions(20, Some(TransactionKind::Deposit));
    assert_eq!(deposits.len(), 2);
    assert_eq!(deposits[0].amount, 6);
    assert_eq!(n.transactions(1, None).len(), 1);
}

// ============================================================================
// PEERS AND PERSISTENCE
// ============================================================================

#[test]
fn test_on_connect_sends_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut n = node(&dir);
    let market = n.create_market(NewMarket::new("Q?"), START).unwrap();
    n.connection().take_sent();

    let peer = PeerHandle::from_bytes([4; 16]);
    n.connection().add_peer(peer);
    n.on_connect(peer, "127.0.0.1:9000", START);

    let sent = n.connection().take_sent();
    match &sent[..] {
        [Outbound::Direct(to, data)] => {
            assert_eq!(*to, peer);
            assert!(matches!(decode(data), Message::Sync(s) if s.markets == vec![market.clone()]));
        }
        other => panic!("unexpected frames {:?}", other),
    }
    assert_eq!(n.status().peers.synced_peers, 1);
    assert_eq!(n.connection().peer_count(), 1);

    n.on_disconnect(&peer, "closed");
    assert_eq!(n.status().peers.connected_peers, 0);
}

#[test]
fn test_markets_survive_restart_on_sled() {
    let dir = TempDir::new().unwrap();
    let config = NodeConfig::new().with_data_dir(dir.path());
    let id = {
        let store = SledStore::open(config.database_path()).unwrap();
        let mut n = Node::open(config.clone(), store, MemoryConnection::new(), START).unwrap();
        let market = n
            .create_market(NewMarket::new("Q?").with_initial_vote("Yes", 50), START)
            .unwrap();
        market.id().to_string()
    };

    let store = SledStore::open(config.database_path()).unwrap();
    let n = Node::open(config, store, MemoryConnection::new(), START).unwrap();
    assert_eq!(n.registry().get(&id).unwrap().total_stake(), 50);
    assert_eq!(n.ledger().open_stake(&id), 50);
}
