// Ledger Tests
// Balance and lock invariants, history bounds and settlement entries

use peerpredict::identity::{encode_check, PAYER_VERSION};
use peerpredict::wallet::{
    Ledger, LedgerError, TransactionKind, TransactionStatus, HISTORY_LIMIT, MAX_DEPOSIT,
};

fn destination() -> String {
    encode_check(&[42u8; 20], PAYER_VERSION)
}

fn funded(amount: u64) -> Ledger {
    let mut ledger = Ledger::generate(0, 1);
    ledger.deposit(amount, None, 1).unwrap();
    ledger
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_generate_records_welcome_bonus() {
    let ledger = Ledger::generate(1000, 5);

    assert_eq!(ledger.balance(), 1000);
    assert_eq!(ledger.history().len(), 1);
    assert_eq!(ledger.history()[0].kind, TransactionKind::Reward);
    assert!(ledger.private_key().is_some());
    assert!(!ledger.is_connected());
}

#[test]
fn test_connect_external_has_no_private_key() {
    let ledger = Ledger::connect_external(&destination(), 5).unwrap();

    assert!(ledger.is_connected());
    assert!(ledger.private_key().is_none());
    assert_eq!(ledger.balance(), 0);
}

#[test]
fn test_connect_external_rejects_bad_address() {
    assert!(matches!(
        Ledger::connect_external("not-an-address", 5),
        Err(LedgerError::InvalidAddress(_))
    ));
}

// ============================================================================
// DEPOSIT / WITHDRAW / TRANSFER
// ============================================================================

#[test]
fn test_deposit_bounds() {
    let mut ledger = funded(10);
    assert!(matches!(
        ledger.deposit(0, None, 2),
        Err(LedgerError::InvalidAmount { .. })
    ));
    assert!(matches!(
        ledger.deposit(MAX_DEPOSIT + 1, None, 2),
        Err(LedgerError::InvalidAmount { .. })
    ));
    ledger.deposit(MAX_DEPOSIT, Some("0xabc".into()), 2).unwrap();

    assert_eq!(ledger.balance(), 10 + MAX_DEPOSIT);
    assert_eq!(ledger.history()[0].tx_hash.as_deref(), Some("0xabc"));
}

#[test]
fn test_withdraw_is_pending_and_negative() {
    let mut ledger = funded(100);
    let tx = ledger.withdraw(40, &destination(), 2).unwrap();

    assert_eq!(tx.amount, -40);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(ledger.balance(), 60);
}

#[test]
fn test_withdraw_cannot_touch_locked_funds() {
    let mut ledger = funded(100);
    ledger.lock(70).unwrap();

    assert_eq!(
        ledger.withdraw(31, &destination(), 2),
        Err(LedgerError::InsufficientFunds {
            available: 30,
            required: 31
        })
    );
    assert_eq!(ledger.balance(), 100);
    assert!(ledger.check_invariants());
}

#[test]
fn test_withdraw_rejects_invalid_destination_first() {
    let mut ledger = funded(100);
    let before = ledger.history().len();

    assert!(matches!(
        ledger.withdraw(10, "1BoatSLRHtKNngkdXEeobR76b53LETtpyU", 2),
        Err(LedgerError::InvalidAddress(_))
    ));
    assert_eq!(ledger.history().len(), before);
}

#[test]
fn test_transfer_is_confirmed_local_debit() {
    let mut ledger = funded(100);
    let tx = ledger.transfer(25, &destination(), 2).unwrap();

    assert_eq!(tx.status, TransactionStatus::Confirmed);
    assert_eq!(tx.counterparty.as_deref(), Some(destination().as_str()));
    assert_eq!(ledger.balance(), 75);
}

// ============================================================================
// LOCKING AND BETS
// ============================================================================

#[test]
fn test_deduct_bet_locks_without_changing_balance() {
    let mut ledger = funded(100);
    let tx = ledger.deduct_bet(30, "pred-1", "Yes", 2).unwrap();

    assert_eq!(tx.kind, TransactionKind::Bet);
    assert_eq!(tx.amount, -30);
    assert_eq!(tx.choice.as_deref(), Some("Yes"));
    assert_eq!(ledger.balance(), 100);
    assert_eq!(ledger.locked(), 30);
    assert_eq!(ledger.available(), 70);
    assert_eq!(ledger.open_stake("pred-1"), 30);
}

#[test]
fn test_deduct_bet_insufficient_leaves_no_trace() {
    let mut ledger = funded(10);
    let before = ledger.history().len();

    assert!(matches!(
        ledger.deduct_bet(11, "pred-1", "Yes", 2),
        Err(LedgerError::InsufficientFunds { .. })
    ));
    assert_eq!(ledger.history().len(), before);
    assert_eq!(ledger.open_stake("pred-1"), 0);
}

#[test]
fn test_release_stake_caps_at_open_amount() {
    let mut ledger = funded(100);
    ledger.deduct_bet(30, "pred-1", "Yes", 2).unwrap();
    let tx = ledger.release_stake(500, "pred-1", 3).unwrap();

    assert_eq!(tx.kind, TransactionKind::Refund);
    assert_eq!(tx.amount, 30);
    assert_eq!(ledger.locked(), 0);
    assert_eq!(ledger.open_stake("pred-1"), 0);
}

// ============================================================================
// SETTLEMENT
// ============================================================================

#[test]
fn test_add_winnings_applies_fee_and_releases_gross() {
    let mut ledger = funded(1000);
    ledger.deduct_bet(100, "pred-1", "Yes", 2).unwrap();
    let tx = ledger.add_winnings(150, "pred-1", 3).unwrap();

    assert_eq!(tx.fee, Some(1));
    assert_eq!(tx.amount, 149);
    assert_eq!(ledger.balance(), 1149);
    assert_eq!(ledger.locked(), 0);
}

#[test]
fn test_add_winnings_keeps_other_markets_locked() {
    let mut ledger = funded(1000);
    ledger.deduct_bet(100, "pred-1", "Yes", 2).unwrap();
    ledger.deduct_bet(50, "pred-2", "No", 2).unwrap();
    ledger.add_winnings(150, "pred-1", 3).unwrap();

    assert_eq!(ledger.locked(), 50);
    assert_eq!(ledger.open_stake("pred-2"), 50);
    assert!(ledger.check_invariants());
}

#[test]
fn test_add_winnings_twice_is_already_claimed() {
    let mut ledger = funded(100);
    ledger.add_winnings(10, "pred-1", 2).unwrap();

    assert_eq!(
        ledger.add_winnings(10, "pred-1", 3),
        Err(LedgerError::AlreadyClaimed("pred-1".into()))
    );
}

#[test]
fn test_claim_guard_survives_history_truncation() {
    let mut ledger = funded(1000);
    ledger.add_winnings(10, "pred-1", 2).unwrap();
    for i in 0..HISTORY_LIMIT + 5 {
        ledger.deposit(1, None, 10 + i as u64).unwrap();
    }

    assert!(!ledger.history().iter().any(|t| t.is_winnings_for("pred-1")));
    assert!(ledger.has_claimed("pred-1"));
}

#[test]
fn test_settle_loss_forfeits_stake() {
    let mut ledger = funded(200);
    ledger.deduct_bet(50, "pred-1", "No", 2).unwrap();
    let tx = ledger.settle_loss("pred-1", 3).unwrap();

    assert_eq!(tx.kind, TransactionKind::Loss);
    assert_eq!(tx.amount, -50);
    assert_eq!(ledger.balance(), 150);
    assert_eq!(ledger.locked(), 0);
    assert_eq!(
        ledger.settle_loss("pred-1", 4),
        Err(LedgerError::NoOpenStake("pred-1".into()))
    );
}

// ============================================================================
// HISTORY
// ============================================================================

#[test]
fn test_history_newest_first_and_bounded() {
    let mut ledger = funded(1);
    for i in 0..150u64 {
        ledger.deposit(1, None, 100 + i).unwrap();
    }

    assert_eq!(ledger.history().len(), HISTORY_LIMIT);
    assert_eq!(ledger.history()[0].timestamp, 249);
    assert!(ledger
        .history()
        .windows(2)
        .all(|w| w[0].timestamp >= w[1].timestamp));
}

#[test]
fn test_transactions_filter_and_limit() {
    let mut ledger = funded(100);
    ledger.deduct_bet(5, "pred-1", "Yes", 2).unwrap();
    ledger.deduct_bet(5, "pred-2", "Yes", 3).unwrap();
    ledger.deposit(5, None, 4).unwrap();

    assert_eq!(ledger.transactions(20, Some(TransactionKind::Bet)).len(), 2);
    assert_eq!(ledger.transactions(1, None)[0].kind, TransactionKind::Deposit);
}

#[test]
fn test_invariant_holds_through_mixed_operations() {
    let mut ledger = funded(500);
    let dest = destination();

    let _ = ledger.deduct_bet(200, "m1", "Yes", 2);
    assert!(ledger.check_invariants());
    let _ = ledger.lock(400);
    assert!(ledger.check_invariants());
    let _ = ledger.withdraw(250, &dest, 3);
    assert!(ledger.check_invariants());
    ledger.unlock(1000);
    assert!(ledger.check_invariants());
    let _ = ledger.deduct_bet(300, "m2", "No", 4);
    assert!(ledger.check_invariants());
    let _ = ledger.settle_loss("m2", 5);
    assert!(ledger.check_invariants());
    let _ = ledger.add_winnings(20, "m1", 6);
    assert!(ledger.check_invariants());
    assert_eq!(ledger.available(), ledger.balance() - ledger.locked());
}
