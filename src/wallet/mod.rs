// Wallet module - WHAT YOU OWN
// Handles the local ledger, its transaction history and the wallet file

mod ledger;
mod record;
mod transaction;

pub use ledger::{
    winnings_fee, Ledger, LedgerError, LedgerInfo, DEFAULT_WELCOME_BONUS, HISTORY_LIMIT,
    MAX_DEPOSIT, MIN_DEPOSIT, WINNINGS_FEE_BPS,
};
pub use record::{RecordError, WalletFile};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
