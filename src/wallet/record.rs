// Wallet record file - JSON persistence of the ledger
//
// Generated wallets live in `wallet.json`; connected external wallets in
// `wallet_<address>.json` so switching identities keeps both histories.

use crate::wallet::ledger::Ledger;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Wallet file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wallet file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Wallet file is inconsistent: {0}")]
    Inconsistent(String),
}

/// Location of a persisted ledger
#[derive(Clone, Debug)]
pub struct WalletFile {
    path: PathBuf,
}

impl WalletFile {
    /// The default wallet in a data directory
    pub fn primary(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("wallet.json"),
        }
    }

    /// The wallet file for a connected external address
    pub fn for_address(data_dir: &Path, address: &str) -> Self {
        Self {
            path: data_dir.join(format!("wallet_{}.json", address)),
        }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the ledger if the file exists.
    ///
    /// A record whose locked amount exceeds its balance is refused.
    pub fn load(&self) -> Result<Option<Ledger>, RecordError> {
        if !self.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let ledger: Ledger = serde_json::from_str(&raw)?;
        if !ledger.check_invariants() {
            return Err(RecordError::Inconsistent(format!(
                "locked {} exceeds balance {}",
                ledger.locked(),
                ledger.balance()
            )));
        }
        Ok(Some(ledger))
    }

    /// Write the ledger, replacing the previous file atomically
    pub fn save(&self, ledger: &Ledger) -> Result<(), RecordError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(ledger)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
