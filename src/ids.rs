// Identifiers - random prefixed ids for transactions, markets and deposits

use rand::RngCore;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// `tx-` followed by 12 hex chars
pub fn transaction_id() -> String {
    format!("tx-{}", random_hex(6))
}

/// `pred-` followed by 12 hex chars
pub fn market_id() -> String {
    format!("pred-{}", random_hex(6))
}

/// Reference attached to deposits that arrive without an external hash
pub fn deposit_reference() -> String {
    format!("trac-{}", random_hex(8))
}
