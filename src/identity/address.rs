// Address Codec - Base58Check identifiers
//
// version byte || payload || first 4 bytes of SHA256(SHA256(version || payload)),
// rendered in the Bitcoin base58 alphabet. Bit-compatible with standard wallets.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version byte for standard payer (P2PKH-style) addresses
pub const PAYER_VERSION: u8 = 0x00;
/// Version byte reserved for script-hash-style addresses
pub const SCRIPT_VERSION: u8 = 0x05;

const CHECKSUM_LEN: usize = 4;

/// Errors from address encoding and decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid character '{character}' at position {index}")]
    InvalidCharacter { character: char, index: usize },

    #[error("Invalid checksum")]
    InvalidChecksum,

    #[error("Identifier too short: {0} bytes")]
    TooShort(usize),

    #[error("Unsupported address version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("Invalid address format: {0}")]
    InvalidFormat(String),
}

/// A decoded Base58Check identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub version: u8,
    pub payload: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(first);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&second[..CHECKSUM_LEN]);
    out
}

/// Encode a payload under the given version byte
pub fn encode_check(payload: &[u8], version: u8) -> String {
    let mut bytes = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    bytes.push(version);
    bytes.extend_from_slice(payload);
    let sum = checksum(&bytes);
    bytes.extend_from_slice(&sum);
    bs58::encode(bytes).into_string()
}

/// Decode an identifier, verifying its trailing checksum
pub fn decode_check(identifier: &str) -> Result<Decoded, AddressError> {
    let bytes = bs58::decode(identifier).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, index } => {
            AddressError::InvalidCharacter { character, index }
        }
        bs58::decode::Error::NonAsciiCharacter { index } => AddressError::InvalidCharacter {
            character: identifier[index..].chars().next().unwrap_or('?'),
            index,
        },
        other => AddressError::InvalidFormat(other.to_string()),
    })?;

    if bytes.len() < 1 + CHECKSUM_LEN {
        return Err(AddressError::TooShort(bytes.len()));
    }

    let (body, sum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if checksum(body) != sum {
        return Err(AddressError::InvalidChecksum);
    }

    Ok(Decoded {
        version: body[0],
        payload: body[1..].to_vec(),
    })
}

// ============================================================================
// VALIDATION
// ============================================================================

fn is_bech32_like(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    let body = lower
        .strip_prefix("trac1")
        .or_else(|| lower.strip_prefix("bc1"));
    match body {
        Some(rest) => {
            (39..=59).contains(&rest.len())
                && rest.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        }
        None => false,
    }
}

/// Validate a destination or external wallet address.
///
/// `bc1`/`trac1` identifiers are accepted by pattern only. Everything else
/// must be a checksum-valid Base58Check string with a payer or script version.
pub fn validate_address(address: &str) -> Result<(), AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::InvalidFormat("empty address".into()));
    }
    if is_bech32_like(address) {
        return Ok(());
    }

    let decoded = decode_check(address)?;
    match decoded.version {
        PAYER_VERSION | SCRIPT_VERSION => Ok(()),
        other => Err(AddressError::UnsupportedVersion(other)),
    }
}

/// Convenience predicate over [`validate_address`]
pub fn is_valid_address(address: &str) -> bool {
    validate_address(address).is_ok()
}
