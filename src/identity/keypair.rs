// Keypair - secp256k1 key material and payer address derivation
//
// address = Base58Check(0x00, HASH160(compressed public key))

use crate::identity::address::{encode_check, PAYER_VERSION};
use bitcoin::hashes::{hash160, Hash};
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeypairError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid key bytes: {0}")]
    InvalidBytes(String),
}

/// secp256k1 keypair backing a locally generated wallet
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secret, public }
    }

    /// Rebuild a keypair from 32 secret key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        if bytes.len() != 32 {
            return Err(KeypairError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| KeypairError::InvalidBytes(e.to_string()))?;
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(Self { secret, public })
    }

    /// Rebuild a keypair from its hex form as stored in the wallet record
    pub fn from_hex(encoded: &str) -> Result<Self, KeypairError> {
        let bytes = hex::decode(encoded).map_err(|e| KeypairError::InvalidBytes(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Secret key bytes, hex encoded
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Compressed SEC1 public key (33 bytes)
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    /// HASH160 (RIPEMD160 of SHA256) of the compressed public key
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160::Hash::hash(&self.public_key_bytes()).to_byte_array()
    }

    /// Payer address for this key
    pub fn address(&self) -> String {
        encode_check(&self.pubkey_hash(), PAYER_VERSION)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
