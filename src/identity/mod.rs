// Identity module - WHO YOU ARE
// Handles Base58Check addresses and the key material behind a local wallet

pub mod address;
mod keypair;

pub use address::{
    decode_check, encode_check, is_valid_address, validate_address, AddressError, Decoded,
    PAYER_VERSION, SCRIPT_VERSION,
};
pub use keypair::{Keypair, KeypairError};
