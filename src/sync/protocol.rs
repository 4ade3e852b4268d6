// Wire Protocol - messages exchanged between peers
//
// UTF-8 JSON objects discriminated by `type`. Unknown types decode to
// `Message::Unknown` and are ignored by the engine.

use crate::market::Market;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol-related errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

/// Message type discriminator, mirroring the `type` field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Sync,
    Create,
    Vote,
    Resolve,
    Deposit,
    Verify,
    Unknown,
}

/// Full market snapshot exchange, sent on connect
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub markets: Vec<Market>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    pub market: Market,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteMessage {
    pub market_id: String,
    pub voter: String,
    pub choice: String,
    pub stake: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveMessage {
    pub market_id: String,
    pub outcome: String,
    pub resolved_by: String,
    pub timestamp: u64,
}

/// Informational only; peers never credit remote deposits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMessage {
    pub address: String,
    pub amount: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMessage {
    pub market_id: String,
    pub verifier: String,
    pub outcome: String,
    pub timestamp: u64,
}

/// Every message a peer can send
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Sync(SyncMessage),
    Create(CreateMessage),
    Vote(VoteMessage),
    Resolve(ResolveMessage),
    Deposit(DepositMessage),
    Verify(VerifyMessage),
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn sync(markets: Vec<Market>) -> Self {
        Message::Sync(SyncMessage { markets })
    }

    pub fn create(market: Market) -> Self {
        Message::Create(CreateMessage { market })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Sync(_) => MessageType::Sync,
            Message::Create(_) => MessageType::Create,
            Message::Vote(_) => MessageType::Vote,
            Message::Resolve(_) => MessageType::Resolve,
            Message::Deposit(_) => MessageType::Deposit,
            Message::Verify(_) => MessageType::Verify,
            Message::Unknown => MessageType::Unknown,
        }
    }

    /// Encode as a JSON frame body
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    /// Decode a JSON frame body
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }
}
