// Sync module - HOW NODES CONVERGE
// Handles wire messages, the snapshot merge policy, inbound dispatch and peers

mod engine;
mod merge;
mod peer;
mod protocol;

pub use engine::{MergeEngine, MergeError, MergeEvent, MergeStats};
pub use merge::{last_writer_wins, LastWriterWins, MergeDecision, MergeOutcome, MergePolicy};
pub use peer::{PeerInfo, PeerRegistry, PeerState, PeerStats};
pub use protocol::{
    CreateMessage, DepositMessage, Message, MessageType, ProtocolError, ResolveMessage,
    SyncMessage, VerifyMessage, VoteMessage,
};
