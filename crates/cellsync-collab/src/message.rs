//! Messages exchanged between collaborating clients.
//!
//! Every message travels inside an [`Envelope`] whose `seq` is assigned by
//! the broker; that sequence is the single total order all clients agree on.

use cellsync_core::{ClientId, Position};
use cellsync_history::Command;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollabError;

/// Broker-assigned position in the shared message order
pub type Seq = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A document command, applied by every client in `seq` order
    Command {
        message_id: Uuid,
        client: ClientId,
        /// Last `seq` the sender had applied when it issued the command
        base_revision: Seq,
        command: Command,
    },
    /// Where a client's cursor is; the newest one wins
    Presence {
        client: ClientId,
        name: String,
        position: Position,
        base_revision: Seq,
    },
    Join {
        client: ClientId,
        name: String,
    },
    Leave {
        client: ClientId,
    },
}

impl Message {
    pub fn client(&self) -> &ClientId {
        match self {
            Message::Command { client, .. }
            | Message::Presence { client, .. }
            | Message::Join { client, .. }
            | Message::Leave { client } => client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: Seq,
    pub message: Message,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, CollabError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CollabError> {
        Ok(serde_json::from_str(json)?)
    }
}
