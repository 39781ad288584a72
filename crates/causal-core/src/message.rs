//! Chat messages and their wire format.
//!
//! On the wire a message is a JSON object:
//!
//! ```text
//! {"sender_id": "0", "content": "Hello from Node 0!", "timestamp": {"0": 1, "1": 0, "2": 0}}
//! ```
//!
//! Unknown fields are ignored when decoding. Counters must be non-negative
//! integers; anything else is malformed.

use crate::clock::Timestamp;
use crate::process::{Membership, ProcessId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting messages to and from their wire form.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// An immutable chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "sender_id")]
    sender: ProcessId,
    content: String,
    #[serde(rename = "timestamp")]
    stamp: Timestamp,
}

impl Message {
    pub fn new(sender: ProcessId, content: impl Into<String>, stamp: Timestamp) -> Self {
        Self {
            sender,
            content: content.into(),
            stamp,
        }
    }

    pub fn sender(&self) -> &ProcessId {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn stamp(&self) -> &Timestamp {
        &self.stamp
    }

    /// Identity used for deduplication, normalized to `membership`.
    pub fn id(&self, membership: &Membership) -> MessageId {
        MessageId {
            sender: self.sender.clone(),
            stamp: self.stamp.restricted_to(membership),
        }
    }

    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    /// Parse a message from its JSON wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Malformed)
    }
}

/// Identity of a message: its sender and the stamp it was sent with.
///
/// Two sends can never share an identity, since every send advances the
/// sender's own counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub sender: ProcessId,
    pub stamp: Timestamp,
}
