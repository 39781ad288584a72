//! Error types for the causal SDK.

use causal_core::{MembershipError, Message, ProcessId, WireError};
use thiserror::Error;

/// Errors raised by a transport endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport already has a subscriber")]
    AlreadySubscribed,

    #[error("No endpoint for process {0}")]
    UnknownEndpoint(ProcessId),
}

/// Error type for SDK operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// The node has shut down.
    #[error("node stopped")]
    NodeStopped,

    /// The message was delivered locally but could not be published.
    #[error("Broadcast failed for message from {}: {source}", .message.sender())]
    Broadcast {
        message: Message,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Membership(#[from] MembershipError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("Unknown node: {0}")]
    UnknownNode(ProcessId),

    /// The process already ran in this session and its clock is gone.
    #[error("Node {0} has left the session and cannot rejoin")]
    Departed(ProcessId),
}

impl SdkError {
    /// The locally delivered message carried by a failed broadcast.
    pub fn delivered_message(&self) -> Option<&Message> {
        match self {
            SdkError::Broadcast { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
