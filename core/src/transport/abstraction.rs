//! Datagram link abstraction
//!
//! Defines the contract of the one-hop broadcast radio service the node
//! runs on, and the notifications that service reports back.

use crate::address::NodeAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures reported by the underlying datagram service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Peer {0} is not registered")]
    UnknownPeer(NodeAddress),

    #[error("Failed to register peer {peer}: {reason}")]
    PeerRegistration { peer: NodeAddress, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// One-hop datagram service (radio driver) collaborator
///
/// `send` only hands the datagram to the radio; the completion is reported
/// later through [`super::EventSink::notify_sent`]. Received datagrams are
/// reported through [`super::EventSink::notify_received`].
#[cfg_attr(test, mockall::automock)]
pub trait DatagramService: Send + Sync {
    /// Whether `peer` is already in the service's peer list
    fn is_peer_registered(&self, peer: &NodeAddress) -> bool;

    /// Add `peer` to the peer list, with link-layer encryption if `encrypt`
    fn register_peer(&self, peer: NodeAddress, encrypt: bool) -> Result<(), LinkError>;

    /// Hand one datagram to the radio
    fn send(&self, destination: NodeAddress, datagram: &[u8]) -> Result<(), LinkError>;
}

/// Outcome of a datagram handed to the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendStatus {
    Success,
    Failed,
}

/// Notifications from the datagram service, as queued for the protocol task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A datagram arrived from `source`
    Received { source: NodeAddress, data: Vec<u8> },
    /// A previously sent datagram completed
    SendCompleted {
        destination: NodeAddress,
        status: SendStatus,
    },
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::Received { source, data } => {
                write!(f, "Received {{ source: {}, data_len: {} }}", source, data.len())
            }
            LinkEvent::SendCompleted {
                destination,
                status,
            } => write!(
                f,
                "SendCompleted {{ destination: {}, status: {:?} }}",
                destination, status
            ),
        }
    }
}
