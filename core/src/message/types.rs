// User message type

use crate::address::NodeAddress;

/// An opaque application payload addressed to one node (or broadcast)
///
/// Intermediate nodes forward the encoded message unchanged; only the
/// destination is inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub destination: NodeAddress,
    pub payload: Vec<u8>,
}

impl UserMessage {
    pub fn new(destination: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination,
            payload: payload.into(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination.is_broadcast()
    }
}
