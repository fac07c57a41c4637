//! Routing entries and their advertisement wire form

use crate::address::{NodeAddress, ADDRESS_LEN};
use crate::frame::{FrameError, FrameKind};
use std::time::Instant;

/// Hop count of the local node's own entry
pub const SELF_HOP_COUNT: u8 = 0;

/// Hop count sentinel marking a destination unreachable
pub const UNREACHABLE: u8 = u8::MAX;

/// One destination's best known path
///
/// Sequence numbers are even while the destination is reachable and odd
/// while a withdrawal is propagating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    pub hop_count: u8,
    pub sequence: u16,
    /// Local monotonic time of the last adoption or refresh
    pub last_update: Instant,
}

impl RoutingEntry {
    /// The local node's own entry (hop 0, next hop = self)
    pub fn local(address: NodeAddress, now: Instant) -> Self {
        Self {
            destination: address,
            next_hop: address,
            hop_count: SELF_HOP_COUNT,
            sequence: 0,
            last_update: now,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.hop_count != UNREACHABLE
    }

    pub fn is_direct_neighbor(&self) -> bool {
        self.hop_count == 1
    }

    /// Odd sequence: a withdrawal of this destination is in progress
    pub fn is_withdrawn(&self) -> bool {
        self.sequence % 2 == 1
    }

    pub fn advertisement(&self) -> Advertisement {
        Advertisement {
            destination: self.destination,
            next_hop: self.next_hop,
            hop_count: self.hop_count,
            sequence: self.sequence,
        }
    }
}

/// Routing entry as carried in an advertisement frame
///
/// Format (15 bytes):
/// [6] destination
/// [6] next hop of the advertiser
/// [1] hop count from the advertiser
/// [2] sequence number (LE u16)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertisement {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    pub hop_count: u8,
    pub sequence: u16,
}

impl Advertisement {
    pub const WIRE_LEN: usize = 2 * ADDRESS_LEN + 1 + 2;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[..ADDRESS_LEN].copy_from_slice(self.destination.as_bytes());
        buf[ADDRESS_LEN..2 * ADDRESS_LEN].copy_from_slice(self.next_hop.as_bytes());
        buf[2 * ADDRESS_LEN] = self.hop_count;
        buf[2 * ADDRESS_LEN + 1..].copy_from_slice(&self.sequence.to_le_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        let malformed = || FrameError::MalformedPayload {
            kind: FrameKind::Advertisement,
            len: data.len(),
        };
        if data.len() != Self::WIRE_LEN {
            return Err(malformed());
        }

        let destination = NodeAddress::from_slice(data).ok_or_else(malformed)?;
        let next_hop = NodeAddress::from_slice(&data[ADDRESS_LEN..]).ok_or_else(malformed)?;
        let hop_count = data[2 * ADDRESS_LEN];
        let sequence = u16::from_le_bytes([data[2 * ADDRESS_LEN + 1], data[2 * ADDRESS_LEN + 2]]);

        Ok(Self {
            destination,
            next_hop,
            hop_count,
            sequence,
        })
    }
}
