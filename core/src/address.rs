//! Link-layer node addressing
//!
//! Nodes are identified by the 6-byte MAC address of their radio
//! interface. The all-ones address is reserved for broadcast.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a node address on the wire
pub const ADDRESS_LEN: usize = 6;

/// Errors produced while parsing a textual address
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Expected 6 colon-separated octets, got {0}")]
    WrongOctetCount(usize),

    #[error("Invalid octet: {0:?}")]
    InvalidOctet(String),
}

/// 6-byte link-layer node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress([u8; ADDRESS_LEN]);

impl NodeAddress {
    /// Reserved all-ones address reaching every node in radio range
    pub const BROADCAST: NodeAddress = NodeAddress([0xFF; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Read an address from the first six bytes of `data`
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; ADDRESS_LEN] = data.get(..ADDRESS_LEN)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; ADDRESS_LEN]> for NodeAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    /// Parse `aa:bb:cc:dd:ee:ff` (also accepts `-` as separator)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.trim().split([':', '-']).collect();
        if octets.len() != ADDRESS_LEN {
            return Err(AddressError::WrongOctetCount(octets.len()));
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        for (slot, octet) in bytes.iter_mut().zip(octets) {
            if octet.len() != 2 {
                return Err(AddressError::InvalidOctet(octet.to_string()));
            }
            let decoded =
                hex::decode(octet).map_err(|_| AddressError::InvalidOctet(octet.to_string()))?;
            *slot = decoded[0];
        }

        Ok(Self(bytes))
    }
}
