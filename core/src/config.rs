//! Node configuration
//!
//! Process-wide protocol constants. Nothing is persisted: the routing table
//! is rebuilt from the local entry on every start.

use crate::frame::max_payload_len;
use crate::routing::Advertisement;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during config validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid table capacity: must hold the local entry and at least one more, got {0}")]
    InvalidTableCapacity(usize),

    #[error("Invalid broadcast period: must be > 0 ms")]
    InvalidBroadcastPeriod,

    #[error("Invalid datagram size: {got} bytes cannot carry an advertisement (need {need})")]
    DatagramTooSmall { got: usize, need: usize },

    #[error("Invalid queue capacity for {0}: must be > 0")]
    InvalidQueueCapacity(&'static str),
}

/// Protocol constants for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Routing table capacity N, including the local entry
    pub table_capacity: usize,

    /// Broadcast period T in milliseconds
    pub broadcast_period_ms: u64,

    /// Largest datagram the radio accepts
    pub max_datagram_size: usize,

    /// Link events buffered between the radio callbacks and the protocol task
    pub event_queue_capacity: usize,

    /// Pending application requests buffered for the protocol task
    pub command_queue_capacity: usize,

    /// Application notifications buffered before they are dropped
    pub notification_queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            table_capacity: 10,
            broadcast_period_ms: 5000,
            max_datagram_size: 250, // ESP-NOW payload limit
            event_queue_capacity: 6,
            command_queue_capacity: 16,
            notification_queue_capacity: 64,
        }
    }
}

impl NodeConfig {
    /// Validate configuration constants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_capacity < 2 {
            return Err(ConfigError::InvalidTableCapacity(self.table_capacity));
        }

        if self.broadcast_period_ms == 0 {
            return Err(ConfigError::InvalidBroadcastPeriod);
        }

        if max_payload_len(self.max_datagram_size) < Advertisement::WIRE_LEN {
            return Err(ConfigError::DatagramTooSmall {
                got: self.max_datagram_size,
                need: Advertisement::WIRE_LEN + crate::frame::FRAME_OVERHEAD,
            });
        }

        if self.event_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity("events"));
        }
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity("commands"));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity("notifications"));
        }

        Ok(())
    }

    /// Broadcast period T
    pub fn broadcast_period(&self) -> Duration {
        Duration::from_millis(self.broadcast_period_ms)
    }

    /// Direct neighbors silent for longer than this are poisoned (2T)
    pub fn stale_timeout(&self) -> Duration {
        self.broadcast_period() * 2
    }

    /// Delay between consecutive incremental updates (T / N)
    pub fn pacing_delay(&self) -> Duration {
        self.broadcast_period() / self.table_capacity.max(1) as u32
    }
}
