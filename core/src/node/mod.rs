//! Protocol driver: owns the routing engine and runs the DSDV cycle
//!
//! One tokio task per node serializes everything that touches the routing
//! table: periodic broadcasts, incremental updates, neighbor timeouts,
//! received frames and application requests. The application talks to
//! it through a cloneable [`NodeHandle`] and listens for [`NodeEvent`]s.

pub mod driver;
pub mod handle;

pub use driver::Node;
pub use handle::{NodeCommand, NodeHandle};

use crate::address::NodeAddress;
use crate::config::ConfigError;
use crate::transport::TransportError;
use thiserror::Error;

/// Protocol driver errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Refusing to send a message to ourselves")]
    SelfSend,

    #[error("No route to {0}")]
    NoRoute(NodeAddress),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Node task not running")]
    Stopped,
}

/// Notifications from the protocol task to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A user message addressed to this node (or broadcast) arrived
    MessageDelivered {
        /// Neighbor the frame arrived from
        from: NodeAddress,
        /// Final destination carried in the message
        destination: NodeAddress,
        payload: Vec<u8>,
    },

    /// A direct neighbor went silent and was marked unreachable
    NeighborLost(NodeAddress),
}
