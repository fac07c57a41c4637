// DSDV Mesh Core: destination-sequenced distance-vector routing over a
// one-hop broadcast datagram radio
//
// Every node periodically advertises itself, merges what its neighbors
// advertise, and forwards user messages hop by hop toward their
// destination.

pub mod address;
pub mod config;
pub mod frame;
pub mod message;
pub mod node;
pub mod routing;
pub mod sim;
pub mod transport;

pub use address::{AddressError, NodeAddress};
pub use config::{ConfigError, NodeConfig};
pub use frame::{Frame, FrameError, FrameKind};
pub use message::UserMessage;
pub use node::{Node, NodeError, NodeEvent, NodeHandle};
pub use routing::{
    Advertisement, MergeOutcome, Route, RoutingEngine, RoutingEntry, RoutingError, RoutingTable,
    TableDisplay, UNREACHABLE,
};
pub use sim::{Medium, SimLink, SimNode};
pub use transport::{
    event_queue, DatagramService, EventQueue, EventSink, LinkError, LinkEvent, SendStatus,
    Transport, TransportError,
};
