//! In-process broadcast medium
//!
//! Stands in for the radio when running several nodes in one process.
//! Nodes only hear the neighbors they are linked to; links can be cut and
//! restored at runtime to exercise neighbor loss and recovery.

use crate::address::NodeAddress;
use crate::config::NodeConfig;
use crate::node::{Node, NodeError, NodeEvent, NodeHandle};
use crate::transport::{
    event_queue, DatagramService, EventQueue, EventSink, LinkError, SendStatus, Transport,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct MediumState {
    sinks: HashMap<NodeAddress, EventSink>,
    /// Undirected links, stored with the smaller address first
    links: BTreeSet<(NodeAddress, NodeAddress)>,
}

fn link_key(a: NodeAddress, b: NodeAddress) -> (NodeAddress, NodeAddress) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl MediumState {
    fn is_linked(&self, a: NodeAddress, b: NodeAddress) -> bool {
        self.links.contains(&link_key(a, b))
    }

    fn neighbors_of(&self, address: NodeAddress) -> Vec<NodeAddress> {
        self.links
            .iter()
            .filter_map(|&(a, b)| {
                if a == address {
                    Some(b)
                } else if b == address {
                    Some(a)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Shared radio medium connecting simulated nodes
#[derive(Clone, Default)]
pub struct Medium {
    state: Arc<RwLock<MediumState>>,
}

impl Medium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a radio for `address` on the medium
    ///
    /// Returns the datagram service to give the node's transport and the
    /// queue its received frames and send completions arrive on.
    pub fn attach(&self, address: NodeAddress, queue_capacity: usize) -> (SimLink, EventQueue) {
        let (sink, queue) = event_queue(queue_capacity);
        self.state.write().sinks.insert(address, sink);
        debug!("Attached {} to the medium", address);

        let link = SimLink {
            address,
            medium: self.clone(),
            peers: Mutex::new(HashSet::new()),
        };
        (link, queue)
    }

    /// Build a node on the medium and spawn its task
    pub fn spawn_node(&self, config: NodeConfig, address: NodeAddress) -> Result<SimNode, NodeError> {
        let (link, queue) = self.attach(address, config.event_queue_capacity);
        let transport = Arc::new(Transport::new(link, config.max_datagram_size));
        let (node, events) = Node::new(config, address, transport)?;
        let handle = node.spawn(queue);
        Ok(SimNode { handle, events })
    }

    /// Make `a` and `b` hear each other
    pub fn link(&self, a: NodeAddress, b: NodeAddress) {
        if a != b {
            self.state.write().links.insert(link_key(a, b));
            debug!("Linked {} <-> {}", a, b);
        }
    }

    /// Cut the link between `a` and `b`
    pub fn unlink(&self, a: NodeAddress, b: NodeAddress) {
        if self.state.write().links.remove(&link_key(a, b)) {
            debug!("Unlinked {} <-> {}", a, b);
        }
    }

    pub fn is_linked(&self, a: NodeAddress, b: NodeAddress) -> bool {
        self.state.read().is_linked(a, b)
    }

    pub fn neighbors_of(&self, address: NodeAddress) -> Vec<NodeAddress> {
        self.state.read().neighbors_of(address)
    }

    /// Link consecutive addresses: a - b - c - ...
    pub fn connect_line(&self, addresses: &[NodeAddress]) {
        for pair in addresses.windows(2) {
            self.link(pair[0], pair[1]);
        }
    }

    /// Line topology with the last address linked back to the first
    pub fn connect_ring(&self, addresses: &[NodeAddress]) {
        self.connect_line(addresses);
        if let (Some(&first), Some(&last)) = (addresses.first(), addresses.last()) {
            if addresses.len() > 2 {
                self.link(last, first);
            }
        }
    }

    /// Link every pair of addresses
    pub fn connect_full(&self, addresses: &[NodeAddress]) {
        for (i, &a) in addresses.iter().enumerate() {
            for &b in &addresses[i + 1..] {
                self.link(a, b);
            }
        }
    }

    /// Deliver `datagram` from `source` and report the completion back
    fn transmit(&self, source: NodeAddress, destination: NodeAddress, datagram: &[u8]) {
        let (receivers, own_sink) = {
            let state = self.state.read();
            let targets = if destination.is_broadcast() {
                state.neighbors_of(source)
            } else if state.is_linked(source, destination) {
                vec![destination]
            } else {
                Vec::new()
            };
            let receivers: Vec<EventSink> = targets
                .iter()
                .filter_map(|target| state.sinks.get(target).cloned())
                .collect();
            (receivers, state.sinks.get(&source).cloned())
        };

        let mut delivered = 0;
        for sink in &receivers {
            match sink.notify_received(source, datagram) {
                Ok(()) => delivered += 1,
                Err(err) => trace!("Datagram from {} lost: {}", source, err),
            }
        }

        let status = if delivered > 0 {
            SendStatus::Success
        } else {
            SendStatus::Failed
        };
        if let Some(sink) = own_sink {
            if let Err(err) = sink.notify_sent(destination, status) {
                trace!("Send completion for {} lost: {}", source, err);
            }
        }
    }
}

/// Datagram service of one node attached to a [`Medium`]
pub struct SimLink {
    address: NodeAddress,
    medium: Medium,
    peers: Mutex<HashSet<NodeAddress>>,
}

impl SimLink {
    pub fn address(&self) -> NodeAddress {
        self.address
    }
}

impl DatagramService for SimLink {
    fn is_peer_registered(&self, peer: &NodeAddress) -> bool {
        self.peers.lock().contains(peer)
    }

    fn register_peer(&self, peer: NodeAddress, _encrypt: bool) -> Result<(), LinkError> {
        self.peers.lock().insert(peer);
        Ok(())
    }

    fn send(&self, destination: NodeAddress, datagram: &[u8]) -> Result<(), LinkError> {
        if !self.is_peer_registered(&destination) {
            return Err(LinkError::UnknownPeer(destination));
        }
        self.medium.transmit(self.address, destination, datagram);
        Ok(())
    }
}

/// A spawned node on the medium
pub struct SimNode {
    pub handle: NodeHandle,
    pub events: mpsc::Receiver<NodeEvent>,
}
