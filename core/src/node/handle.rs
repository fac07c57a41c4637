//! Application-side handle to a running node task

use super::NodeError;
use crate::address::NodeAddress;
use crate::routing::{Route, RoutingEntry};
use tokio::sync::mpsc;

/// Requests accepted by the node task
#[derive(Debug)]
pub enum NodeCommand {
    /// Originate a user message
    SendUserMessage {
        destination: NodeAddress,
        payload: Vec<u8>,
        reply: mpsc::Sender<Result<(), NodeError>>,
    },
    /// Copy of the routing table, local entry first
    RoutingTable {
        reply: mpsc::Sender<Vec<RoutingEntry>>,
    },
    /// Next hop toward a destination
    Lookup {
        destination: NodeAddress,
        reply: mpsc::Sender<Option<Route>>,
    },
    /// Stop the node task
    Shutdown { reply: mpsc::Sender<()> },
}

/// Handle to communicate with a running node task
#[derive(Debug, Clone)]
pub struct NodeHandle {
    address: NodeAddress,
    command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    pub(crate) fn new(address: NodeAddress, command_tx: mpsc::Sender<NodeCommand>) -> Self {
        Self {
            address,
            command_tx,
        }
    }

    /// Address of the node this handle drives
    pub fn address(&self) -> NodeAddress {
        self.address
    }

    /// Send `payload` to `destination`, or to every neighbor when
    /// `destination` is the broadcast address
    pub async fn send_user_message(
        &self,
        destination: NodeAddress,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::SendUserMessage {
                destination,
                payload: payload.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::Stopped)?;

        reply_rx.recv().await.ok_or(NodeError::Stopped)?
    }

    /// Current routing table
    pub async fn routing_table(&self) -> Result<Vec<RoutingEntry>, NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::RoutingTable { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Stopped)?;

        reply_rx.recv().await.ok_or(NodeError::Stopped)
    }

    /// Next hop toward `destination`, if it is currently reachable
    pub async fn lookup(&self, destination: NodeAddress) -> Result<Option<Route>, NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::Lookup {
                destination,
                reply: reply_tx,
            })
            .await
            .map_err(|_| NodeError::Stopped)?;

        reply_rx.recv().await.ok_or(NodeError::Stopped)
    }

    /// Stop the node task and wait until it has acknowledged
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(NodeCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| NodeError::Stopped)?;

        reply_rx.recv().await.ok_or(NodeError::Stopped)
    }
}
