//! The node task: periodic DSDV cycle, frame handling and the user send API

use super::handle::{NodeCommand, NodeHandle};
use super::{NodeError, NodeEvent};
use crate::address::NodeAddress;
use crate::config::NodeConfig;
use crate::frame::{Frame, FrameKind};
use crate::message::{decode_user_message, encode_user_message, UserMessage};
use crate::routing::{Advertisement, RoutingEngine, RoutingEntry};
use crate::transport::{dispatch, DatagramService, EventQueue, FrameHandler, Transport};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Current time on the tokio clock (pausable in tests)
fn now() -> Instant {
    time::Instant::now().into_std()
}

/// One DSDV node: routing engine, outbound transport and notification sink
pub struct Node<L> {
    config: NodeConfig,
    engine: RoutingEngine,
    transport: Arc<Transport<L>>,
    notifications: mpsc::Sender<NodeEvent>,
    /// Changed entries of the current cycle not yet sent to the neighbors
    pending_updates: VecDeque<(usize, RoutingEntry)>,
    /// When the next pending update goes out
    next_update_at: time::Instant,
}

impl<L: DatagramService> Node<L> {
    /// Build a node whose table holds only its own entry
    ///
    /// Returns the node and the receiver for its [`NodeEvent`]s.
    pub fn new(
        config: NodeConfig,
        local: NodeAddress,
        transport: Arc<Transport<L>>,
    ) -> Result<(Self, mpsc::Receiver<NodeEvent>), NodeError> {
        config.validate()?;

        let (notifications, notifications_rx) = mpsc::channel(config.notification_queue_capacity);
        let engine = RoutingEngine::new(local, config.table_capacity, now());

        Ok((
            Self {
                config,
                engine,
                transport,
                notifications,
                pending_updates: VecDeque::new(),
                next_update_at: time::Instant::now(),
            },
            notifications_rx,
        ))
    }

    pub fn local_address(&self) -> NodeAddress {
        self.engine.local_address()
    }

    pub fn engine(&self) -> &RoutingEngine {
        &self.engine
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Originate a user message
    ///
    /// Broadcast messages go out unencrypted without a route lookup. Unicast
    /// messages are sent encrypted to the next hop toward `destination`.
    pub fn send_user_message(
        &self,
        destination: NodeAddress,
        payload: &[u8],
    ) -> Result<(), NodeError> {
        if destination == self.local_address() {
            return Err(NodeError::SelfSend);
        }

        let encoded = encode_user_message(&UserMessage::new(destination, payload));

        if destination.is_broadcast() {
            self.transport
                .send(NodeAddress::BROADCAST, &encoded, false, FrameKind::UserData)?;
            info!("Broadcast user message ({} bytes)", payload.len());
            return Ok(());
        }

        let route = self
            .engine
            .lookup(&destination)
            .ok_or(NodeError::NoRoute(destination))?;

        self.transport
            .send(route.next_hop, &encoded, true, FrameKind::UserData)?;
        info!(
            "Sent user message for {} via {} ({} hops)",
            destination, route.next_hop, route.hop_count
        );
        Ok(())
    }

    /// Spawn the node task, returning a handle to it
    pub fn spawn(self, events: EventQueue) -> NodeHandle
    where
        L: 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_queue_capacity);
        let handle = NodeHandle::new(self.local_address(), command_tx);
        tokio::spawn(self.run(events, command_rx));
        handle
    }

    /// Changed entries still waiting for their paced send
    pub fn pending_updates(&self) -> usize {
        self.pending_updates.len()
    }

    /// Drive the node until shut down or every handle is dropped
    ///
    /// Incremental updates are paced by their own timer arm, so received
    /// frames and application requests keep being served between them.
    pub async fn run(mut self, mut events: EventQueue, mut commands: mpsc::Receiver<NodeCommand>) {
        let mut ticker = time::interval(self.config.broadcast_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Node {} started (period {:?}, capacity {})",
            self.local_address(),
            self.config.broadcast_period(),
            self.config.table_capacity
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle();
                }

                _ = time::sleep_until(self.next_update_at), if !self.pending_updates.is_empty() => {
                    self.send_next_update();
                }

                Some(event) = events.recv() => {
                    dispatch(event, &mut self);
                }

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!("Node {} stopped", self.local_address());
    }

    /// Returns false once the task should stop
    async fn handle_command(&mut self, command: NodeCommand) -> bool {
        match command {
            NodeCommand::SendUserMessage {
                destination,
                payload,
                reply,
            } => {
                let result = self.send_user_message(destination, &payload);
                if let Err(err) = &result {
                    warn!("User message to {} not sent: {}", destination, err);
                }
                let _ = reply.send(result).await;
            }

            NodeCommand::RoutingTable { reply } => {
                let _ = reply.send(self.engine.table().entries().to_vec()).await;
            }

            NodeCommand::Lookup { destination, reply } => {
                let _ = reply.send(self.engine.lookup(&destination)).await;
            }

            NodeCommand::Shutdown { reply } => {
                let _ = reply.send(()).await;
                return false;
            }
        }
        true
    }

    /// Start one broadcast period: own advertisement, then queue every
    /// entry that changed since it was last advertised
    ///
    /// The queued entries go out one per T/N slot after the broadcast, and
    /// the neighbor timeout sweep runs once the last of them is sent.
    fn run_cycle(&mut self) {
        if !self.pending_updates.is_empty() {
            debug!(
                "{} updates from the previous period still queued, recomputing",
                self.pending_updates.len()
            );
            self.pending_updates.clear();
        }

        let advertisement = self.engine.advance_local_sequence();
        if let Err(err) = self.transport.send(
            NodeAddress::BROADCAST,
            &advertisement.to_bytes(),
            false,
            FrameKind::Advertisement,
        ) {
            warn!("Periodic broadcast failed: {}", err);
        }

        self.pending_updates = self.engine.changed_since_snapshot().into();
        if self.pending_updates.is_empty() {
            self.finish_cycle();
        } else {
            self.next_update_at = time::Instant::now() + self.config.pacing_delay();
        }
    }

    /// Send the next queued entry to each direct neighbor and record it
    fn send_next_update(&mut self) {
        let Some((index, entry)) = self.pending_updates.pop_front() else {
            return;
        };

        let payload = entry.advertisement().to_bytes();
        for neighbor in self.engine.direct_neighbors() {
            if let Err(err) = self
                .transport
                .send(neighbor, &payload, true, FrameKind::Advertisement)
            {
                warn!(
                    "Update for {} to neighbor {} failed: {}",
                    entry.destination, neighbor, err
                );
            }
        }
        self.engine.record_advertised(index, entry);

        if self.pending_updates.is_empty() {
            self.finish_cycle();
        } else {
            self.next_update_at += self.config.pacing_delay();
        }
    }

    /// Close the period: poison silent neighbors and dump the table
    fn finish_cycle(&mut self) {
        let lost = self.engine.sweep_stale(now(), self.config.stale_timeout());
        for neighbor in lost {
            info!("Neighbor {} timed out, marked unreachable", neighbor);
            self.notify(NodeEvent::NeighborLost(neighbor));
        }

        debug!(
            "Routing table of {}:\n{}",
            self.local_address(),
            self.engine.table().display_at(now())
        );
    }

    fn handle_advertisement(&mut self, source: NodeAddress, payload: &[u8]) {
        let advertisement = match Advertisement::from_bytes(payload) {
            Ok(advertisement) => advertisement,
            Err(err) => {
                warn!("Ignoring advertisement from {}: {}", source, err);
                return;
            }
        };

        match self.engine.merge(&advertisement, source, now()) {
            Ok(outcome) => trace!(
                "Advertisement for {} from {}: {:?}",
                advertisement.destination,
                source,
                outcome
            ),
            Err(err) => warn!(
                "Dropping advertisement for {} from {}: {}",
                advertisement.destination, source, err
            ),
        }
    }

    fn handle_user_data(&mut self, source: NodeAddress, payload: &[u8]) {
        let message = match decode_user_message(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("Ignoring user message from {}: {}", source, err);
                return;
            }
        };

        if message.destination == self.local_address() || message.is_broadcast() {
            info!(
                "Received user message from {} ({} bytes)",
                source,
                message.payload.len()
            );
            self.notify(NodeEvent::MessageDelivered {
                from: source,
                destination: message.destination,
                payload: message.payload,
            });
            return;
        }

        match self.engine.lookup(&message.destination) {
            Some(route) => {
                debug!(
                    "Forwarding user message for {} via {}",
                    message.destination, route.next_hop
                );
                if let Err(err) =
                    self.transport
                        .send(route.next_hop, payload, true, FrameKind::UserData)
                {
                    warn!(
                        "Forwarding to {} via {} failed: {}",
                        message.destination, route.next_hop, err
                    );
                }
            }
            None => warn!(
                "No route to {}, dropping user message from {}",
                message.destination, source
            ),
        }
    }

    fn notify(&self, event: NodeEvent) {
        match self.notifications.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Notification queue full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                trace!("No listener for node notifications");
            }
        }
    }
}

impl<L: DatagramService> FrameHandler for Node<L> {
    fn on_frame(&mut self, source: NodeAddress, frame: Frame) {
        match frame.kind {
            FrameKind::Advertisement => self.handle_advertisement(source, &frame.payload),
            FrameKind::UserData => self.handle_user_data(source, &frame.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use crate::routing::UNREACHABLE;
    use crate::transport::abstraction::MockDatagramService;
    use crate::transport::TransportError;
    use mockall::predicate::{always, eq};
    use std::time::Duration;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::new([n; 6])
    }

    fn test_config() -> NodeConfig {
        NodeConfig {
            table_capacity: 4,
            broadcast_period_ms: 1000,
            ..Default::default()
        }
    }

    fn node_with(link: MockDatagramService) -> (Node<MockDatagramService>, mpsc::Receiver<NodeEvent>) {
        let transport = Arc::new(Transport::new(link, 250));
        Node::new(test_config(), addr(1), transport).unwrap()
    }

    fn advertisement_frame(destination: u8, next_hop: u8, hop_count: u8, sequence: u16) -> Frame {
        let advertisement = Advertisement {
            destination: addr(destination),
            next_hop: addr(next_hop),
            hop_count,
            sequence,
        };
        Frame {
            kind: FrameKind::Advertisement,
            payload: advertisement.to_bytes().to_vec(),
        }
    }

    fn user_frame(destination: NodeAddress, text: &[u8]) -> Frame {
        Frame {
            kind: FrameKind::UserData,
            payload: encode_user_message(&UserMessage::new(destination, text)),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(Transport::new(MockDatagramService::new(), 250));
        let config = NodeConfig {
            broadcast_period_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Node::new(config, addr(1), transport),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn test_advertisement_is_merged() {
        let (mut node, _events) = node_with(MockDatagramService::new());

        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 2));
        node.on_frame(addr(2), advertisement_frame(3, 3, 1, 4));

        let route = node.engine().lookup(&addr(3)).unwrap();
        assert_eq!(route.next_hop, addr(2));
        assert_eq!(route.hop_count, 2);
        assert_eq!(node.engine().table().len(), 3);
    }

    #[test]
    fn test_truncated_advertisement_ignored() {
        let (mut node, _events) = node_with(MockDatagramService::new());

        node.on_frame(
            addr(2),
            Frame {
                kind: FrameKind::Advertisement,
                payload: vec![0; 10],
            },
        );

        assert_eq!(node.engine().table().len(), 1);
    }

    #[test]
    fn test_user_message_for_us_is_delivered() {
        let (mut node, mut events) = node_with(MockDatagramService::new());

        node.on_frame(addr(2), user_frame(addr(1), b"hello"));

        assert_eq!(
            events.try_recv().unwrap(),
            NodeEvent::MessageDelivered {
                from: addr(2),
                destination: addr(1),
                payload: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn test_broadcast_user_message_is_delivered() {
        let (mut node, mut events) = node_with(MockDatagramService::new());

        node.on_frame(addr(2), user_frame(NodeAddress::BROADCAST, b"all"));

        assert!(matches!(
            events.try_recv().unwrap(),
            NodeEvent::MessageDelivered { destination, .. } if destination.is_broadcast()
        ));
    }

    #[test]
    fn test_user_message_forwarded_unchanged() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(false);
        link.expect_register_peer()
            .with(eq(addr(2)), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        let expected = encode_user_message(&UserMessage::new(addr(3), b"relay me".to_vec()));
        link.expect_send()
            .with(eq(addr(2)), always())
            .times(1)
            .returning(move |_, datagram| {
                let frame = frame::decode(datagram).unwrap();
                assert_eq!(frame.kind, FrameKind::UserData);
                assert_eq!(frame.payload, expected);
                Ok(())
            });

        let (mut node, mut events) = node_with(link);
        node.on_frame(addr(2), advertisement_frame(3, 3, 1, 2));
        node.on_frame(addr(4), user_frame(addr(3), b"relay me"));

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_user_message_without_route_dropped() {
        let mut link = MockDatagramService::new();
        link.expect_send().never();

        let (mut node, mut events) = node_with(link);
        node.on_frame(addr(2), user_frame(addr(9), b"lost"));

        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_send_to_self_rejected() {
        let mut link = MockDatagramService::new();
        link.expect_send().never();

        let (node, _events) = node_with(link);
        assert_eq!(
            node.send_user_message(addr(1), b"me"),
            Err(NodeError::SelfSend)
        );
    }

    #[test]
    fn test_send_without_route() {
        let mut link = MockDatagramService::new();
        link.expect_send().never();

        let (node, _events) = node_with(link);
        assert_eq!(
            node.send_user_message(addr(5), b"where"),
            Err(NodeError::NoRoute(addr(5)))
        );
    }

    #[test]
    fn test_broadcast_send_skips_lookup() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(false);
        link.expect_register_peer()
            .with(eq(NodeAddress::BROADCAST), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));
        link.expect_send()
            .with(eq(NodeAddress::BROADCAST), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let (node, _events) = node_with(link);
        node.send_user_message(NodeAddress::BROADCAST, b"hi all")
            .unwrap();
    }

    #[test]
    fn test_send_reports_oversize_payload() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(true);
        link.expect_send().never();

        let (node, _events) = node_with(link);
        let result = node.send_user_message(NodeAddress::BROADCAST, &[0u8; 242]);
        assert!(matches!(
            result,
            Err(NodeError::Transport(TransportError::Encode(_)))
        ));
    }

    #[test]
    fn test_user_message_for_poisoned_destination_dropped() {
        let mut link = MockDatagramService::new();
        link.expect_send().never();

        let (mut node, mut events) = node_with(link);
        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 2));
        node.on_frame(addr(2), advertisement_frame(3, 3, 1, 4));
        assert!(node.engine().lookup(&addr(3)).is_some());

        // Odd fresher sequence withdraws the destination
        node.on_frame(addr(2), advertisement_frame(3, 3, UNREACHABLE, 5));
        assert_eq!(
            node.engine().table().find_remote(&addr(3)).unwrap().hop_count,
            UNREACHABLE
        );

        node.on_frame(addr(4), user_frame(addr(3), b"too late"));

        assert!(events.try_recv().is_err());
    }

    /// Send every queued update without waiting for the pacing timer
    fn flush_updates(node: &mut Node<MockDatagramService>) {
        while node.pending_updates() > 0 {
            node.send_next_update();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_sends_changes_once() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(true);
        link.expect_send()
            .with(eq(NodeAddress::BROADCAST), always())
            .times(2)
            .returning(|_, datagram| {
                let frame = frame::decode(datagram).unwrap();
                let advertisement = Advertisement::from_bytes(&frame.payload).unwrap();
                assert_eq!(advertisement.destination, NodeAddress::new([1; 6]));
                assert_eq!(advertisement.hop_count, 0);
                Ok(())
            });
        // The neighbor's own entry goes back to the neighbor exactly once
        link.expect_send()
            .with(eq(addr(2)), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let (mut node, _events) = node_with(link);
        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 2));

        node.run_cycle();
        assert_eq!(node.engine().local_entry().sequence, 2);
        assert_eq!(node.pending_updates(), 1);
        flush_updates(&mut node);

        node.run_cycle();
        assert_eq!(node.engine().local_entry().sequence, 4);
        assert_eq!(node.pending_updates(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_wait_for_their_slot() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(true);
        link.expect_send().returning(|_, _| Ok(()));

        let (mut node, _events) = node_with(link);
        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 2));
        node.on_frame(addr(2), advertisement_frame(3, 3, 1, 4));

        let started = time::Instant::now();
        node.run_cycle();

        // Broadcast goes out at once, the two changed entries one slot apart
        let pacing = node.config().pacing_delay();
        assert_eq!(node.pending_updates(), 2);
        assert_eq!(node.next_update_at, started + pacing);

        node.send_next_update();
        assert_eq!(node.pending_updates(), 1);
        assert_eq!(node.next_update_at, started + pacing * 2);

        // Frames are still merged while updates wait
        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 4));
        assert_eq!(
            node.engine().table().find_remote(&addr(2)).unwrap().sequence,
            4
        );

        node.send_next_update();
        assert_eq!(node.pending_updates(), 0);
        assert_eq!(node.engine().changed_since_snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_reports_silent_neighbor() {
        let mut link = MockDatagramService::new();
        link.expect_is_peer_registered().return_const(true);
        link.expect_send().returning(|_, _| Ok(()));

        let (mut node, mut events) = node_with(link);
        node.on_frame(addr(2), advertisement_frame(2, 2, 0, 2));

        node.run_cycle();
        flush_updates(&mut node);
        assert!(events.try_recv().is_err());

        time::advance(Duration::from_millis(2100)).await;
        node.run_cycle();

        assert_eq!(events.try_recv().unwrap(), NodeEvent::NeighborLost(addr(2)));
        assert!(node.engine().lookup(&addr(2)).is_none());
    }
}
