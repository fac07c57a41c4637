// Shared helpers for the mesh integration tests

#![allow(dead_code)]

use dsdv_mesh_core::{Medium, NodeAddress, NodeConfig, NodeEvent, SimNode};
use std::time::Duration;

pub const PERIOD_MS: u64 = 1000;

/// Default protocol constants with a shorter period
pub fn config() -> NodeConfig {
    NodeConfig {
        broadcast_period_ms: PERIOD_MS,
        ..Default::default()
    }
}

pub fn address(n: u8) -> NodeAddress {
    NodeAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, n])
}

pub fn addresses(count: u8) -> Vec<NodeAddress> {
    (1..=count).map(address).collect()
}

/// Spawn one node per address on `medium`
pub fn spawn_all(medium: &Medium, addresses: &[NodeAddress]) -> Vec<SimNode> {
    addresses
        .iter()
        .map(|&addr| medium.spawn_node(config(), addr).unwrap())
        .collect()
}

pub async fn wait_periods(periods: u64) {
    tokio::time::sleep(Duration::from_millis(periods * PERIOD_MS + PERIOD_MS / 2)).await;
}

/// Everything currently queued on a node's notification channel
pub fn drain_events(node: &mut SimNode) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = node.events.try_recv() {
        events.push(event);
    }
    events
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("dsdv_mesh_core=debug")
        .try_init();
}
