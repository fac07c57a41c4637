//! Routing Table Engine: DSDV merge rules, stale-neighbor aging and
//! snapshot-based change detection
//!
//! The engine exclusively owns the routing table and its snapshot. All
//! mutation goes through the operations below, which are only ever called
//! from the protocol task, so no internal locking is needed.

use super::entry::{Advertisement, RoutingEntry, UNREACHABLE};
use super::table::{RoutingTable, Snapshot};
use super::RoutingError;
use crate::address::NodeAddress;
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a merge did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Unknown destination appended at `index`
    Inserted { index: usize },
    /// Unknown destination took over the slot of an unreachable entry
    Replaced { index: usize, evicted: NodeAddress },
    /// Strictly fresher sequence number adopted wholesale
    Adopted,
    /// Same sequence, strictly shorter path through a new next hop
    Improved,
    /// Same sequence, re-advertised by the current next hop
    Refreshed,
    /// Older sequence heard directly from the destination itself
    Recovered,
    /// Someone advertised us as withdrawn; own sequence bumped past it
    LocalResync { sequence: u16 },
    /// Nothing changed
    Ignored,
}

/// Forwarding decision for a reachable destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub next_hop: NodeAddress,
    pub hop_count: u8,
}

/// Owner of the routing table and its snapshot
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    table: RoutingTable,
    snapshot: Snapshot,
}

impl RoutingEngine {
    /// Fresh table seeded with the local node's own entry at index 0
    pub fn new(local: NodeAddress, capacity: usize, now: Instant) -> Self {
        Self {
            table: RoutingTable::new(RoutingEntry::local(local, now), capacity),
            snapshot: Snapshot::new(capacity),
        }
    }

    pub fn local_address(&self) -> NodeAddress {
        self.table.local().destination
    }

    pub fn local_entry(&self) -> &RoutingEntry {
        self.table.local()
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Advance the own sequence by 2 and return the entry to broadcast
    pub fn advance_local_sequence(&mut self) -> Advertisement {
        let local = self.table.local_mut();
        local.sequence = local.sequence.wrapping_add(2);
        local.advertisement()
    }

    /// Apply one received advertisement heard from neighbor `via`
    pub fn merge(
        &mut self,
        received: &Advertisement,
        via: NodeAddress,
        now: Instant,
    ) -> Result<MergeOutcome, RoutingError> {
        let Some(index) = self.table.position(&received.destination) else {
            return self.insert(received, via, now);
        };

        if index == 0 {
            return Ok(self.merge_local(received));
        }

        let hop_count = received.hop_count.saturating_add(1);
        let Some(current) = self.table.get_mut(index) else {
            return Ok(MergeOutcome::Ignored);
        };

        let outcome = match received.sequence.cmp(&current.sequence) {
            Ordering::Greater => {
                current.next_hop = via;
                current.hop_count = hop_count;
                current.sequence = received.sequence;
                current.last_update = now;
                MergeOutcome::Adopted
            }
            Ordering::Equal => {
                if hop_count < current.hop_count {
                    current.next_hop = via;
                    current.hop_count = hop_count;
                    current.last_update = now;
                    MergeOutcome::Improved
                } else if via == current.next_hop {
                    current.hop_count = hop_count;
                    current.last_update = now;
                    MergeOutcome::Refreshed
                } else {
                    MergeOutcome::Ignored
                }
            }
            Ordering::Less => {
                if via == received.destination {
                    current.next_hop = via;
                    current.hop_count = hop_count;
                    if current.is_withdrawn() {
                        current.sequence = current.sequence.wrapping_add(1);
                    }
                    current.last_update = now;
                    MergeOutcome::Recovered
                } else {
                    MergeOutcome::Ignored
                }
            }
        };

        if !matches!(outcome, MergeOutcome::Ignored | MergeOutcome::Refreshed) {
            debug!(
                "Route to {} {:?}: next hop {}, {} hops, seq {}",
                current.destination, outcome, current.next_hop, current.hop_count, current.sequence
            );
        }

        Ok(outcome)
    }

    /// Only the sequence of the own entry reacts to advertisements
    fn merge_local(&mut self, received: &Advertisement) -> MergeOutcome {
        let local = self.table.local_mut();
        if received.sequence > local.sequence && received.sequence % 2 == 1 {
            local.sequence = received.sequence.wrapping_add(1);
            debug!(
                "Neighbors report us withdrawn (seq {}), re-asserting with seq {}",
                received.sequence, local.sequence
            );
            MergeOutcome::LocalResync {
                sequence: local.sequence,
            }
        } else {
            MergeOutcome::Ignored
        }
    }

    fn insert(
        &mut self,
        received: &Advertisement,
        via: NodeAddress,
        now: Instant,
    ) -> Result<MergeOutcome, RoutingError> {
        let entry = RoutingEntry {
            destination: received.destination,
            next_hop: via,
            hop_count: received.hop_count.saturating_add(1),
            sequence: received.sequence,
            last_update: now,
        };

        if !self.table.is_full() {
            let index = self.table.push(entry);
            debug!(
                "New destination {} via {} ({} hops, seq {})",
                entry.destination, via, entry.hop_count, entry.sequence
            );
            return Ok(MergeOutcome::Inserted { index });
        }

        let victim = self
            .table
            .entries()
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, existing)| !existing.is_reachable())
            .min_by_key(|(_, existing)| existing.last_update)
            .map(|(index, existing)| (index, existing.destination));

        let Some((index, evicted)) = victim else {
            return Err(RoutingError::TableFull {
                capacity: self.table.capacity(),
            });
        };

        if let Some(slot) = self.table.get_mut(index) {
            *slot = entry;
        }
        self.snapshot.clear(index);
        debug!(
            "Table full: {} replaces unreachable {} at index {}",
            entry.destination, evicted, index
        );
        Ok(MergeOutcome::Replaced { index, evicted })
    }

    /// Poison direct neighbors not heard from for longer than `timeout`
    ///
    /// Returns the addresses that were just marked unreachable.
    pub fn sweep_stale(&mut self, now: Instant, timeout: Duration) -> Vec<NodeAddress> {
        let mut lost = Vec::new();
        for entry in self.table.iter_mut().skip(1) {
            if entry.is_direct_neighbor()
                && now.saturating_duration_since(entry.last_update) > timeout
            {
                entry.hop_count = UNREACHABLE;
                entry.sequence = entry.sequence.wrapping_add(1);
                lost.push(entry.destination);
            }
        }
        lost
    }

    /// Remote entries whose value differs from the last advertised one
    pub fn changed_since_snapshot(&self) -> Vec<(usize, RoutingEntry)> {
        self.table
            .entries()
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(index, entry)| self.snapshot.differs(*index, entry))
            .map(|(index, entry)| (index, *entry))
            .collect()
    }

    /// Record `entry` as the value last advertised for slot `index`
    pub fn record_advertised(&mut self, index: usize, entry: RoutingEntry) {
        self.snapshot.record(index, entry);
    }

    /// Next hop toward a reachable remote destination
    pub fn lookup(&self, destination: &NodeAddress) -> Option<Route> {
        self.table
            .find_remote(destination)
            .filter(|entry| entry.is_reachable())
            .map(|entry| Route {
                next_hop: entry.next_hop,
                hop_count: entry.hop_count,
            })
    }

    /// Addresses of all current direct neighbors
    pub fn direct_neighbors(&self) -> Vec<NodeAddress> {
        self.table
            .direct_neighbors()
            .map(|entry| entry.destination)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::new([n; 6])
    }

    fn adv(dest: u8, hop_count: u8, sequence: u16) -> Advertisement {
        Advertisement {
            destination: addr(dest),
            next_hop: addr(dest),
            hop_count,
            sequence,
        }
    }

    fn engine(now: Instant) -> RoutingEngine {
        RoutingEngine::new(addr(0xA), 10, now)
    }

    #[test]
    fn test_unknown_destination_is_appended() {
        let now = Instant::now();
        let mut engine = engine(now);

        let outcome = engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted { index: 1 });

        let entry = engine.table().get(1).unwrap();
        assert_eq!(entry.destination, addr(0xB));
        assert_eq!(entry.next_hop, addr(0xC));
        assert_eq!(entry.hop_count, 2);
        assert_eq!(entry.sequence, 10);
        assert_eq!(entry.last_update, now);
    }

    #[test]
    fn test_equal_sequence_shorter_path_wins() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();

        let later = now + Duration::from_secs(1);
        let outcome = engine.merge(&adv(0xB, 0, 10), addr(0xD), later).unwrap();
        assert_eq!(outcome, MergeOutcome::Improved);

        let entry = engine.table().get(1).unwrap();
        assert_eq!(entry.next_hop, addr(0xD));
        assert_eq!(entry.hop_count, 1);
        assert_eq!(entry.sequence, 10);
        assert_eq!(entry.last_update, later);
    }

    #[test]
    fn test_equal_sequence_equal_cost_alternative_ignored() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();

        let outcome = engine.merge(&adv(0xB, 1, 10), addr(0xD), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Ignored);
        assert_eq!(engine.table().get(1).unwrap().next_hop, addr(0xC));
    }

    #[test]
    fn test_current_next_hop_is_authoritative_for_cost() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();

        let later = now + Duration::from_secs(2);
        let outcome = engine.merge(&adv(0xB, 4, 10), addr(0xC), later).unwrap();
        assert_eq!(outcome, MergeOutcome::Refreshed);

        let entry = engine.table().get(1).unwrap();
        assert_eq!(entry.hop_count, 5);
        assert_eq!(entry.last_update, later);
    }

    #[test]
    fn test_fresher_sequence_dominates_hop_count() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 0, 10), addr(0xB), now).unwrap();

        let outcome = engine.merge(&adv(0xB, 3, 12), addr(0xD), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Adopted);

        let entry = engine.table().get(1).unwrap();
        assert_eq!(entry.next_hop, addr(0xD));
        assert_eq!(entry.hop_count, 4);
        assert_eq!(entry.sequence, 12);
    }

    #[test]
    fn test_withdrawn_local_entry_is_reasserted() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.advance_local_sequence();
        engine.advance_local_sequence();
        assert_eq!(engine.local_entry().sequence, 4);

        let outcome = engine.merge(&adv(0xA, UNREACHABLE, 7), addr(0xC), now).unwrap();
        assert_eq!(outcome, MergeOutcome::LocalResync { sequence: 8 });

        let local = engine.local_entry();
        assert_eq!(local.sequence, 8);
        assert_eq!(local.hop_count, 0);
        assert_eq!(local.next_hop, addr(0xA));
    }

    #[test]
    fn test_fresher_even_local_sequence_leaves_progression_alone() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.advance_local_sequence();

        let outcome = engine.merge(&adv(0xA, 2, 40), addr(0xC), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Ignored);
        assert_eq!(engine.local_entry().sequence, 2);
    }

    #[test]
    fn test_local_entry_ignores_equal_and_stale_adverts() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.advance_local_sequence();

        assert_eq!(
            engine.merge(&adv(0xA, 1, 2), addr(0xA), now).unwrap(),
            MergeOutcome::Ignored
        );
        assert_eq!(
            engine.merge(&adv(0xA, 1, 0), addr(0xA), now).unwrap(),
            MergeOutcome::Ignored
        );
        assert_eq!(engine.local_entry().hop_count, 0);
    }

    #[test]
    fn test_stale_sequence_from_other_neighbor_ignored() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();

        let outcome = engine.merge(&adv(0xB, 0, 8), addr(0xD), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Ignored);
        assert_eq!(engine.table().get(1).unwrap().sequence, 10);
    }

    #[test]
    fn test_rejoining_destination_clears_withdrawal() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 0, 20), addr(0xB), now).unwrap();

        // B goes silent and is poisoned
        let later = now + Duration::from_secs(11);
        engine.sweep_stale(later, Duration::from_secs(10));
        assert_eq!(engine.table().get(1).unwrap().sequence, 21);

        // B rebooted and restarted its sequence
        let outcome = engine.merge(&adv(0xB, 0, 2), addr(0xB), later).unwrap();
        assert_eq!(outcome, MergeOutcome::Recovered);

        let entry = engine.table().get(1).unwrap();
        assert_eq!(entry.hop_count, 1);
        assert_eq!(entry.next_hop, addr(0xB));
        assert_eq!(entry.sequence, 22);
        assert_eq!(entry.last_update, later);
    }

    #[test]
    fn test_stale_sweep_poisons_silent_neighbor() {
        let t0 = Instant::now();
        let period = Duration::from_millis(5000);
        let mut engine = engine(t0);
        engine.merge(&adv(0xB, 0, 10), addr(0xB), t0).unwrap();
        engine.merge(&adv(0xC, 1, 6), addr(0xB), t0).unwrap();

        assert!(engine.sweep_stale(t0 + 2 * period, 2 * period).is_empty());

        let lost = engine.sweep_stale(t0 + 2 * period + Duration::from_millis(1), 2 * period);
        assert_eq!(lost, vec![addr(0xB)]);

        let neighbor = engine.table().get(1).unwrap();
        assert_eq!(neighbor.hop_count, UNREACHABLE);
        assert_eq!(neighbor.sequence, 11);

        // Multi-hop entries are not aged directly
        assert_eq!(engine.table().get(2).unwrap().hop_count, 2);

        // Already poisoned entries are left alone
        assert!(engine
            .sweep_stale(t0 + 10 * period, 2 * period)
            .is_empty());
        assert_eq!(engine.table().get(1).unwrap().sequence, 11);
    }

    #[test]
    fn test_poisoned_advert_stays_unreachable() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xC, 1, 6), addr(0xB), now).unwrap();

        let outcome = engine.merge(&adv(0xC, UNREACHABLE, 7), addr(0xB), now).unwrap();
        assert_eq!(outcome, MergeOutcome::Adopted);
        assert_eq!(engine.table().get(1).unwrap().hop_count, UNREACHABLE);
        assert!(engine.lookup(&addr(0xC)).is_none());
    }

    #[test]
    fn test_lookup_excludes_local_and_unknown() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 1, 10), addr(0xC), now).unwrap();

        assert_eq!(
            engine.lookup(&addr(0xB)),
            Some(Route {
                next_hop: addr(0xC),
                hop_count: 2
            })
        );
        assert!(engine.lookup(&addr(0xA)).is_none());
        assert!(engine.lookup(&addr(0xE)).is_none());
    }

    #[test]
    fn test_changed_since_snapshot() {
        let now = Instant::now();
        let mut engine = engine(now);
        engine.merge(&adv(0xB, 0, 10), addr(0xB), now).unwrap();
        engine.merge(&adv(0xC, 1, 4), addr(0xB), now).unwrap();
        engine.advance_local_sequence();

        let changed = engine.changed_since_snapshot();
        assert_eq!(changed.len(), 2);
        assert!(changed.iter().all(|(index, _)| *index != 0));

        for (index, entry) in changed {
            engine.record_advertised(index, entry);
        }
        assert!(engine.changed_since_snapshot().is_empty());

        // A liveness refresh alone is a change
        let later = now + Duration::from_secs(5);
        engine.merge(&adv(0xB, 0, 10), addr(0xB), later).unwrap();
        let changed = engine.changed_since_snapshot();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0, 1);
    }

    #[test]
    fn test_full_table_evicts_oldest_unreachable() {
        let t0 = Instant::now();
        let mut engine = RoutingEngine::new(addr(0xA), 3, t0);
        engine.merge(&adv(0xB, 0, 2), addr(0xB), t0).unwrap();
        engine
            .merge(&adv(0xC, 0, 2), addr(0xC), t0 + Duration::from_secs(1))
            .unwrap();

        let t1 = t0 + Duration::from_secs(30);
        engine.record_advertised(1, *engine.table().get(1).unwrap());
        assert_eq!(engine.sweep_stale(t1, Duration::from_secs(10)).len(), 2);

        let outcome = engine.merge(&adv(0xD, 0, 2), addr(0xD), t1).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Replaced {
                index: 1,
                evicted: addr(0xB)
            }
        );
        assert_eq!(engine.table().len(), 3);
        assert_eq!(engine.table().get(1).unwrap().destination, addr(0xD));
        assert!(engine
            .changed_since_snapshot()
            .iter()
            .any(|(index, _)| *index == 1));
    }

    #[test]
    fn test_full_table_without_unreachable_rejects() {
        let now = Instant::now();
        let mut engine = RoutingEngine::new(addr(0xA), 2, now);
        engine.merge(&adv(0xB, 0, 2), addr(0xB), now).unwrap();

        assert_eq!(
            engine.merge(&adv(0xC, 0, 2), addr(0xC), now),
            Err(RoutingError::TableFull { capacity: 2 })
        );
        assert_eq!(engine.table().len(), 2);

        // Known destinations still merge
        assert_eq!(
            engine.merge(&adv(0xB, 0, 4), addr(0xB), now).unwrap(),
            MergeOutcome::Adopted
        );
    }

    fn arb_advert() -> impl Strategy<Value = (u8, u8, u16, u8)> {
        // (destination, hop count, sequence, neighbor)
        (1u8..5, prop_oneof![0u8..6, Just(UNREACHABLE)], 0u16..40, 1u8..5)
    }

    proptest! {
        #[test]
        fn prop_sequence_never_decreases_through_merges(
            adverts in proptest::collection::vec(arb_advert(), 1..60),
        ) {
            let now = Instant::now();
            let mut engine = RoutingEngine::new(addr(0xA), 10, now);

            for (dest, hop_count, sequence, via) in adverts {
                let before = engine
                    .table()
                    .find_remote(&addr(dest))
                    .map(|entry| entry.sequence);
                let advert = Advertisement {
                    destination: addr(dest),
                    next_hop: addr(via),
                    hop_count,
                    sequence,
                };
                engine.merge(&advert, addr(via), now).unwrap();

                let after = engine.table().find_remote(&addr(dest)).map(|e| e.sequence);
                if let (Some(before), Some(after)) = (before, after) {
                    prop_assert!(after >= before);
                }
            }
        }

        #[test]
        fn prop_equal_sequence_keeps_shorter_path(
            first_hops in 0u8..20,
            second_hops in 0u8..20,
            sequence in 0u16..1000,
        ) {
            let now = Instant::now();
            let mut engine = RoutingEngine::new(addr(0xA), 10, now);
            engine.merge(&adv(0xB, first_hops, sequence), addr(0xC), now).unwrap();
            engine.merge(&adv(0xB, second_hops, sequence), addr(0xD), now).unwrap();

            let entry = engine.table().find_remote(&addr(0xB)).unwrap();
            prop_assert_eq!(entry.hop_count, first_hops.min(second_hops) + 1);
            let expected_next_hop = if second_hops < first_hops { addr(0xD) } else { addr(0xC) };
            prop_assert_eq!(entry.next_hop, expected_next_hop);
        }
    }
}
