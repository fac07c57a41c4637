//! Fixed-capacity routing table and its last-advertised snapshot

use super::entry::RoutingEntry;
use crate::address::NodeAddress;
use std::fmt;
use std::time::Instant;

/// Ordered, fixed-capacity sequence of routing entries
///
/// Index 0 always holds the local node's own entry. Other destinations
/// are appended in discovery order; unreachable ones are kept with the
/// unreachable hop count rather than removed.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
    capacity: usize,
}

impl RoutingTable {
    pub fn new(local: RoutingEntry, capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.push(local);
        Self { entries, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the local entry is always present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn local(&self) -> &RoutingEntry {
        &self.entries[0]
    }

    pub(crate) fn local_mut(&mut self) -> &mut RoutingEntry {
        &mut self.entries[0]
    }

    pub fn get(&self, index: usize) -> Option<&RoutingEntry> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut RoutingEntry> {
        self.entries.get_mut(index)
    }

    /// Index of `destination`, including the local entry
    pub fn position(&self, destination: &NodeAddress) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.destination == *destination)
    }

    /// Remote entry for `destination` (index 0 never matches)
    pub fn find_remote(&self, destination: &NodeAddress) -> Option<&RoutingEntry> {
        self.entries
            .iter()
            .skip(1)
            .find(|entry| entry.destination == *destination)
    }

    /// Append a new entry; the caller checks capacity first
    pub(crate) fn push(&mut self, entry: RoutingEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RoutingEntry> {
        self.entries.iter_mut()
    }

    /// Remote entries currently one hop away
    pub fn direct_neighbors(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.entries
            .iter()
            .skip(1)
            .filter(|entry| entry.is_direct_neighbor())
    }

    /// Render the table with ages relative to `now`
    pub fn display_at(&self, now: Instant) -> TableDisplay<'_> {
        TableDisplay::new(&self.entries, now)
    }
}

/// Human-readable rendering of routing entries
pub struct TableDisplay<'a> {
    entries: &'a [RoutingEntry],
    now: Instant,
}

impl<'a> TableDisplay<'a> {
    pub fn new(entries: &'a [RoutingEntry], now: Instant) -> Self {
        Self { entries, now }
    }
}

impl fmt::Display for TableDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "| {:<17} | {:<17} | {:<9} | {:<8} | {:<7} |",
            "Destination", "Next Hop", "Hop Count", "Seq. Num", "Age (s)"
        )?;
        writeln!(
            f,
            "|-------------------|-------------------|-----------|----------|---------|"
        )?;
        for entry in self.entries {
            let age = self.now.saturating_duration_since(entry.last_update);
            writeln!(
                f,
                "| {} | {} | {:<9} | {:<8} | {:<7} |",
                entry.destination,
                entry.next_hop,
                entry.hop_count,
                entry.sequence,
                age.as_secs()
            )?;
        }
        Ok(())
    }
}

/// Last-advertised value of every table slot
///
/// Used only to find entries that changed since they were last sent.
#[derive(Debug, Clone)]
pub struct Snapshot {
    slots: Vec<Option<RoutingEntry>>,
}

impl Snapshot {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn get(&self, index: usize) -> Option<&RoutingEntry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn differs(&self, index: usize, entry: &RoutingEntry) -> bool {
        self.get(index) != Some(entry)
    }

    pub(crate) fn record(&mut self, index: usize, entry: RoutingEntry) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(entry);
        }
    }

    pub(crate) fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = None;
        }
    }
}
