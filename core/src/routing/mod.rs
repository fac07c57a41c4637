//! DSDV routing: destination-sequenced distance-vector table maintenance
//!
//! - Entry: one destination's best known path plus its wire advertisement
//! - Table: fixed-capacity ordered entries with the local node at index 0,
//!   and the snapshot of last-advertised values
//! - Engine: merge rules, stale-neighbor poisoning, change detection, lookup
//!
//! Freshness is decided by sequence number first and hop count second. A
//! destination advances its own sequence by 2 every period; whoever detects
//! it unreachable bumps it by 1, so odd numbers mark a withdrawal.

pub mod engine;
pub mod entry;
pub mod table;

pub use engine::{MergeOutcome, Route, RoutingEngine};
pub use entry::{Advertisement, RoutingEntry, SELF_HOP_COUNT, UNREACHABLE};
pub use table::{RoutingTable, Snapshot, TableDisplay};

use thiserror::Error;

/// Routing table errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Routing table full ({capacity} entries) and no unreachable entry to replace")]
    TableFull { capacity: usize },
}
