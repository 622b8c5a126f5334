//! Host presence tracking: merges scan snapshots into the episode inventory
//! and drives the periodic scan cycle.

mod monitor;
mod reconcile;

pub use monitor::{CycleOutcome, Monitor};
pub use reconcile::{reconcile, reconcile_with_report, CycleReport};
