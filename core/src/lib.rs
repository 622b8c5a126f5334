//! Core types and shared collaborator traits for the lanwatch engine.

pub mod error;
pub mod record;
pub mod timefmt;

use async_trait::async_trait;
use std::collections::HashMap;

pub use error::{ProviderError, StoreError};
pub use record::{DnsQueryRecord, HostRecord, HostState, ObservedHost};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Hosts observed by a single scan, keyed by IP.
pub type Snapshot = HashMap<String, ObservedHost>;

/// Something that can run a scan and report which hosts are up right now.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> Result<Snapshot, ProviderError>;
}

/// Durable home of the host inventory. `save` replaces the whole inventory.
pub trait InventoryStore: Send {
    fn load(&self) -> Result<Vec<HostRecord>, StoreError>;
    fn save(&self, records: &[HostRecord]) -> Result<(), StoreError>;
}
