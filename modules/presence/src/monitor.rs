use lanwatch_core::{timefmt, HostRecord, InventoryStore, ProviderError, Snapshot, SnapshotProvider, StoreError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reconcile::{reconcile_with_report, CycleReport};

/// Result of one scan cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The scan failed; the inventory was left untouched.
    Skipped(ProviderError),
    /// The snapshot was merged. `saved` is false if persisting it failed.
    Reconciled { report: CycleReport, saved: bool },
}

/// Owns the inventory and runs scan, reconcile and save on a fixed delay.
pub struct Monitor<P, S> {
    provider: P,
    store: S,
    inventory: Vec<HostRecord>,
    interval: Duration,
    cycles: u64,
}

impl<P: SnapshotProvider, S: InventoryStore> Monitor<P, S> {
    /// Load the persisted inventory. A store that cannot be read is an error:
    /// starting from an empty inventory would overwrite the history on the
    /// next save.
    pub fn start(provider: P, store: S, interval: Duration) -> Result<Self, StoreError> {
        let inventory = store.load()?;
        info!(
            records = inventory.len(),
            connected = inventory.iter().filter(|r| r.is_connected()).count(),
            "inventory loaded"
        );
        Ok(Monitor { provider, store, inventory, interval, cycles: 0 })
    }

    pub fn inventory(&self) -> &[HostRecord] {
        &self.inventory
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Scan once and merge the result, stamped with the current time.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.cycles += 1;
        info!(cycle = self.cycles, "running scan");
        match self.provider.snapshot().await {
            Ok(snapshot) => self.apply(&snapshot, timefmt::now()),
            Err(e) => {
                error!(cycle = self.cycles, error = %e, "scan failed, skipping cycle");
                CycleOutcome::Skipped(e)
            }
        }
    }

    /// Merge an already obtained snapshot and persist the result.
    pub fn apply(&mut self, snapshot: &Snapshot, now: OffsetDateTime) -> CycleOutcome {
        let previous = std::mem::take(&mut self.inventory);
        let (next, report) = reconcile_with_report(previous, snapshot, now);
        self.inventory = next;

        let at = timefmt::rfc3339(now);
        for ip in &report.arrived {
            info!(%ip, "new host detected");
        }
        for ip in &report.departed {
            info!(%ip, at = %at, "host disconnected");
        }
        if report.is_quiet() {
            debug!(seen = snapshot.len(), refreshed = report.refreshed.len(), "no presence changes");
        } else {
            info!(
                seen = snapshot.len(),
                arrived = report.arrived.len(),
                departed = report.departed.len(),
                records = self.inventory.len(),
                "snapshot merged"
            );
        }

        let saved = match self.store.save(&self.inventory) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to save inventory, will retry next cycle");
                false
            }
        };
        CycleOutcome::Reconciled { report, saved }
    }

    /// Run cycles until `shutdown` is cancelled, waiting `interval` between
    /// the end of one cycle and the start of the next.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "monitor started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_cycle() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(cycles = self.cycles, "monitor stopped");
    }
}
