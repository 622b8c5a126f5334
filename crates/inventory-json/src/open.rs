use lanwatch_core::{HostRecord, InventoryStore, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::write::write_atomic;

/// Inventory kept as a single pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InventoryStore for JsonFileStore {
    /// A missing file is a first run and yields an empty inventory; a file
    /// holding `null` is treated the same way.
    fn load(&self) -> Result<Vec<HostRecord>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no inventory yet");
                return Ok(Vec::new());
            }
            Err(source) => return Err(StoreError::Io { path: self.path.clone(), source }),
        };
        let records: Option<Vec<HostRecord>> = serde_json::from_slice(&data)
            .map_err(|source| StoreError::Decode { path: self.path.clone(), source })?;
        Ok(records.unwrap_or_default())
    }

    fn save(&self, records: &[HostRecord]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.path, &data).map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        debug!(path = %self.path.display(), records = records.len(), "inventory saved");
        Ok(())
    }
}
