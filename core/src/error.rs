use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a snapshot from an external scan tool.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} did not finish within {after:?}")]
    Timeout { tool: String, after: Duration },
    #[error("{tool} exited with {status}: {output}")]
    Exit {
        tool: String,
        status: String,
        output: String,
    },
    #[error("invalid scan configuration: {0}")]
    Config(String),
}

/// Failure to read or write the persisted inventory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("inventory io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("inventory file {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode inventory: {0}")]
    Encode(#[from] serde_json::Error),
}
