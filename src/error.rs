//! Error types for the monitor.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::models::FailureKind;

/// A single provider fetch that produced no reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{provider}] {kind}: {message}")]
pub struct FetchFailure {
    pub provider: String,
    pub endpoint: String,
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(
        provider: impl Into<String>,
        endpoint: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            endpoint: endpoint.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Failure of a whole polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("no provider returned a block number ({} failed)", .failures.len())]
    NoSuccessfulReadings { failures: BTreeMap<String, FailureKind> },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rocksdb: {0}")]
    Rocks(#[from] rocksdb::Error),
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
