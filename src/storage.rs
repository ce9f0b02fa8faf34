//! Snapshot persistence.
//!
//! Rows are JSON snapshots keyed `"{network}:{timestamp:020}"`, so a forward scan
//! over a network's prefix is chronological.

use std::path::Path;

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

use crate::error::StoreError;
use crate::models::Snapshot;

pub trait SnapshotStore: Send + Sync {
    fn insert(&self, network: &str, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Snapshots with `timestamp > since`, oldest first.
    fn select_since(&self, network: &str, since: i64) -> Result<Vec<Snapshot>, StoreError>;

    /// Deletes all but the newest `keep` rows of `network`; returns how many were removed.
    fn retain_latest(&self, network: &str, keep: usize) -> Result<usize, StoreError>;
}

pub struct RocksStore {
    db: DB,
}

impl std::fmt::Debug for RocksStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStore").field("path", &self.db.path()).finish()
    }
}

impl RocksStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        Ok(Self { db: DB::open(&opts, path)? })
    }

    fn prefix(network: &str) -> String {
        format!("{network}:")
    }

    fn key(network: &str, timestamp: i64) -> String {
        format!("{network}:{:020}", timestamp.max(0))
    }

    /// Keys and values under `network`, oldest first.
    fn scan(&self, network: &str, from: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let prefix = Self::prefix(network);
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(from, Direction::Forward)) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }
}

impl SnapshotStore for RocksStore {
    fn insert(&self, network: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let value = serde_json::to_vec(snapshot)?;
        self.db.put(Self::key(network, snapshot.timestamp).as_bytes(), value)?;
        Ok(())
    }

    fn select_since(&self, network: &str, since: i64) -> Result<Vec<Snapshot>, StoreError> {
        let from = Self::key(network, since.saturating_add(1));
        self.scan(network, from.as_bytes())?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice::<Snapshot>(&value).map_err(StoreError::from))
            .collect()
    }

    fn retain_latest(&self, network: &str, keep: usize) -> Result<usize, StoreError> {
        let prefix = Self::prefix(network);
        let rows = self.scan(network, prefix.as_bytes())?;
        let excess = rows.len().saturating_sub(keep);
        if excess == 0 {
            return Ok(0);
        }

        let mut batch = WriteBatch::default();
        for (key, _) in rows.iter().take(excess) {
            batch.delete(key);
        }
        self.db.write(batch)?;
        Ok(excess)
    }
}
