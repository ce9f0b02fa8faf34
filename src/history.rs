use std::collections::VecDeque;

use crate::models::Snapshot;

pub const DEFAULT_WINDOW_MS: i64 = 600_000;

/// Time-windowed, chronological snapshots of one network.
///
/// Single writer: the network's polling session. Readers take clones.
#[derive(Debug, Clone)]
pub struct History {
    snapshots: VecDeque<Snapshot>,
    window_ms: i64,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl History {
    pub fn new(window_ms: i64) -> Self {
        Self { snapshots: VecDeque::new(), window_ms }
    }

    /// Appends `snapshot` and drops everything with `timestamp <= now - window`.
    ///
    /// Callers append in non-decreasing timestamp order.
    pub fn append(&mut self, snapshot: Snapshot, now: i64) {
        self.snapshots.push_back(snapshot);
        self.evict(now);
    }

    fn evict(&mut self, now: i64) {
        let cutoff = now - self.window_ms;
        while self.snapshots.front().is_some_and(|s| s.timestamp <= cutoff) {
            self.snapshots.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Snapshot> + ExactSizeIterator {
        self.snapshots.iter()
    }

    /// Up to `n` most recent snapshots, oldest first (sparkline input).
    pub fn recent(&self, n: usize) -> Vec<&Snapshot> {
        let skip = self.snapshots.len().saturating_sub(n);
        self.snapshots.iter().skip(skip).collect()
    }
}
