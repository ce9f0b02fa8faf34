//! Blocks-per-minute estimate over the recent consensus tips.

use num_traits::ToPrimitive;

use crate::history::History;
use crate::models::BlockRateMetric;

pub const DEFAULT_RECOMPUTE_MS: i64 = 30_000;
pub const DEFAULT_SAMPLE_WINDOW: usize = 18;

#[derive(Debug, Clone, Copy)]
pub struct RateEstimator {
    recompute_ms: i64,
    sample_window: usize,
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RECOMPUTE_MS, DEFAULT_SAMPLE_WINDOW)
    }
}

impl RateEstimator {
    pub fn new(recompute_ms: i64, sample_window: usize) -> Self {
        Self { recompute_ms, sample_window }
    }

    /// Recomputes at most once per `recompute_ms`; otherwise carries `previous` forward.
    ///
    /// Compares the oldest of the last `sample_window` snapshots with the newest.
    /// A tip that moved backwards counts as zero blocks.
    pub fn estimate(&self, history: &History, previous: &BlockRateMetric, now: i64) -> BlockRateMetric {
        if now - previous.last_calculated <= self.recompute_ms || history.len() < 2 {
            return *previous;
        }

        let window = history.recent(self.sample_window);
        let (Some(oldest), Some(newest)) = (window.first(), window.last()) else {
            return *previous;
        };
        let elapsed_ms = newest.timestamp - oldest.timestamp;
        if elapsed_ms <= 0 {
            return *previous;
        }
        let (Some(old_tip), Some(new_tip)) = (oldest.consensus_tip(), newest.consensus_tip()) else {
            return *previous;
        };

        let blocks = if new_tip > old_tip { (new_tip - old_tip).to_f64().unwrap_or(f64::MAX) } else { 0.0 };
        let minutes = elapsed_ms as f64 / 60_000.0;

        BlockRateMetric { blocks_per_minute: blocks / minutes, last_calculated: now }
    }
}

/// [`RateEstimator::estimate`] with the default cadence and window.
pub fn estimate(history: &History, previous: &BlockRateMetric, now: i64) -> BlockRateMetric {
    RateEstimator::default().estimate(history, previous, now)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use num_bigint::BigUint;

    use super::*;
    use crate::models::{ProviderStatus, Snapshot, SyncStatus};

    fn snapshot(timestamp: i64, tip: u64) -> Snapshot {
        let status = ProviderStatus {
            height: BigUint::from(tip),
            endpoint: "https://a.example".to_string(),
            status: SyncStatus::Synced,
            blocks_behind: 0,
            latency_ms: None,
        };
        Snapshot {
            timestamp,
            providers: BTreeMap::from([("A".to_string(), status)]),
            failures: BTreeMap::new(),
        }
    }

    fn history(points: &[(i64, u64)]) -> History {
        let mut history = History::default();
        for &(t, tip) in points {
            history.append(snapshot(t, tip), t);
        }
        history
    }

    #[test]
    fn test_two_minutes_ten_blocks() {
        let history = history(&[(0, 1000), (120_000, 1010)]);
        let metric = estimate(&history, &BlockRateMetric::default(), 120_001);
        assert_eq!(metric.blocks_per_minute, 5.0);
        assert_eq!(metric.last_calculated, 120_001);
    }

    #[test]
    fn test_fewer_than_two_snapshots_keeps_previous() {
        let previous = BlockRateMetric { blocks_per_minute: 4.2, last_calculated: 0 };
        assert_eq!(estimate(&History::default(), &previous, 1_000_000), previous);
        assert_eq!(estimate(&history(&[(0, 10)]), &previous, 1_000_000), previous);
    }

    #[test]
    fn test_throttled_between_windows() {
        let history = history(&[(0, 1000), (60_000, 1005), (120_000, 1010)]);
        let previous = BlockRateMetric { blocks_per_minute: 1.0, last_calculated: 100_000 };
        assert_eq!(estimate(&history, &previous, 130_000), previous);

        let fresh = estimate(&history, &previous, 130_001);
        assert_eq!(fresh.blocks_per_minute, 5.0);
    }

    #[test]
    fn test_zero_elapsed_keeps_previous() {
        let history = history(&[(50_000, 1000), (50_000, 1010)]);
        let previous = BlockRateMetric { blocks_per_minute: 3.0, last_calculated: 0 };
        assert_eq!(estimate(&history, &previous, 100_000), previous);
    }

    #[test]
    fn test_uses_last_eighteen_snapshots() {
        // 30 samples 10s apart; early ones at a slow rate, recent ones at 12 blocks/min.
        let mut points = Vec::new();
        let mut tip = 0;
        for i in 0..30 {
            tip += if i < 12 { 1 } else { 2 };
            points.push((i as i64 * 10_000, tip));
        }
        let history = history(&points);
        let metric = estimate(&history, &BlockRateMetric::default(), 300_000);
        // Window spans samples 12..=29: 17 gaps of 2 blocks over 170s.
        let expected = 34.0 / (170_000.0 / 60_000.0);
        assert!((metric.blocks_per_minute - expected).abs() < 1e-9);
    }

    #[test]
    fn test_backwards_tip_is_zero_rate() {
        let history = history(&[(0, 1010), (60_000, 1000)]);
        let metric = estimate(&history, &BlockRateMetric::default(), 60_001);
        assert_eq!(metric.blocks_per_minute, 0.0);
        assert_eq!(metric.last_calculated, 60_001);
    }
}
