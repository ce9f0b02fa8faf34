//! Latency side channel.
//!
//! The fetcher publishes every successful reading through [`LatencyPublisher`];
//! [`LatencyCache`] keeps the latest one per `(network, provider)` for the
//! latency board.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use crate::models::Reading;

pub trait LatencyPublisher: Send + Sync {
    fn publish(&self, network: &str, reading: &Reading);
}

/// Publisher that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl LatencyPublisher for NoopPublisher {
    fn publish(&self, _network: &str, _reading: &Reading) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyEntry {
    pub network: String,
    pub provider: String,
    pub endpoint: String,
    pub latency_ms: u64,
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct LatencyCache {
    entries: RwLock<HashMap<(String, String), LatencyEntry>>,
}

impl LatencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network: &str, provider: &str) -> Option<LatencyEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&(network.to_string(), provider.to_string())).cloned()
    }

    /// All entries, fastest first.
    pub fn leaderboard(&self) -> Vec<LatencyEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut board: Vec<LatencyEntry> = entries.values().cloned().collect();
        board.sort_by(|a, b| {
            a.latency_ms
                .cmp(&b.latency_ms)
                .then_with(|| a.network.cmp(&b.network))
                .then_with(|| a.provider.cmp(&b.provider))
        });
        board
    }
}

impl LatencyPublisher for LatencyCache {
    fn publish(&self, network: &str, reading: &Reading) {
        let Some(latency_ms) = reading.latency_ms else {
            return;
        };
        let entry = LatencyEntry {
            network: network.to_string(),
            provider: reading.provider.clone(),
            endpoint: reading.endpoint.clone(),
            latency_ms,
            timestamp: reading.timestamp,
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert((entry.network.clone(), entry.provider.clone()), entry);
    }
}
