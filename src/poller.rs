//! Per-network polling session.
//!
//! Each monitored network gets one [`NetworkMonitor`]: it fans out one fetch per
//! endpoint every tick, waits for all of them, classifies the cycle and folds it
//! into the network's history and block-rate estimate. It is the only writer of
//! its [`NetworkState`]; HTTP handlers take read locks and clone what they need.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{NetworkConfig, PollingConfig};
use crate::consensus::classify;
use crate::error::{CycleError, StoreError};
use crate::history::History;
use crate::latency::LatencyPublisher;
use crate::models::{BlockRateMetric, RpcEndpoint, Snapshot};
use crate::rate::RateEstimator;
use crate::rpc::RpcFetcher;
use crate::storage::SnapshotStore;

#[derive(Debug, Clone)]
pub struct NetworkState {
    pub providers: Vec<String>,
    pub history: History,
    pub block_rate: BlockRateMetric,
    /// Set while the last cycle had no successful reading.
    pub outage: Option<String>,
    pub last_cycle: Option<i64>,
}

impl NetworkState {
    pub fn new(providers: Vec<String>, window_ms: i64) -> Self {
        Self {
            providers,
            history: History::new(window_ms),
            block_rate: BlockRateMetric::default(),
            outage: None,
            last_cycle: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.outage.is_none() && !self.history.is_empty()
    }
}

pub type SharedState = Arc<RwLock<NetworkState>>;

pub struct NetworkMonitor {
    name: String,
    endpoints: Vec<RpcEndpoint>,
    fetcher: RpcFetcher,
    estimator: RateEstimator,
    window_ms: i64,
    interval: Duration,
    store: Arc<dyn SnapshotStore>,
    state: SharedState,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl NetworkMonitor {
    pub fn new(
        network: &NetworkConfig,
        polling: &PollingConfig,
        publisher: Arc<dyn LatencyPublisher>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let providers = network.endpoints.iter().map(RpcEndpoint::display_name).collect();
        Self {
            name: network.name.clone(),
            endpoints: network.endpoints.clone(),
            fetcher: RpcFetcher::new(network.name.clone(), polling.timeout(), publisher),
            estimator: RateEstimator::new(polling.rate_recompute_ms, polling.rate_sample_window),
            window_ms: polling.history_window_ms,
            interval: polling.interval(),
            store,
            state: Arc::new(RwLock::new(NetworkState::new(providers, polling.history_window_ms))),
        }
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Reloads stored snapshots still inside the history window.
    pub async fn hydrate(&self, now: i64) -> Result<usize, StoreError> {
        let store = Arc::clone(&self.store);
        let network = self.name.clone();
        let since = now - self.window_ms;
        let rows = tokio::task::spawn_blocking(move || store.select_since(&network, since))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        let count = rows.len();

        let mut state = self.state.write().await;
        for snapshot in rows {
            state.history.append(snapshot, now);
        }
        let rate = self.estimator.estimate(&state.history, &state.block_rate, now);
        state.block_rate = rate;
        state.last_cycle = state.history.latest().map(|s| s.timestamp);

        info!(network = %self.name, snapshots = count, "restored history");
        Ok(count)
    }

    /// Polls forever on a fixed interval. A failed cycle never stops the loop.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Outcome is already recorded in state; the next tick retries.
            let _ = self.poll_once().await;
        }
    }

    /// One cycle: fetch every endpoint concurrently, then classify and record.
    pub async fn poll_once(&self) -> Result<Snapshot, CycleError> {
        let outcomes = join_all(self.endpoints.iter().map(|e| self.fetcher.fetch(e))).await;

        for failure in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            warn!(
                network = %self.name,
                provider = %failure.provider,
                kind = %failure.kind,
                error = %failure.message,
                "fetch failed"
            );
        }

        self.record(classify(&outcomes), Utc::now().timestamp_millis()).await
    }

    async fn record(
        &self,
        result: Result<Snapshot, CycleError>,
        now: i64,
    ) -> Result<Snapshot, CycleError> {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(network = %self.name, error = %e, "network down this cycle");
                let mut state = self.state.write().await;
                state.outage = Some(format!("{} is currently down: {e}", self.name));
                state.last_cycle = Some(now);
                return Err(e);
            }
        };

        let store = Arc::clone(&self.store);
        let (network, row) = (self.name.clone(), snapshot.clone());
        match tokio::task::spawn_blocking(move || store.insert(&network, &row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(network = %self.name, error = %e, "failed to persist snapshot"),
            Err(e) => error!(network = %self.name, error = %e, "snapshot write task failed"),
        }

        let mut state = self.state.write().await;
        state.history.append(snapshot.clone(), now);
        let rate = self.estimator.estimate(&state.history, &state.block_rate, now);
        state.block_rate = rate;
        if state.outage.take().is_some() {
            info!(network = %self.name, "network recovered");
        }
        state.last_cycle = Some(now);

        debug!(
            network = %self.name,
            tip = %snapshot.consensus_tip().map(ToString::to_string).unwrap_or_default(),
            providers = snapshot.providers.len(),
            failed = snapshot.failures.len(),
            blocks_per_minute = state.block_rate.blocks_per_minute,
            "cycle complete"
        );
        Ok(snapshot)
    }
}
