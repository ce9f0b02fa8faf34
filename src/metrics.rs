use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::StoreError;
use crate::latency::{LatencyCache, LatencyEntry};
use crate::models::{BlockRateMetric, Snapshot, SyncStatus};
use crate::poller::SharedState;
use crate::storage::SnapshotStore;

/// Sparkline length on the status page.
pub const SPARKLINE_LEN: usize = 18;
const LEADERBOARD_LEN: usize = 4;

#[derive(Clone)]
pub struct AppState {
    pub networks: Arc<BTreeMap<String, SharedState>>,
    pub latency: Arc<LatencyCache>,
    pub store: Arc<dyn SnapshotStore>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub provider: String,
    pub height: String,
    pub blocks_behind: u64,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub consensus_tip: String,
    pub total_providers: usize,
    pub synced_providers: usize,
    pub failed_providers: usize,
    pub consensus_percentage: f64,
    pub fastest_provider: Option<String>,
    pub slowest_provider: Option<String>,
    pub fastest_latency: Option<u64>,
    pub slowest_latency: Option<u64>,
    pub average_latency: Option<f64>,
    pub latency_leaderboard: Vec<LeaderboardEntry>,
    pub height_leaderboard: Vec<LeaderboardEntry>,
}

pub fn summarize(snapshot: &Snapshot) -> NetworkSummary {
    let entries: Vec<LeaderboardEntry> = snapshot
        .providers
        .iter()
        .map(|(name, p)| LeaderboardEntry {
            provider: name.clone(),
            height: p.height.to_string(),
            blocks_behind: p.blocks_behind,
            latency_ms: p.latency_ms,
        })
        .collect();

    let total_providers = entries.len();
    let synced_providers = snapshot
        .providers
        .values()
        .filter(|p| p.status == SyncStatus::Synced)
        .count();
    let consensus_percentage = if total_providers == 0 {
        0.0
    } else {
        synced_providers as f64 / total_providers as f64 * 100.0
    };

    let timed: Vec<(&str, u64)> = entries
        .iter()
        .filter_map(|e| e.latency_ms.map(|l| (e.provider.as_str(), l)))
        .collect();
    let (fastest_provider, fastest_latency) =
        timed.iter().min_by_key(|(_, l)| *l).map(|(n, l)| (n.to_string(), *l)).unzip();
    let (slowest_provider, slowest_latency) =
        timed.iter().max_by_key(|(_, l)| *l).map(|(n, l)| (n.to_string(), *l)).unzip();
    let average_latency = (!timed.is_empty())
        .then(|| timed.iter().map(|(_, l)| *l as f64).sum::<f64>() / timed.len() as f64);

    let mut latency_leaderboard: Vec<LeaderboardEntry> =
        entries.iter().filter(|e| e.latency_ms.is_some()).cloned().collect();
    latency_leaderboard.sort_by_key(|e| e.latency_ms);
    latency_leaderboard.truncate(LEADERBOARD_LEN);

    let mut height_leaderboard = entries;
    height_leaderboard.sort_by(|a, b| {
        a.blocks_behind
            .cmp(&b.blocks_behind)
            .then_with(|| a.latency_ms.unwrap_or(u64::MAX).cmp(&b.latency_ms.unwrap_or(u64::MAX)))
    });
    height_leaderboard.truncate(LEADERBOARD_LEN);

    NetworkSummary {
        consensus_tip: snapshot.consensus_tip().map(ToString::to_string).unwrap_or_default(),
        total_providers,
        synced_providers,
        failed_providers: snapshot.failures.len(),
        consensus_percentage,
        fastest_provider,
        slowest_provider,
        fastest_latency,
        slowest_latency,
        average_latency,
        latency_leaderboard,
        height_leaderboard,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOverview {
    pub name: String,
    pub providers: usize,
    pub up: bool,
    pub consensus_tip: Option<String>,
    pub blocks_per_minute: f64,
    pub last_cycle: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipPoint {
    pub timestamp: i64,
    pub tip: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub network: String,
    pub providers: Vec<String>,
    pub latest: Option<Snapshot>,
    pub block_rate: BlockRateMetric,
    pub outage: Option<String>,
    pub last_cycle: Option<i64>,
    pub sparkline: Vec<TipPoint>,
    pub summary: Option<NetworkSummary>,
}

pub async fn list_networks(State(app): State<AppState>) -> Json<Vec<NetworkOverview>> {
    let mut overview = Vec::with_capacity(app.networks.len());
    for (name, state) in app.networks.iter() {
        let state = state.read().await;
        overview.push(NetworkOverview {
            name: name.clone(),
            providers: state.providers.len(),
            up: state.is_up(),
            consensus_tip: state
                .history
                .latest()
                .and_then(Snapshot::consensus_tip)
                .map(ToString::to_string),
            blocks_per_minute: state.block_rate.blocks_per_minute,
            last_cycle: state.last_cycle,
        });
    }
    Json(overview)
}

pub async fn network_status(
    State(app): State<AppState>,
    Path(network): Path<String>,
) -> Result<Json<NetworkStatus>, StatusCode> {
    let state = app.networks.get(&network).ok_or(StatusCode::NOT_FOUND)?;
    let state = state.read().await;

    let latest = state.history.latest().cloned();
    let sparkline = state
        .history
        .recent(SPARKLINE_LEN)
        .into_iter()
        .filter_map(|s| {
            s.consensus_tip().map(|tip| TipPoint { timestamp: s.timestamp, tip: tip.to_string() })
        })
        .collect();

    Ok(Json(NetworkStatus {
        network,
        providers: state.providers.clone(),
        summary: latest.as_ref().map(summarize),
        latest,
        block_rate: state.block_rate,
        outage: state.outage.clone(),
        last_cycle: state.last_cycle,
        sparkline,
    }))
}

pub async fn network_history(
    State(app): State<AppState>,
    Path(network): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Snapshot>>, StatusCode> {
    if !app.networks.contains_key(&network) {
        return Err(StatusCode::NOT_FOUND);
    }
    let from = params.get("from").and_then(|ts| ts.parse::<i64>().ok()).unwrap_or(0);

    let store = Arc::clone(&app.store);
    let name = network.clone();
    let rows = tokio::task::spawn_blocking(move || store.select_since(&name, from))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))
        .and_then(|rows| rows);

    rows.map(Json).map_err(|e| {
        error!(network = %network, error = %e, "failed to read snapshot history");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

pub async fn latency_board(
    State(app): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<LatencyEntry>> {
    let network_filter = params.get("network");
    let board = app
        .latency
        .leaderboard()
        .into_iter()
        .filter(|e| network_filter.map_or(true, |n| &e.network == n))
        .collect();
    Json(board)
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use tempfile::TempDir;
    use tokio::sync::RwLock;

    use super::*;
    use crate::consensus::classify;
    use crate::error::FetchFailure;
    use crate::latency::LatencyPublisher;
    use crate::models::{FailureKind, Reading};
    use crate::poller::NetworkState;
    use crate::storage::RocksStore;
    use crate::test_utils::reading;

    fn timed(provider: &str, height: u64, latency: Option<u64>) -> Result<Reading, FetchFailure> {
        let mut r = reading(provider, height, 0);
        r.latency_ms = latency;
        Ok(r)
    }

    fn app(dir: &TempDir) -> AppState {
        let mut state = NetworkState::new(vec!["A".into(), "B".into()], 600_000);
        for (t, h) in [(10_000, 100), (20_000, 101)] {
            let snapshot = classify(&[timed("A", h, Some(30)), timed("B", h - 1, Some(70))]).unwrap();
            let snapshot = Snapshot { timestamp: t, ..snapshot };
            state.history.append(snapshot, t);
        }
        state.block_rate = BlockRateMetric { blocks_per_minute: 6.0, last_calculated: 20_000 };

        let store = RocksStore::open(dir.path().join("db")).unwrap();
        for s in state.history.iter() {
            store.insert("ethereum", s).unwrap();
        }

        let latency = Arc::new(LatencyCache::new());
        latency.publish("ethereum", &reading("A", 1, 1));
        latency.publish("base", &reading("Z", 1, 1));

        AppState {
            networks: Arc::new(BTreeMap::from([(
                "ethereum".to_string(),
                Arc::new(RwLock::new(state)),
            )])),
            latency,
            store: Arc::new(store),
        }
    }

    #[test]
    fn test_summarize() {
        let snapshot = classify(&[
            timed("A", 100, Some(40)),
            timed("B", 100, Some(10)),
            timed("C", 99, Some(90)),
            timed("D", 80, None),
            Err(FetchFailure::new("E", "https://e", FailureKind::Timeout, "slow")),
        ])
        .unwrap();
        let summary = summarize(&snapshot);

        assert_eq!(summary.consensus_tip, "100");
        assert_eq!(summary.total_providers, 4);
        assert_eq!(summary.synced_providers, 2);
        assert_eq!(summary.failed_providers, 1);
        assert_eq!(summary.consensus_percentage, 50.0);
        assert_eq!(summary.fastest_provider.as_deref(), Some("B"));
        assert_eq!(summary.slowest_provider.as_deref(), Some("C"));
        assert_eq!(summary.average_latency, Some(140.0 / 3.0));

        let by_latency: Vec<_> = summary.latency_leaderboard.iter().map(|e| e.provider.as_str()).collect();
        assert_eq!(by_latency, vec!["B", "A", "C"]);
        let by_height: Vec<_> = summary.height_leaderboard.iter().map(|e| e.provider.as_str()).collect();
        assert_eq!(by_height, vec!["B", "A", "C", "D"]);
    }

    #[test]
    fn test_summarize_without_latencies() {
        let snapshot = classify(&[timed("A", 1, None)]).unwrap();
        let summary = summarize(&snapshot);
        assert!(summary.fastest_provider.is_none());
        assert!(summary.average_latency.is_none());
        assert!(summary.latency_leaderboard.is_empty());
        assert_eq!(summary.consensus_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_network_status() {
        let dir = TempDir::new().unwrap();
        let Json(status) = network_status(State(app(&dir)), Path("ethereum".to_string()))
            .await
            .unwrap();

        assert_eq!(status.sparkline.len(), 2);
        assert_eq!(status.sparkline[1].tip, "101");
        let latest = status.latest.unwrap();
        assert_eq!(latest.providers["A"].height, BigUint::from(101u32));
        assert_eq!(status.block_rate.blocks_per_minute, 6.0);
        assert!(status.outage.is_none());
        assert_eq!(status.summary.unwrap().synced_providers, 1);
    }

    #[tokio::test]
    async fn test_unknown_network_is_404() {
        let dir = TempDir::new().unwrap();
        let err = network_status(State(app(&dir)), Path("nope".to_string())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_networks() {
        let dir = TempDir::new().unwrap();
        let Json(list) = list_networks(State(app(&dir))).await;
        assert_eq!(list.len(), 1);
        assert!(list[0].up);
        assert_eq!(list[0].providers, 2);
        assert_eq!(list[0].consensus_tip.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn test_network_history_filters_by_from() {
        let dir = TempDir::new().unwrap();
        let params = HashMap::from([("from".to_string(), "10000".to_string())]);
        let Json(rows) = network_history(State(app(&dir)), Path("ethereum".to_string()), Query(params))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, 20_000);
    }

    #[tokio::test]
    async fn test_latency_board_filter() {
        let dir = TempDir::new().unwrap();
        let Json(all) = latency_board(State(app(&dir)), Query(HashMap::new())).await;
        assert_eq!(all.len(), 2);

        let params = HashMap::from([("network".to_string(), "base".to_string())]);
        let Json(base) = latency_board(State(app(&dir)), Query(params)).await;
        assert_eq!(base.len(), 1);
        assert_eq!(base[0].provider, "Z");
    }

    #[test]
    fn test_dashboard_renders_values_as_text() {
        let page = include_str!("static/index.html");
        assert!(!page.contains("innerHTML"));
        assert!(page.contains("textContent"));
    }
}
