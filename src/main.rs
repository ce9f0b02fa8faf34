use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    response::Redirect,
    routing::{get, get_service},
    Router,
};
use chrono::Utc;
use clap::Parser;
use eyre::{Context, Result};
use tower_http::services::ServeDir;
use tracing::{error, info};

use evm_rpc_monitor::config::{load_config, AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LISTEN_IP, DEFAULT_PORT};
use evm_rpc_monitor::latency::LatencyCache;
use evm_rpc_monitor::logging::init_tracing;
use evm_rpc_monitor::metrics::{latency_board, list_networks, network_history, network_status, AppState};
use evm_rpc_monitor::poller::NetworkMonitor;
use evm_rpc_monitor::storage::{RocksStore, SnapshotStore};

/// CLI arguments
#[derive(Parser)]
#[command(name = "EVM RPC Monitor", about = "Block height sync monitor for EVM RPC providers")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// IP address to bind the server to
    #[arg(long)]
    listen_ip: Option<String>,

    /// Port to bind the server to
    #[arg(long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn cleanup_old_entries(store: &dyn SnapshotStore, networks: &[String], keep: usize) {
    for network in networks {
        match store.retain_latest(network, keep) {
            Ok(0) => {}
            Ok(removed) => info!(network = %network, removed, "pruned stored snapshots"),
            Err(e) => error!(network = %network, error = %e, "error cleaning up old entries"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let mut config: AppConfig = load_config(&args.config)?;

    if let Some(ip) = args.listen_ip {
        config.server.listen_ip = Some(ip);
    }
    if let Some(port) = args.port {
        config.server.port = Some(port);
    }

    let store: Arc<dyn SnapshotStore> = Arc::new(
        RocksStore::open(&config.storage.path)
            .wrap_err_with(|| format!("failed to open database at {}", config.storage.path))?,
    );
    let latency = Arc::new(LatencyCache::new());

    std::fs::create_dir_all("static")?;
    std::fs::write("static/index.html", include_str!("static/index.html"))?;

    let now = Utc::now().timestamp_millis();
    let mut networks = BTreeMap::new();
    for network in &config.networks {
        let monitor = Arc::new(NetworkMonitor::new(
            network,
            &config.polling,
            latency.clone(),
            Arc::clone(&store),
        ));
        if let Err(e) = monitor.hydrate(now).await {
            error!(network = %network.name, error = %e, "failed to restore history");
        }
        info!(
            network = %network.name,
            endpoints = network.endpoints.len(),
            interval_ms = config.polling.interval_ms,
            "starting monitor"
        );
        networks.insert(network.name.clone(), monitor.state());
        tokio::spawn(monitor.run());
    }

    let cleanup_store = Arc::clone(&store);
    let names: Vec<String> = networks.keys().cloned().collect();
    let retain_rows = config.storage.retain_rows;
    let cleanup_every = Duration::from_secs(config.storage.cleanup_interval_secs.max(1));
    tokio::spawn(async move {
        loop {
            let (store, names) = (Arc::clone(&cleanup_store), names.clone());
            let pruned =
                tokio::task::spawn_blocking(move || cleanup_old_entries(store.as_ref(), &names, retain_rows))
                    .await;
            if let Err(e) = pruned {
                error!(error = %e, "cleanup task failed");
            }
            tokio::time::sleep(cleanup_every).await;
        }
    });

    let state = AppState { networks: Arc::new(networks), latency, store };
    let app = Router::new()
        .route("/", get(|| async { Redirect::to("/static/index.html") }))
        .route("/api/networks", get(list_networks))
        .route("/api/networks/:network", get(network_status))
        .route("/api/networks/:network/history", get(network_history))
        .route("/api/latency", get(latency_board))
        .nest_service("/static", get_service(ServeDir::new("static")))
        .with_state(state);

    let ip = config
        .server
        .listen_ip
        .unwrap_or_else(|| DEFAULT_LISTEN_IP.to_string());
    let port = config.server.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", ip, port)
        .parse()
        .wrap_err("invalid listen address")?;

    info!(%addr, "server running");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
