use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use num_bigint::BigUint;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FetchFailure;
use crate::latency::LatencyPublisher;
use crate::models::{FailureKind, Reading, RpcEndpoint};

// Shared connection pool; per-request timeouts are applied by each fetcher.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    reqwest::ClientBuilder::new()
        .pool_idle_timeout(Duration::from_secs(300))
        .pool_max_idle_per_host(20)
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent("evm-rpc-monitor/0.1")
        .build()
        .expect("Failed to create HTTP client")
});

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: [(); 0],
    id: u64,
}

const BLOCK_NUMBER_REQUEST: JsonRpcRequest<'static> =
    JsonRpcRequest { jsonrpc: "2.0", method: "eth_blockNumber", params: [], id: 1 };

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRpcResponse {
    Failure { error: JsonRpcError },
    Success { result: String },
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Fetches `eth_blockNumber` from the endpoints of one network.
#[derive(Clone)]
pub struct RpcFetcher {
    network: String,
    client: Client,
    timeout: Duration,
    publisher: Arc<dyn LatencyPublisher>,
}

impl std::fmt::Debug for RpcFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcFetcher")
            .field("network", &self.network)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RpcFetcher {
    pub fn new(
        network: impl Into<String>,
        timeout: Duration,
        publisher: Arc<dyn LatencyPublisher>,
    ) -> Self {
        Self { network: network.into(), client: HTTP_CLIENT.clone(), timeout, publisher }
    }

    /// Single attempt; every failure comes back classified, never retried here.
    pub async fn fetch(&self, endpoint: &RpcEndpoint) -> Result<Reading, FetchFailure> {
        let provider = endpoint.display_name();
        let fail = |kind: FailureKind, message: String| {
            FetchFailure::new(provider.clone(), endpoint.url.clone(), kind, message)
        };

        let timestamp = Utc::now().timestamp_millis();
        let start = Instant::now();
        let response = self
            .client
            .post(&endpoint.url)
            .timeout(self.timeout)
            .json(&BLOCK_NUMBER_REQUEST)
            .send()
            .await
            .map_err(|e| fail(classify_transport(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(FailureKind::from_status(status.as_u16()), format!("HTTP error: {status}")));
        }

        let body = response.text().await.map_err(|e| fail(classify_transport(&e), e.to_string()))?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let height = parse_block_number(&body).map_err(|(kind, message)| fail(kind, message))?;

        let reading = Reading {
            provider: provider.clone(),
            endpoint: endpoint.url.clone(),
            height,
            timestamp,
            latency_ms: Some(latency_ms),
        };
        self.publisher.publish(&self.network, &reading);

        debug!(
            network = %self.network,
            provider = %reading.provider,
            height = %reading.height,
            latency_ms,
            "block number"
        );
        Ok(reading)
    }
}

fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        FailureKind::Connection
    } else {
        FailureKind::Unknown
    }
}

/// Parses a JSON-RPC `eth_blockNumber` body into an exact height.
fn parse_block_number(body: &str) -> Result<BigUint, (FailureKind, String)> {
    let response: JsonRpcResponse = serde_json::from_str(body)
        .map_err(|e| (FailureKind::MalformedResponse, format!("unexpected response shape: {e}")))?;

    match response {
        JsonRpcResponse::Failure { error } => Err((
            FailureKind::RpcError,
            format!("RPC error {}: {}", error.code, error.message),
        )),
        JsonRpcResponse::Success { result } => parse_hex_quantity(&result)
            .ok_or_else(|| (FailureKind::MalformedResponse, format!("invalid hex quantity: {result}"))),
    }
}

pub fn parse_hex_quantity(raw: &str) -> Option<BigUint> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
}
