use std::collections::BTreeMap;
use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// One provider's answer to `eth_blockNumber` in one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub provider: String,
    pub endpoint: String,
    pub height: BigUint,
    /// Request start, milliseconds since epoch.
    pub timestamp: i64,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub url: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl RpcEndpoint {
    /// Display name: the configured nickname, else the URL host, else the raw URL.
    pub fn display_name(&self) -> String {
        if let Some(nickname) = self.nickname.as_deref().filter(|n| !n.trim().is_empty()) {
            return nickname.trim().to_string();
        }
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Why a single provider fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    Connection,
    RpcError,
    MalformedResponse,
    Unknown,
}

impl FailureKind {
    /// Classifies a non-2xx HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            403 => Self::Connection,
            s if s >= 500 => Self::RpcError,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate-limit",
            Self::Connection => "connection",
            Self::RpcError => "rpc-error",
            Self::MalformedResponse => "malformed-response",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    Behind,
    FarBehind,
}

impl SyncStatus {
    pub fn from_blocks_behind(blocks_behind: u64) -> Self {
        match blocks_behind {
            0 => Self::Synced,
            1 => Self::Behind,
            _ => Self::FarBehind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(with = "height_string")]
    pub height: BigUint,
    pub endpoint: String,
    pub status: SyncStatus,
    pub blocks_behind: u64,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// Aggregated, classified result of one polling cycle for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: i64,
    pub providers: BTreeMap<String, ProviderStatus>,
    #[serde(default)]
    pub failures: BTreeMap<String, FailureKind>,
}

impl Snapshot {
    /// Highest height reported in this cycle.
    pub fn consensus_tip(&self) -> Option<&BigUint> {
        self.providers.values().map(|p| &p.height).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRateMetric {
    pub blocks_per_minute: f64,
    pub last_calculated: i64,
}

/// Serializes block heights as decimal strings so values beyond 2^53 survive JSON consumers.
pub mod height_string {
    use num_bigint::BigUint;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(height: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&height.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigUint::parse_bytes(raw.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("invalid decimal height: {raw}")))
    }
}
