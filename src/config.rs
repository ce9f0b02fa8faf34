use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::RpcEndpoint;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_LISTEN_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServerConfig {
    pub listen_ip: Option<String>,
    pub port: Option<u16>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub history_window_ms: i64,
    pub rate_recompute_ms: i64,
    /// How many of the most recent snapshots the block-rate estimate spans.
    pub rate_sample_window: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            timeout_ms: 5_000,
            history_window_ms: 600_000,
            rate_recompute_ms: 30_000,
            rate_sample_window: 18,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    pub retain_rows: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "rpc_metrics.db".to_string(),
            retain_rows: 100,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub endpoints: Vec<RpcEndpoint>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub networks: Vec<NetworkConfig>,
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.networks.is_empty() {
            return Err(ConfigError::Invalid("at least one [[networks]] entry is required".into()));
        }
        let mut seen = HashSet::new();
        for network in &self.networks {
            if network.name.is_empty() || network.name.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "network name `{}` must be non-empty and must not contain `:`",
                    network.name
                )));
            }
            if !seen.insert(network.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate network `{}`", network.name)));
            }
            if network.endpoints.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "network `{}` has no endpoints",
                    network.name
                )));
            }
            // Provider names key snapshots and the latency cache.
            let mut providers = HashSet::new();
            for endpoint in &network.endpoints {
                let name = endpoint.display_name();
                if !providers.insert(name.clone()) {
                    return Err(ConfigError::Invalid(format!(
                        "network `{}`: provider name `{name}` is used by more than one endpoint \
                         ({}); set a distinct `nickname`",
                        network.name, endpoint.url
                    )));
                }
            }
        }
        if self.polling.interval_ms == 0 || self.polling.timeout_ms == 0 {
            return Err(ConfigError::Invalid("polling interval and timeout must be non-zero".into()));
        }
        if self.polling.rate_sample_window < 2 {
            return Err(ConfigError::Invalid("rate_sample_window must be at least 2".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    AppConfig::from_toml(&config_str)
}
