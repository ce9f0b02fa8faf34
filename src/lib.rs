//! Block-height sync monitor for EVM JSON-RPC providers.
//!
//! Polls `eth_blockNumber` on every configured endpoint of each network,
//! classifies providers against the highest height seen in the cycle and
//! tracks a blocks-per-minute estimate over a rolling ten minute history.

pub mod config;
pub mod consensus;
pub mod error;
pub mod history;
pub mod latency;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod poller;
pub mod rate;
pub mod rpc;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;
