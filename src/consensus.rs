//! Per-cycle sync classification against the highest reported height.

use std::collections::BTreeMap;

use num_bigint::BigUint;

use crate::error::{CycleError, FetchFailure};
use crate::models::{ProviderStatus, Reading, Snapshot, SyncStatus};

/// Folds one cycle's fetch outcomes into a [`Snapshot`].
///
/// The consensus tip is the maximum height among successful readings of this
/// cycle only. Providers at the tip are `synced`; a provider reported more than
/// once keeps its highest height. The snapshot timestamp is the earliest
/// successful reading's timestamp, i.e. the cycle start.
///
/// # Errors
///
/// Returns [`CycleError::NoSuccessfulReadings`] if no outcome is a reading.
pub fn classify(outcomes: &[Result<Reading, FetchFailure>]) -> Result<Snapshot, CycleError> {
    let mut best: BTreeMap<&str, &Reading> = BTreeMap::new();
    let mut failures = BTreeMap::new();

    for outcome in outcomes {
        match outcome {
            Ok(reading) => {
                let slot = best.entry(reading.provider.as_str()).or_insert(reading);
                if reading.height > slot.height {
                    *slot = reading;
                }
            }
            Err(failure) => {
                failures.insert(failure.provider.clone(), failure.kind);
            }
        }
    }

    let (Some(tip), Some(timestamp)) = (
        best.values().map(|r| &r.height).max(),
        best.values().map(|r| r.timestamp).min(),
    ) else {
        return Err(CycleError::NoSuccessfulReadings { failures });
    };

    let providers = best
        .iter()
        .map(|(name, reading)| {
            let blocks_behind = blocks_between(tip, &reading.height);
            let status = ProviderStatus {
                height: reading.height.clone(),
                endpoint: reading.endpoint.clone(),
                status: SyncStatus::from_blocks_behind(blocks_behind),
                blocks_behind,
                latency_ms: reading.latency_ms,
            };
            (name.to_string(), status)
        })
        .collect();

    // A provider that failed once but answered under the same name is not failed.
    failures.retain(|name, _| !best.contains_key(name.as_str()));

    Ok(Snapshot { timestamp, providers, failures })
}

fn blocks_between(tip: &BigUint, height: &BigUint) -> u64 {
    let gap = tip - height;
    u64::try_from(&gap).unwrap_or(u64::MAX)
}
