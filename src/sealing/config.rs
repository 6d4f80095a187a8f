// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;

/// Policy knobs for the sealing pipeline, the `[sealing]` section of the config file.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct SealingConfig {
    /// Automatic retries after a recoverable sealer failure before the sector
    /// waits for an operator. `0` disables automatic retries.
    #[default(3)]
    pub max_sealer_retries: u64,
    /// Delay before the first automatic retry, doubled for each consecutive failure.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(Duration::from_secs(60))]
    pub sealer_retry_backoff: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(Duration::from_secs(15 * 60))]
    pub max_sealer_retry_backoff: Duration,
    /// How often a sector parked in `ReplicaUpdate` by a chain API error re-checks its deals.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(Duration::from_secs(60))]
    pub checks_retry_interval: Duration,
}

impl SealingConfig {
    /// Backoff before retry number `attempt` (1-based), or `None` once automatic
    /// retries are used up.
    pub fn sealer_retry_delay(&self, attempt: u64) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_sealer_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(u32::try_from(attempt - 1).unwrap_or(u32::MAX));
        Some(
            self.sealer_retry_backoff
                .saturating_mul(factor)
                .min(self.max_sealer_retry_backoff),
        )
    }
}
