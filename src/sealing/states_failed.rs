// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing::{error, info};

use super::{Context, Sealing, SectorEvent, SectorInfo};

impl<DB> Sealing<DB> {
    /// Retries the failed sealer stage after a backoff, or parks the sector for
    /// an operator once automatic retries are used up.
    pub(super) async fn handle_replica_update_failed(
        &self,
        ctx: &Context,
        sector: &SectorInfo,
    ) -> anyhow::Result<()> {
        let number = sector.sector_number;
        let stage = sector
            .failed_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown stage".into());
        let last_error = sector.last_error.as_deref().unwrap_or_default();

        let Some(delay) = self.config.sealer_retry_delay(sector.retries) else {
            error!(
                "sector {number}: {stage} failed {} times, waiting for a manual retry: {last_error}",
                sector.retries
            );
            return Ok(());
        };

        info!(
            "sector {number}: retrying {stage} in {}s (attempt {})",
            delay.as_secs_f64(),
            sector.retries
        );
        ctx.send_after(delay, SectorEvent::RetryReplicaUpdate { manual: false });
        Ok(())
    }
}
