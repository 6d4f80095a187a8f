// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::bail;
use tracing::{error, info, warn};

use super::{
    Context, PieceCheck, ReturnState, Sealing, SealerError, SectorEvent, SectorInfo, SectorState,
};

impl<DB> Sealing<DB> {
    pub(super) async fn handle_replica_update(
        &self,
        ctx: &Context,
        sector: &SectorInfo,
    ) -> anyhow::Result<()> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        // sanity check state
        match self.validator.check_pieces(&self.maddr, sector).await {
            PieceCheck::Valid => {}
            PieceCheck::ApiError(e) => {
                error!("handle_replica_update: api error, not proceeding: {e:#}");
                return Ok(());
            }
            PieceCheck::InvalidDeals { deal_ids, reason } => {
                warn!(
                    "invalid deals {deal_ids:?} in sector {}: {reason}",
                    sector.sector_number
                );
                return ctx.send(SectorEvent::InvalidDealIds {
                    return_state: ReturnState::PreCommit1,
                });
            }
            PieceCheck::ExpiredDeals { deal_ids, reason } => {
                warn!(
                    "expired deals {deal_ids:?} in sector {}: {reason}",
                    sector.sector_number
                );
                return ctx.send(SectorEvent::DealsExpired {
                    error: format!("expired dealIDs {deal_ids:?} in sector: {reason}"),
                });
            }
        }

        let out = self
            .sealer
            .replica_update(sector.sector_ref(self.miner), &sector.piece_infos())
            .await;
        ctx.send(sealer_event(sector, out, |out| SectorEvent::ReplicaUpdate {
            out,
        }))
    }

    pub(super) async fn handle_prove_replica_update1(
        &self,
        ctx: &Context,
        sector: &SectorInfo,
    ) -> anyhow::Result<()> {
        let Some(out) = sector.replica_update_out else {
            bail!(
                "invalid sector {} with nil ReplicaUpdate output",
                sector.sector_number
            );
        };
        let Some(comm_r) = sector.comm_r else {
            bail!("invalid sector {} with nil CommR", sector.sector_number);
        };
        if ctx.is_cancelled() {
            return Ok(());
        }

        let vanilla_proofs = self
            .sealer
            .prove_replica_update1(
                sector.sector_ref(self.miner),
                comm_r,
                out.new_sealed,
                out.new_unsealed,
            )
            .await;
        ctx.send(sealer_event(sector, vanilla_proofs, |out| {
            SectorEvent::ProveReplicaUpdate1 { out }
        }))
    }

    pub(super) async fn handle_prove_replica_update2(
        &self,
        ctx: &Context,
        sector: &SectorInfo,
    ) -> anyhow::Result<()> {
        let Some(out) = sector.replica_update_out else {
            bail!(
                "invalid sector {} with nil ReplicaUpdate output",
                sector.sector_number
            );
        };
        let Some(comm_r) = sector.comm_r else {
            bail!("invalid sector {} with nil CommR", sector.sector_number);
        };
        let Some(vanilla_proofs) = sector.prove_replica_update1_out.clone() else {
            bail!(
                "invalid sector {} with nil ProveReplicaUpdate1 output",
                sector.sector_number
            );
        };
        if ctx.is_cancelled() {
            return Ok(());
        }

        let proof = self
            .sealer
            .prove_replica_update2(
                sector.sector_ref(self.miner),
                comm_r,
                out.new_sealed,
                out.new_unsealed,
                vanilla_proofs,
            )
            .await;
        ctx.send(sealer_event(sector, proof, |proof| {
            SectorEvent::ProveReplicaUpdate2 { proof }
        }))
    }

    /// Chain submission picks the proof up from here.
    pub(super) async fn handle_submit_replica_update(
        &self,
        _ctx: &Context,
        sector: &SectorInfo,
    ) -> anyhow::Result<()> {
        info!(
            "sector {}: replica update proof ready for submission",
            sector.sector_number
        );
        Ok(())
    }
}

/// Maps the outcome of a sealer call to the event that records it.
fn sealer_event<T>(
    sector: &SectorInfo,
    res: Result<T, SealerError>,
    on_success: impl FnOnce(T) -> SectorEvent,
) -> SectorEvent {
    let (number, stage) = (sector.sector_number, sector.state);
    match res {
        Ok(out) => on_success(out),
        Err(SealerError::Recoverable(e)) => {
            warn!("sector {number}: {stage} failed: {e:#}");
            SectorEvent::SealerFailed {
                error: format!("{stage}: {e:#}"),
            }
        }
        Err(SealerError::Fatal(e)) => {
            error!("sector {number}: {stage} failed unrecoverably: {e:#}");
            SectorEvent::SealerFatal {
                error: format!("{stage}: {e:#}"),
            }
        }
    }
}
