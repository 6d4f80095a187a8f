// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared4::piece::PieceInfo;
use thiserror::Error;

use super::{ReplicaUpdateOut, ReplicaUpdateProof, ReplicaVanillaProofs, SectorRef};

#[derive(Debug, Error)]
pub enum SealerError {
    /// Worth retrying, e.g. a worker went away or ran out of resources.
    #[error("recoverable sealer error: {0:#}")]
    Recoverable(anyhow::Error),
    /// Retrying cannot succeed, e.g. the sector data is corrupted.
    #[error("fatal sealer error: {0:#}")]
    Fatal(anyhow::Error),
}

/// Performs the replica-update computations. Each call may block for a long
/// time; queueing and worker placement are up to the implementation.
#[async_trait::async_trait]
pub trait Sealer: Send + Sync {
    async fn replica_update(
        &self,
        sector: SectorRef,
        pieces: &[PieceInfo],
    ) -> Result<ReplicaUpdateOut, SealerError>;

    async fn prove_replica_update1(
        &self,
        sector: SectorRef,
        sector_key: Cid,
        new_sealed: Cid,
        new_unsealed: Cid,
    ) -> Result<ReplicaVanillaProofs, SealerError>;

    async fn prove_replica_update2(
        &self,
        sector: SectorRef,
        sector_key: Cid,
        new_sealed: Cid,
        new_unsealed: Cid,
        vanilla_proofs: ReplicaVanillaProofs,
    ) -> Result<ReplicaUpdateProof, SealerError>;
}
