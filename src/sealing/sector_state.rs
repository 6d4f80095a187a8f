// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

/// Stage of a sector in the replica-update pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
pub enum SectorState {
    /// Committed capacity, proven on chain and not yet selected for an upgrade.
    Proving,
    ReplicaUpdate,
    ProveReplicaUpdate1,
    ProveReplicaUpdate2,
    /// Proof is ready for the chain-submission step.
    SubmitReplicaUpdate,

    InvalidDealIDs,
    DealsExpired,
    /// The sealer failed in a way that may go away on retry.
    ReplicaUpdateFailed,
    FailedUnrecoverable,

    Removed,
}

impl SectorState {
    /// States whose handler invokes the sealer.
    pub fn is_sealer_stage(self) -> bool {
        matches!(
            self,
            Self::ReplicaUpdate | Self::ProveReplicaUpdate1 | Self::ProveReplicaUpdate2
        )
    }

    /// A parked sector in these states is re-run periodically rather than waiting
    /// for an external event.
    pub fn rerun_when_parked(self) -> bool {
        matches!(self, Self::ReplicaUpdate)
    }
}
