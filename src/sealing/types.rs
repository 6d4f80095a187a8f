// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared4::ActorID;
use fvm_shared4::deal::DealID;
use fvm_shared4::piece::PieceInfo;
use fvm_shared4::sector::{RegisteredSealProof, SectorID, SectorNumber};
use serde::{Deserialize, Serialize};

use super::SectorState;

/// Output of the replica-update encoding: the new sealed and unsealed commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaUpdateOut {
    pub new_sealed: Cid,
    pub new_unsealed: Cid,
}

/// Vanilla (unaggregated) replica-update proofs, one per partition.
pub type ReplicaVanillaProofs = Vec<Vec<u8>>;

/// Final SNARK proof of the replica update, ready for chain submission.
pub type ReplicaUpdateProof = Vec<u8>;

/// Sector identity and proof scheme handed to the [`Sealer`](super::Sealer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorRef {
    pub id: SectorID,
    pub proof_type: RegisteredSealProof,
}

/// A piece placed in the sector, with the deal backing it if there is one.
/// Pieces without a deal are filler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorPiece {
    pub piece: PieceInfo,
    pub deal_id: Option<DealID>,
}

/// Where the broader sealing pipeline should resume after a sector was bounced
/// out of the replica-update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ReturnState {
    PreCommit1,
    PreCommit2,
    Commit,
}

/// Audit-log entry, appended for every applied event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorLog {
    /// Unix timestamp, seconds.
    pub timestamp: i64,
    pub kind: String,
    pub message: String,
}

/// Persisted state of one sector. Only that sector's own state machine
/// mutates it, one applied event at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorInfo {
    pub state: SectorState,
    pub sector_number: SectorNumber,
    pub sector_type: RegisteredSealProof,

    pub pieces: Vec<SectorPiece>,
    pub comm_r: Option<Cid>,

    // replica update
    pub replica_update_out: Option<ReplicaUpdateOut>,
    pub prove_replica_update1_out: Option<ReplicaVanillaProofs>,
    pub replica_update_proof: Option<ReplicaUpdateProof>,

    // recovery
    pub return_state: Option<ReturnState>,
    pub failed_stage: Option<SectorState>,
    pub retries: u64,
    pub last_error: Option<String>,

    pub log: Vec<SectorLog>,
}

impl SectorInfo {
    /// A committed-capacity sector in [`SectorState::Proving`], eligible for an upgrade.
    pub fn new_committed(
        sector_number: SectorNumber,
        sector_type: RegisteredSealProof,
        comm_r: Option<Cid>,
    ) -> Self {
        Self {
            state: SectorState::Proving,
            sector_number,
            sector_type,
            pieces: vec![],
            comm_r,
            replica_update_out: None,
            prove_replica_update1_out: None,
            replica_update_proof: None,
            return_state: None,
            failed_stage: None,
            retries: 0,
            last_error: None,
            log: vec![],
        }
    }

    pub fn piece_infos(&self) -> Vec<PieceInfo> {
        self.pieces.iter().map(|p| p.piece.clone()).collect()
    }

    pub fn deal_ids(&self) -> Vec<DealID> {
        self.pieces.iter().filter_map(|p| p.deal_id).collect()
    }

    pub fn sector_ref(&self, miner: ActorID) -> SectorRef {
        SectorRef {
            id: SectorID {
                miner,
                number: self.sector_number,
            },
            proof_type: self.sector_type,
        }
    }
}
