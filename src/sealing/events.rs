// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    ReplicaUpdateOut, ReplicaUpdateProof, ReplicaVanillaProofs, ReturnState, SectorInfo,
    SectorLog, SectorPiece, SectorState,
};

/// Events driving a sector through its states. Every applied event is
/// persisted together with the record it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
pub enum SectorEvent {
    StartReplicaUpdate { pieces: Vec<SectorPiece> },
    InvalidDealIds { return_state: ReturnState },
    DealsExpired { error: String },
    ReplicaUpdate { out: ReplicaUpdateOut },
    ProveReplicaUpdate1 { out: ReplicaVanillaProofs },
    ProveReplicaUpdate2 { proof: ReplicaUpdateProof },
    SealerFailed { error: String },
    SealerFatal { error: String },
    RetryReplicaUpdate { manual: bool },
    /// Re-runs the handler of the current state.
    Restart,
    Remove,
}

impl SectorEvent {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    fn log_message(&self) -> String {
        match self {
            Self::StartReplicaUpdate { pieces } => format!("upgrading with {} pieces", pieces.len()),
            Self::InvalidDealIds { return_state } => format!("returning to {return_state}"),
            Self::DealsExpired { error }
            | Self::SealerFailed { error }
            | Self::SealerFatal { error } => error.clone(),
            Self::ReplicaUpdate { out } => format!(
                "new sealed {}, new unsealed {}",
                out.new_sealed, out.new_unsealed
            ),
            Self::ProveReplicaUpdate1 { out } => format!("{} vanilla proofs", out.len()),
            Self::ProveReplicaUpdate2 { proof } => format!("proof of {} bytes", proof.len()),
            Self::RetryReplicaUpdate { manual } => match manual {
                true => "manual retry".into(),
                false => "automatic retry".into(),
            },
            Self::Restart | Self::Remove => String::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("sector {sector}: event {event} is not valid in state {state}")]
    UnexpectedEvent {
        sector: u64,
        state: SectorState,
        event: &'static str,
    },
    #[error("sector {0}: retry requested without a failed stage")]
    NoFailedStage(u64),
}

impl SectorInfo {
    /// Applies `event` to the record, moving it to the next state.
    ///
    /// The resulting state depends only on the current state and the event,
    /// so the handler that runs next is decided by the last applied event.
    /// On error the record is left untouched.
    pub fn apply(&mut self, event: SectorEvent, timestamp: i64) -> Result<(), PlanError> {
        use SectorState as S;

        let unexpected = |state| PlanError::UnexpectedEvent {
            sector: self.sector_number,
            state,
            event: event.name(),
        };
        let log = SectorLog {
            timestamp,
            kind: event.name().to_owned(),
            message: event.log_message(),
        };

        let next = match (&event, self.state) {
            (SectorEvent::StartReplicaUpdate { .. }, S::Proving) => S::ReplicaUpdate,
            (SectorEvent::InvalidDealIds { .. }, S::ReplicaUpdate) => S::InvalidDealIDs,
            (SectorEvent::DealsExpired { .. }, S::ReplicaUpdate) => S::DealsExpired,
            (SectorEvent::ReplicaUpdate { .. }, S::ReplicaUpdate) => S::ProveReplicaUpdate1,
            (SectorEvent::ProveReplicaUpdate1 { .. }, S::ProveReplicaUpdate1) => {
                S::ProveReplicaUpdate2
            }
            (SectorEvent::ProveReplicaUpdate2 { .. }, S::ProveReplicaUpdate2) => {
                S::SubmitReplicaUpdate
            }
            (SectorEvent::SealerFailed { .. }, state) if state.is_sealer_stage() => {
                S::ReplicaUpdateFailed
            }
            (SectorEvent::SealerFatal { .. }, state) if state.is_sealer_stage() => {
                S::FailedUnrecoverable
            }
            (SectorEvent::RetryReplicaUpdate { .. }, S::ReplicaUpdateFailed) => self
                .failed_stage
                .ok_or(PlanError::NoFailedStage(self.sector_number))?,
            (SectorEvent::Restart, state) => state,
            (SectorEvent::Remove, state) if state != S::Removed => S::Removed,
            (_, state) => return Err(unexpected(state)),
        };

        match event {
            SectorEvent::StartReplicaUpdate { pieces } => self.pieces = pieces,
            SectorEvent::InvalidDealIds { return_state } => self.return_state = Some(return_state),
            SectorEvent::DealsExpired { error } => self.last_error = Some(error),
            SectorEvent::ReplicaUpdate { out } => {
                self.replica_update_out = Some(out);
                self.clear_failures();
            }
            SectorEvent::ProveReplicaUpdate1 { out } => {
                self.prove_replica_update1_out = Some(out);
                self.clear_failures();
            }
            SectorEvent::ProveReplicaUpdate2 { proof } => {
                self.replica_update_proof = Some(proof);
                self.clear_failures();
            }
            SectorEvent::SealerFailed { error } => {
                self.failed_stage = Some(self.state);
                self.retries += 1;
                self.last_error = Some(error);
            }
            SectorEvent::SealerFatal { error } => {
                self.failed_stage = Some(self.state);
                self.last_error = Some(error);
            }
            SectorEvent::RetryReplicaUpdate { manual } => {
                if manual {
                    self.retries = 0;
                }
                self.failed_stage = None;
            }
            SectorEvent::Restart | SectorEvent::Remove => {}
        }

        self.state = next;
        self.log.push(log);
        Ok(())
    }

    fn clear_failures(&mut self) {
        self.retries = 0;
        self.last_error = None;
    }
}
