// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cid::Cid;
use fvm_shared4::address::Address;
use fvm_shared4::piece::{PaddedPieceSize, PieceInfo};
use fvm_shared4::sector::{RegisteredSealProof, SectorNumber};
use multihash_codetable::{Code, MultihashDigest as _};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::db::{MemoryDB, setting_keys};
use crate::stored_counter::StoredCounter;

pub fn cid_of(data: &[u8]) -> Cid {
    Cid::new_v1(fvm_ipld_encoding::DAG_CBOR, Code::Blake2b256.digest(data))
}

pub fn piece_with_deal(deal_id: u64) -> SectorPiece {
    SectorPiece {
        piece: PieceInfo {
            size: PaddedPieceSize(2048),
            cid: cid_of(&deal_id.to_be_bytes()),
        },
        deal_id: Some(deal_id),
    }
}

/// A sector that was just marked for upgrade with a single deal.
pub fn sector_with_pieces(number: SectorNumber) -> SectorInfo {
    let mut sector = SectorInfo::new_committed(
        number,
        RegisteredSealProof::StackedDRG2KiBV1P1,
        Some(cid_of(b"comm_r")),
    );
    sector
        .apply(
            SectorEvent::StartReplicaUpdate {
                pieces: vec![piece_with_deal(42)],
            },
            0,
        )
        .unwrap();
    sector
}

pub fn test_context(number: SectorNumber) -> (Context, flume::Receiver<SectorEvent>) {
    let (tx, rx) = flume::unbounded();
    (Context::new(number, tx, CancellationToken::new()), rx)
}

pub fn cancelled_context(number: SectorNumber) -> (Context, flume::Receiver<SectorEvent>) {
    let (tx, rx) = flume::unbounded();
    let token = CancellationToken::new();
    token.cancel();
    (Context::new(number, tx, token), rx)
}

pub fn test_sealing(
    validator: Arc<MockValidator>,
    sealer: Arc<MockSealer>,
    configure: impl FnOnce(&mut SealingConfig),
) -> Arc<Sealing<MemoryDB>> {
    let mut config = SealingConfig::default();
    configure(&mut config);
    let db = Arc::new(MemoryDB::default());
    let counter = Arc::new(StoredCounter::new(db.clone(), setting_keys::SECTOR_COUNTER_KEY));
    Sealing::new(Address::new_id(1000), db, counter, validator, sealer, config).unwrap()
}

#[derive(Debug, Clone, Copy)]
enum CheckOutcome {
    Valid,
    InvalidDeals,
    ExpiredDeals,
    ApiError,
}

pub struct MockValidator {
    outcome: CheckOutcome,
    calls: AtomicUsize,
}

impl MockValidator {
    fn new(outcome: CheckOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn valid() -> Arc<Self> {
        Self::new(CheckOutcome::Valid)
    }

    pub fn invalid_deals() -> Arc<Self> {
        Self::new(CheckOutcome::InvalidDeals)
    }

    pub fn expired_deals() -> Arc<Self> {
        Self::new(CheckOutcome::ExpiredDeals)
    }

    pub fn api_error() -> Arc<Self> {
        Self::new(CheckOutcome::ApiError)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PieceValidator for MockValidator {
    async fn check_pieces(&self, _maddr: &Address, sector: &SectorInfo) -> PieceCheck {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            CheckOutcome::Valid => PieceCheck::Valid,
            CheckOutcome::InvalidDeals => PieceCheck::InvalidDeals {
                deal_ids: sector.deal_ids(),
                reason: "deal not found".into(),
            },
            CheckOutcome::ExpiredDeals => PieceCheck::ExpiredDeals {
                deal_ids: sector.deal_ids(),
                reason: "start epoch passed".into(),
            },
            CheckOutcome::ApiError => PieceCheck::ApiError(anyhow::anyhow!("chain head unavailable")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SealerMode {
    Ok,
    Recoverable,
    Fatal,
}

pub struct MockSealer {
    mode: SealerMode,
    calls: AtomicUsize,
    last_prove1_args: Mutex<Option<(Cid, ReplicaUpdateOut)>>,
}

impl MockSealer {
    fn new(mode: SealerMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            last_prove1_args: Mutex::new(None),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::new(SealerMode::Ok)
    }

    pub fn recoverable() -> Arc<Self> {
        Self::new(SealerMode::Recoverable)
    }

    pub fn fatal() -> Arc<Self> {
        Self::new(SealerMode::Fatal)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prove1_args(&self) -> Option<(Cid, ReplicaUpdateOut)> {
        *self.last_prove1_args.lock()
    }

    pub fn replica_update_out() -> ReplicaUpdateOut {
        ReplicaUpdateOut {
            new_sealed: cid_of(b"cidA"),
            new_unsealed: cid_of(b"cidB"),
        }
    }

    pub fn vanilla_proofs() -> ReplicaVanillaProofs {
        vec![vec![1, 2, 3], vec![4, 5, 6]]
    }

    pub fn proof() -> ReplicaUpdateProof {
        vec![0xaa; 192]
    }

    fn outcome<T>(&self, out: T) -> Result<T, SealerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SealerMode::Ok => Ok(out),
            SealerMode::Recoverable => Err(SealerError::Recoverable(anyhow::anyhow!(
                "worker disconnected"
            ))),
            SealerMode::Fatal => Err(SealerError::Fatal(anyhow::anyhow!("sector data corrupted"))),
        }
    }
}

#[async_trait::async_trait]
impl Sealer for MockSealer {
    async fn replica_update(
        &self,
        _sector: SectorRef,
        _pieces: &[PieceInfo],
    ) -> Result<ReplicaUpdateOut, SealerError> {
        self.outcome(Self::replica_update_out())
    }

    async fn prove_replica_update1(
        &self,
        _sector: SectorRef,
        sector_key: Cid,
        new_sealed: Cid,
        new_unsealed: Cid,
    ) -> Result<ReplicaVanillaProofs, SealerError> {
        *self.last_prove1_args.lock() = Some((
            sector_key,
            ReplicaUpdateOut {
                new_sealed,
                new_unsealed,
            },
        ));
        self.outcome(Self::vanilla_proofs())
    }

    async fn prove_replica_update2(
        &self,
        _sector: SectorRef,
        _sector_key: Cid,
        _new_sealed: Cid,
        _new_unsealed: Cid,
        _vanilla_proofs: ReplicaVanillaProofs,
    ) -> Result<ReplicaUpdateProof, SealerError> {
        self.outcome(Self::proof())
    }
}
