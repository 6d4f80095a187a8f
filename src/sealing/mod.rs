// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Replica-update sealing pipeline.
//!
//! A committed-capacity sector marked for an upgrade moves through
//! [`SectorState::ReplicaUpdate`], [`SectorState::ProveReplicaUpdate1`] and
//! [`SectorState::ProveReplicaUpdate2`] until its proof is ready in
//! [`SectorState::SubmitReplicaUpdate`]. Each sector is driven by its own
//! task and its record is persisted after every transition, so
//! [`Sealing::restore`] picks every sector up where it left off after a
//! restart.

mod checks;
mod config;
mod events;
mod fsm;
mod sealer;
mod sector_state;
mod states_failed;
mod states_replica_update;
#[cfg(test)]
mod test_utils;
mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::HashMap;
use anyhow::{Context as _, anyhow, bail};
use cid::Cid;
use fvm_shared4::ActorID;
use fvm_shared4::address::Address;
use fvm_shared4::sector::{RegisteredSealProof, SectorNumber};
use itertools::Itertools as _;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use self::checks::{PieceCheck, PieceValidator};
pub use self::config::SealingConfig;
pub use self::events::{PlanError, SectorEvent};
pub use self::fsm::Context;
use self::fsm::Command;
pub use self::sealer::{Sealer, SealerError};
pub use self::sector_state::SectorState;
pub use self::types::*;

use crate::db::{SettingsStore, SettingsStoreExt, setting_keys};
use crate::stored_counter::{self, StoredCounter};

/// Entry point of the sealing pipeline for a single miner.
pub struct Sealing<DB> {
    maddr: Address,
    miner: ActorID,
    db: Arc<DB>,
    counter: Arc<StoredCounter<DB>>,
    validator: Arc<dyn PieceValidator>,
    sealer: Arc<dyn Sealer>,
    config: SealingConfig,

    sectors: Mutex<HashMap<SectorNumber, flume::Sender<Command>>>,
    tasks: Mutex<JoinSet<()>>,
    cancel: CancellationToken,
}

impl<DB: SettingsStore + Send + Sync + 'static> Sealing<DB> {
    /// `maddr` must be an ID address.
    pub fn new(
        maddr: Address,
        db: Arc<DB>,
        counter: Arc<StoredCounter<DB>>,
        validator: Arc<dyn PieceValidator>,
        sealer: Arc<dyn Sealer>,
        config: SealingConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let miner = maddr
            .id()
            .with_context(|| format!("miner address {maddr} is not an ID address"))?;
        Ok(Arc::new(Self {
            maddr,
            miner,
            db,
            counter,
            validator,
            sealer,
            config,
            sectors: Default::default(),
            tasks: Default::default(),
            cancel: CancellationToken::new(),
        }))
    }

    /// Starts a state machine for every persisted sector that was not removed.
    /// Called once at startup.
    pub fn restore(self: &Arc<Self>) -> anyhow::Result<usize> {
        let mut restored = 0;
        for number in self.sectors_list()? {
            let sector = self.sector_status(number)?;
            if sector.state == SectorState::Removed {
                continue;
            }
            self.start_sector(sector)?;
            restored += 1;
        }
        info!("restored {restored} sectors");
        Ok(restored)
    }

    /// Allocates a fresh sector number.
    pub fn next_sector_number(&self) -> Result<SectorNumber, stored_counter::Error> {
        self.counter.next()
    }

    /// Registers a new committed-capacity sector under a freshly allocated number.
    pub fn add_committed_sector(
        self: &Arc<Self>,
        sector_type: RegisteredSealProof,
        comm_r: Option<Cid>,
    ) -> anyhow::Result<SectorNumber> {
        let number = self.next_sector_number()?;
        self.create_sector(SectorInfo::new_committed(number, sector_type, comm_r))?;
        Ok(number)
    }

    /// Registers a committed-capacity sector sealed elsewhere. The sector
    /// counter is moved past `number` so it is never handed out again.
    pub fn import_sector(
        self: &Arc<Self>,
        number: SectorNumber,
        sector_type: RegisteredSealProof,
        comm_r: Option<Cid>,
    ) -> anyhow::Result<()> {
        match self.counter.set(number) {
            // an older number never rewinds the counter
            Ok(()) | Err(stored_counter::Error::InvalidDecrease { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.create_sector(SectorInfo::new_committed(number, sector_type, comm_r))
    }

    /// Selects a proving committed-capacity sector for a replica update with
    /// `pieces`. Resolves once the sector has entered
    /// [`SectorState::ReplicaUpdate`], or with the reason it could not.
    pub async fn mark_for_upgrade(
        self: &Arc<Self>,
        number: SectorNumber,
        pieces: Vec<SectorPiece>,
    ) -> anyhow::Result<()> {
        let sector = self.sector_status(number)?;
        if sector.state != SectorState::Proving {
            bail!(
                "can't mark sector {number} for upgrade in state {}",
                sector.state
            );
        }
        self.send_event(number, SectorEvent::StartReplicaUpdate { pieces })
            .await
    }

    /// Retries the failed stage of a sector parked in [`SectorState::ReplicaUpdateFailed`],
    /// cutting a pending automatic retry short.
    pub async fn retry_failed(self: &Arc<Self>, number: SectorNumber) -> anyhow::Result<()> {
        self.send_event(number, SectorEvent::RetryReplicaUpdate { manual: true })
            .await
    }

    /// Re-runs the handler of the sector's current state. Applied once the
    /// sector is waiting, never while a handler run is in flight.
    pub async fn restart_sector(self: &Arc<Self>, number: SectorNumber) -> anyhow::Result<()> {
        self.send_event(number, SectorEvent::Restart).await
    }

    pub async fn remove_sector(self: &Arc<Self>, number: SectorNumber) -> anyhow::Result<()> {
        self.send_event(number, SectorEvent::Remove).await
    }

    pub fn sectors_list(&self) -> anyhow::Result<Vec<SectorNumber>> {
        Ok(self
            .db
            .setting_keys()?
            .iter()
            .filter_map(|key| key.strip_prefix(setting_keys::SECTOR_PREFIX))
            .filter_map(|number| number.parse().ok())
            .sorted()
            .collect())
    }

    /// Last persisted record of a sector: its state, stage outputs, last error and log.
    pub fn sector_status(&self, number: SectorNumber) -> anyhow::Result<SectorInfo> {
        self.db
            .read_obj(&setting_keys::sector_key(number))?
            .with_context(|| format!("sector {number} not found"))
    }

    /// Number of sectors in each state.
    pub fn sectors_summary(&self) -> anyhow::Result<BTreeMap<SectorState, usize>> {
        let mut summary = BTreeMap::new();
        for number in self.sectors_list()? {
            *summary.entry(self.sector_status(number)?.state).or_default() += 1;
        }
        Ok(summary)
    }

    /// Stops all sector state machines and waits for them. Sealer calls in flight
    /// run to completion and their result is persisted before the task exits.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("sector state machine panicked: {e}");
            }
        }
    }

    fn create_sector(self: &Arc<Self>, sector: SectorInfo) -> anyhow::Result<()> {
        let key = setting_keys::sector_key(sector.sector_number);
        if self.db.exists(&key)? {
            bail!("sector {} already exists", sector.sector_number);
        }
        self.persist(&sector)?;
        self.start_sector(sector)?;
        Ok(())
    }

    fn persist(&self, sector: &SectorInfo) -> anyhow::Result<()> {
        self.db
            .write_obj(&setting_keys::sector_key(sector.sector_number), sector)
    }

    /// Starts the sector's state machine unless it is already running.
    fn start_sector(self: &Arc<Self>, sector: SectorInfo) -> anyhow::Result<()> {
        let mut sectors = self.sectors.lock();
        if !sectors.contains_key(&sector.sector_number) {
            self.spawn_sector(&mut sectors, sector, true)?;
        }
        Ok(())
    }

    fn spawn_sector(
        self: &Arc<Self>,
        sectors: &mut HashMap<SectorNumber, flume::Sender<Command>>,
        sector: SectorInfo,
        run_handler: bool,
    ) -> anyhow::Result<flume::Sender<Command>> {
        if self.cancel.is_cancelled() {
            bail!("sealing is shut down");
        }
        let (tx, rx) = flume::unbounded();
        sectors.insert(sector.sector_number, tx.clone());
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.spawn(
            self.clone()
                .run_sector(sector, run_handler, tx.clone(), rx),
        );
        Ok(tx)
    }

    /// Hands `event` to the sector's state machine, starting it from the
    /// persisted record if needed, and waits until it is applied.
    async fn send_event(
        self: &Arc<Self>,
        number: SectorNumber,
        event: SectorEvent,
    ) -> anyhow::Result<()> {
        let (reply, applied) = oneshot::channel();
        {
            let mut sectors = self.sectors.lock();
            let tx = match sectors.get(&number) {
                Some(tx) => tx.clone(),
                None => {
                    let sector = self.sector_status(number)?;
                    self.spawn_sector(&mut sectors, sector, false)?
                }
            };
            tx.send(Command { event, reply })
                .map_err(|_| anyhow!("sector {number} state machine is not running"))?;
        }
        applied
            .await
            .map_err(|_| anyhow!("sector {number} state machine stopped before applying the event"))?
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.try_join_next() {
        if let Err(e) = res {
            error!("sector state machine panicked: {e}");
        }
    }
}
