// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-sector event loop.
//!
//! Every sector with work to do gets one task. The task runs the handler for
//! the sector's current state, waits for the event the handler (or an operator)
//! emits, applies and persists it, and starts over. Since a sector only ever has
//! one task, its handlers never run concurrently and its events are applied in
//! the order they were sent. A task with nothing left to do deregisters itself
//! and exits; the next operator command starts a new one from the persisted
//! record.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use fvm_shared4::sector::SectorNumber;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{Sealing, SectorEvent, SectorInfo, SectorState};
use crate::db::SettingsStore;

/// Handed to every state handler. Emits the event that moves the sector on,
/// and carries the shutdown signal.
pub struct Context {
    sector: SectorNumber,
    events: flume::Sender<SectorEvent>,
    cancel: CancellationToken,
    emitted: AtomicBool,
    scheduled: Mutex<Option<(Duration, SectorEvent)>>,
}

impl Context {
    pub(super) fn new(
        sector: SectorNumber,
        events: flume::Sender<SectorEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sector,
            events,
            cancel,
            emitted: AtomicBool::new(false),
            scheduled: Mutex::new(None),
        }
    }

    pub fn send(&self, event: SectorEvent) -> anyhow::Result<()> {
        self.events
            .send(event)
            .map_err(|_| anyhow!("sector {} state machine is shut down", self.sector))?;
        self.emitted.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Applies `event` after `delay`, unless another event moves the sector on first.
    pub fn send_after(&self, delay: Duration, event: SectorEvent) {
        *self.scheduled.lock() = Some((delay, event));
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(super) fn emitted(&self) -> bool {
        self.emitted.load(Ordering::Relaxed)
    }

    pub(super) fn take_scheduled(&self) -> Option<(Duration, SectorEvent)> {
        self.scheduled.lock().take()
    }
}

/// An operator request, answered once the event is applied and persisted or
/// rejected.
pub(super) struct Command {
    pub(super) event: SectorEvent,
    pub(super) reply: oneshot::Sender<anyhow::Result<()>>,
}

enum Wake {
    Rerun,
    Apply(SectorEvent),
}

impl<DB> Sealing<DB> {
    /// Runs the handler for the sector's current state.
    pub(super) async fn plan(&self, ctx: &Context, sector: &SectorInfo) -> anyhow::Result<()> {
        match sector.state {
            SectorState::ReplicaUpdate => self.handle_replica_update(ctx, sector).await,
            SectorState::ProveReplicaUpdate1 => {
                self.handle_prove_replica_update1(ctx, sector).await
            }
            SectorState::ProveReplicaUpdate2 => {
                self.handle_prove_replica_update2(ctx, sector).await
            }
            SectorState::SubmitReplicaUpdate => {
                self.handle_submit_replica_update(ctx, sector).await
            }
            SectorState::ReplicaUpdateFailed => {
                self.handle_replica_update_failed(ctx, sector).await
            }
            SectorState::Proving
            | SectorState::InvalidDealIDs
            | SectorState::DealsExpired
            | SectorState::FailedUnrecoverable
            | SectorState::Removed => Ok(()),
        }
    }
}

impl<DB: SettingsStore + Send + Sync + 'static> Sealing<DB> {
    /// Drives one sector. With `run_handler` unset the task only waits for the
    /// command it was started for.
    pub(super) async fn run_sector(
        self: Arc<Self>,
        mut sector: SectorInfo,
        mut run_handler: bool,
        commands_tx: flume::Sender<Command>,
        commands: flume::Receiver<Command>,
    ) {
        let number = sector.sector_number;
        let (events_tx, events) = flume::unbounded();
        let mut wake: Option<(Instant, Wake)> = None;
        let mut idle = true;

        loop {
            if run_handler {
                let ctx = Context::new(number, events_tx.clone(), self.cancel.child_token());
                let res = self.plan(&ctx, &sector).await;
                wake = None;
                if let Err(e) = &res {
                    error!("sector {number}: {} handler failed: {e:#}", sector.state);
                    sector.last_error = Some(format!("{e:#}"));
                    if let Err(e) = self.persist(&sector) {
                        error!("sector {number}: failed to persist: {e:#}");
                        break;
                    }
                }
                if !ctx.emitted() {
                    if let Some((delay, event)) = ctx.take_scheduled() {
                        wake = Some((Instant::now() + delay, Wake::Apply(event)));
                    } else if res.is_ok() && sector.state.rerun_when_parked() {
                        wake = Some((
                            Instant::now() + self.config.checks_retry_interval,
                            Wake::Rerun,
                        ));
                    }
                }
                idle = !ctx.emitted() && wake.is_none();
            }

            if idle && events.is_empty() && self.retire(number, &commands_tx, &commands) {
                debug!("sector {number}: idle in {}", sector.state);
                return;
            }

            let deadline = wake.as_ref().map(|(at, _)| *at);
            // a finished handler run's event is applied before any command
            // queued while it ran
            let (event, reply) = tokio::select! {
                biased;
                Ok(event) = events.recv_async() => (event, None),
                Ok(Command { event, reply }) = commands.recv_async() => (event, Some(reply)),
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    match wake.take() {
                        Some((_, Wake::Apply(event))) => (event, None),
                        _ => {
                            debug!("sector {number}: re-running {}", sector.state);
                            run_handler = true;
                            continue;
                        }
                    }
                }
            };

            let mut next = sector.clone();
            let name = event.name();
            let res = match next.apply(event, chrono::Utc::now().timestamp()) {
                Ok(()) => match self.persist(&next) {
                    Ok(()) => {
                        debug!("sector {number}: {name}: {} -> {}", sector.state, next.state);
                        sector = next;
                        run_handler = true;
                        Ok(())
                    }
                    Err(e) => {
                        error!("sector {number}: failed to persist {name}: {e:#}");
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(e));
                        }
                        break;
                    }
                },
                Err(e) => {
                    warn!("dropping event: {e}");
                    run_handler = false;
                    idle = wake.is_none();
                    Err(e.into())
                }
            };
            if let Some(reply) = reply {
                let _ = reply.send(res);
            }
        }

        let mut sectors = self.sectors.lock();
        if sectors
            .get(&number)
            .is_some_and(|s| s.same_channel(&commands_tx))
        {
            sectors.remove(&number);
        }
    }

    /// Deregisters the task unless a command is already waiting for it.
    fn retire(
        &self,
        number: SectorNumber,
        commands_tx: &flume::Sender<Command>,
        commands: &flume::Receiver<Command>,
    ) -> bool {
        let mut sectors = self.sectors.lock();
        if !commands.is_empty() {
            return false;
        }
        if sectors
            .get(&number)
            .is_some_and(|s| s.same_channel(commands_tx))
        {
            sectors.remove(&number);
        }
        true
    }
}
