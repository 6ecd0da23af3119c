// src/worker/pool.rs

use std::mem;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::build::{BuildPipeline, BuildRequest};
use crate::engine::RuntimeEvent;
use crate::errors::{LibpackError, Result};
use crate::worker::protocol::{SlotId, WorkerCommand, WorkerExit, WorkerMessage};
use crate::worker::slot::{SlotState, WorkerSlot};

/// Double-buffered worker slots.
///
/// `active` runs builds; `next` is an idle, already started replacement.
/// Superseding a running build terminates `active`, promotes `next` and
/// starts a fresh `next`, so a new build never waits for a cold start.
///
/// All bookkeeping happens on the controller's event loop; slot promotion
/// is a plain field swap.
#[derive(Debug)]
pub struct WorkerPool {
    pipeline: BuildPipeline,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    next_id: SlotId,
    active: WorkerSlot,
    next: WorkerSlot,
}

impl WorkerPool {
    /// Start both slots idle. Must be called from within a tokio runtime.
    pub fn new(pipeline: BuildPipeline, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Result<Self> {
        let active = WorkerSlot::spawn(1, pipeline.clone(), runtime_tx.clone())?;
        let next = WorkerSlot::spawn(2, pipeline.clone(), runtime_tx.clone())?;
        Ok(Self {
            pipeline,
            runtime_tx,
            next_id: 3,
            active,
            next,
        })
    }

    pub fn active_id(&self) -> SlotId {
        self.active.id()
    }

    pub fn next_id(&self) -> SlotId {
        self.next.id()
    }

    pub fn active_state(&self) -> SlotState {
        self.active.state()
    }

    /// True iff the active slot is idle.
    pub fn is_ready(&self) -> bool {
        self.active.state() == SlotState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.active.state() == SlotState::Running
    }

    /// Start `request` on the active slot. The caller must have made the
    /// pool ready first (see [`terminate`](Self::terminate)).
    pub fn run(&mut self, request: BuildRequest) -> Result<()> {
        if !self.is_ready() {
            return Err(LibpackError::WorkerError(format!(
                "active worker {} is {:?}, not idle",
                self.active.id(),
                self.active.state()
            )));
        }
        let generation = request.generation;
        self.active.send(WorkerCommand::Build(request))?;
        self.active.set_state(SlotState::Running);
        debug!(slot = self.active.id(), generation, "build dispatched");
        Ok(())
    }

    /// Tear down the active slot and promote `next`.
    ///
    /// The old slot is detached before it is stopped, so none of its late
    /// messages reach the controller. Resolves once the old thread has
    /// exited and the promoted slot is usable. An idle active slot is left
    /// alone.
    pub async fn terminate(&mut self) -> Result<()> {
        if self.active.state() == SlotState::Idle {
            return Ok(());
        }

        let old_id = self.active.id();
        self.active.set_state(SlotState::Terminating);
        self.active.detach();
        let exit = self.active.stop().await;
        debug!(slot = old_id, ?exit, "terminated worker");

        let fresh = self.spawn_slot()?;
        let promoted = mem::replace(&mut self.next, fresh);
        let old = mem::replace(&mut self.active, promoted);
        drop(old);

        info!(
            old = old_id,
            active = self.active.id(),
            next = self.next.id(),
            "promoted standby worker"
        );
        Ok(())
    }

    /// Accept or drop a message from slot `slot`.
    ///
    /// Only the attached active slot's messages count. A terminal message
    /// returns the slot to idle.
    pub fn observe(&mut self, slot: SlotId, msg: &WorkerMessage) -> bool {
        if slot != self.active.id() || self.active.state() == SlotState::Terminating {
            debug!(slot, generation = msg.generation, "dropping message from stale worker");
            return false;
        }
        if msg.kind.is_terminal() && self.active.state() == SlotState::Running {
            self.active.set_state(SlotState::Idle);
        }
        true
    }

    /// React to a worker thread ending. Returns an error message when the
    /// exit was not requested.
    pub fn handle_exit(&mut self, slot: SlotId, exit: &WorkerExit) -> Result<Option<String>> {
        if slot == self.active.id() && self.active.state() != SlotState::Terminating {
            let was = self.active.state();
            self.active.set_state(SlotState::Dead);
            let detail = match exit {
                WorkerExit::Clean => "worker exited unexpectedly".to_string(),
                WorkerExit::Abnormal(message) => message.clone(),
            };
            warn!(slot, ?was, %detail, "active worker died");
            return Ok(Some(detail));
        }

        if slot == self.next.id() {
            warn!(slot, ?exit, "standby worker died; replacing it");
            self.next = self.spawn_slot()?;
        }
        Ok(None)
    }

    /// Stop both slots and wait for their threads.
    pub async fn shutdown(&mut self) {
        self.active.detach();
        self.next.detach();
        let active = self.active.stop().await;
        let next = self.next.stop().await;
        debug!(?active, ?next, "worker pool shut down");
    }

    fn spawn_slot(&mut self) -> Result<WorkerSlot> {
        let id = self.next_id;
        self.next_id += 1;
        WorkerSlot::spawn(id, self.pipeline.clone(), self.runtime_tx.clone())
    }
}
