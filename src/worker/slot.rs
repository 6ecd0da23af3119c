// src/worker/slot.rs

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::build::{BuildPipeline, EventSink, GenerationToken, PipelineOutcome};
use crate::engine::RuntimeEvent;
use crate::errors::{LibpackError, Result};
use crate::worker::protocol::{SlotId, WorkerCommand, WorkerExit, WorkerMessage, WorkerMessageKind};

/// Lifecycle state of a worker slot as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Running,
    Terminating,
    /// The thread exited while it was not being terminated.
    Dead,
}

/// One isolated execution context: a dedicated OS thread with its own
/// single-threaded tokio runtime.
///
/// Messages from the thread reach the controller through a forwarding task
/// (the listener). [`detach`](Self::detach) stops that task, after which
/// nothing the thread sends is ever delivered.
pub struct WorkerSlot {
    id: SlotId,
    state: SlotState,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    listener: Option<JoinHandle<()>>,
    exit: watch::Receiver<Option<WorkerExit>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("attached", &self.listener.is_some())
            .finish()
    }
}

impl WorkerSlot {
    /// Start an idle worker thread. Must be called from within a tokio
    /// runtime (the listener is spawned on it).
    pub fn spawn(
        id: SlotId,
        pipeline: BuildPipeline,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        let thread = thread::Builder::new()
            .name(format!("libpack-worker-{id}"))
            .spawn(move || worker_main(pipeline, cmd_rx, msg_tx, exit_tx))?;

        let listener = tokio::spawn(forward_messages(id, msg_rx, exit_rx.clone(), runtime_tx));
        debug!(slot = id, "worker slot spawned");

        Ok(Self {
            id,
            state: SlotState::Idle,
            commands: cmd_tx,
            listener: Some(listener),
            exit: exit_rx,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn set_state(&mut self, state: SlotState) {
        debug!(slot = self.id, from = ?self.state, to = ?state, "slot state");
        self.state = state;
    }

    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| {
            LibpackError::WorkerError(format!("worker {} is no longer accepting commands", self.id))
        })
    }

    /// Stop delivering this worker's messages to the controller.
    pub fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            debug!(slot = self.id, "detached worker listener");
        }
    }

    /// Ask the thread to cancel its build and exit, then wait until it has.
    ///
    /// When this returns, the worker can no longer write anything.
    pub async fn stop(&mut self) -> WorkerExit {
        let _ = self.commands.send(WorkerCommand::Shutdown);

        let exit = match self.exit.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(WorkerExit::Clean),
            Err(_) => WorkerExit::Abnormal("worker exited without reporting a status".to_string()),
        };

        if let Some(handle) = self.thread.take() {
            if tokio::task::spawn_blocking(move || handle.join()).await.is_err() {
                warn!(slot = self.id, "failed to join worker thread");
            }
        }
        exit
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.detach();
        // The thread exits on its own once it sees this (or the closed
        // channel); it is not joined here.
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }
}

/// Listener: pump worker messages into the runtime, then report how the
/// thread ended once its message channel closes.
async fn forward_messages(
    id: SlotId,
    mut msg_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    mut exit_rx: watch::Receiver<Option<WorkerExit>>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    while let Some(msg) = msg_rx.recv().await {
        if runtime_tx
            .send(RuntimeEvent::Worker { slot: id, msg })
            .await
            .is_err()
        {
            return;
        }
    }

    let exit = match exit_rx.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone().unwrap_or(WorkerExit::Clean),
        Err(_) => WorkerExit::Abnormal("worker exited without reporting a status".to_string()),
    };
    let _ = runtime_tx
        .send(RuntimeEvent::WorkerExited { slot: id, exit })
        .await;
}

fn worker_main(
    pipeline: BuildPipeline,
    cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    msg_tx: mpsc::UnboundedSender<WorkerMessage>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || -> std::result::Result<(), String> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("failed to start worker runtime: {e}"))?;
        rt.block_on(command_loop(pipeline, cmd_rx, msg_tx));
        // Dropping the runtime here also drops transform tasks still in
        // flight, before the exit status is published.
        drop(rt);
        Ok(())
    }));

    let exit = match outcome {
        Ok(Ok(())) => WorkerExit::Clean,
        Ok(Err(message)) => WorkerExit::Abnormal(message),
        Err(payload) => WorkerExit::Abnormal(panic_message(payload.as_ref())),
    };
    if !exit.is_clean() {
        error!(?exit, "worker thread exited abnormally");
    }
    let _ = exit_tx.send(Some(exit));
}

async fn command_loop(
    pipeline: BuildPipeline,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    msg_tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    while let Some(command) = cmd_rx.recv().await {
        let request = match command {
            WorkerCommand::Build(request) => request,
            WorkerCommand::Shutdown => break,
        };

        let generation = request.generation;
        let token = GenerationToken::new(generation);
        let sink: EventSink = {
            let tx = msg_tx.clone();
            Arc::new(move |event| {
                let _ = tx.send(WorkerMessage::from_pipeline(generation, event));
            })
        };

        let build = pipeline.run(&request, &token, sink);
        tokio::pin!(build);

        let mut shutdown = false;
        let result = loop {
            tokio::select! {
                res = &mut build => break res,
                command = cmd_rx.recv(), if !shutdown => match command {
                    Some(WorkerCommand::Shutdown) | None => {
                        debug!(generation, "shutdown requested; cancelling build");
                        token.cancel();
                        shutdown = true;
                    }
                    Some(WorkerCommand::Build(other)) => {
                        warn!(generation, rejected = other.generation, "worker busy; rejecting build");
                        let _ = msg_tx.send(WorkerMessage::new(
                            other.generation,
                            WorkerMessageKind::Error {
                                message: format!("worker is busy with generation {generation}"),
                                stack: None,
                                fatal: false,
                            },
                        ));
                    }
                },
            }
        };

        let kind = match result {
            Ok(PipelineOutcome::Completed { files, elapsed }) => {
                WorkerMessageKind::Completed { files, elapsed }
            }
            Ok(PipelineOutcome::Cancelled) => WorkerMessageKind::Cancelled,
            Err(err) => WorkerMessageKind::Error {
                message: err.to_string(),
                stack: err.cause_chain(),
                fatal: err.is_fatal(),
            },
        };
        let _ = msg_tx.send(WorkerMessage::new(generation, kind));

        if shutdown {
            break;
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
