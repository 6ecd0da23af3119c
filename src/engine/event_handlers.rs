// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeSet;
use std::mem;

use tracing::{debug, info, warn};

use crate::build::{BuildRequest, ProgressAggregator};
use crate::engine::LifecycleEvent;
use crate::types::{BuildTarget, RemovedPath, WatchEvent};
use crate::worker::{WorkerMessage, WorkerMessageKind};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Feed this change into the debounced trigger.
    Schedule(WatchEvent),
    /// Tear down the running build's worker before anything else runs.
    TerminateActive,
    /// Run this build on a ready worker.
    Dispatch(BuildRequest),
    /// Hand a lifecycle event to the reporter.
    Report(LifecycleEvent),
    /// Stop the runtime with this process exit code.
    Exit { code: i32 },
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    fn exit(mut commands: Vec<CoreCommand>, code: i32) -> Self {
        commands.push(CoreCommand::Exit { code });
        Self {
            commands,
            keep_running: false,
        }
    }
}

/// Generation bookkeeping owned by the controller.
#[derive(Debug, Default)]
pub struct BuildState {
    pub(crate) targets: Vec<BuildTarget>,
    pub(crate) generation: u64,
    pub(crate) in_flight: Option<u64>,
    /// Deletions seen since the last dispatch.
    pub(crate) pending_removed: BTreeSet<RemovedPath>,
    /// Deletions carried by the in-flight request. Dropped once it
    /// completes, merged back into `pending_removed` otherwise.
    pub(crate) in_flight_removed: Vec<RemovedPath>,
    pub(crate) shutting_down: bool,
}

impl BuildState {
    pub fn new(targets: Vec<BuildTarget>) -> Self {
        Self {
            targets,
            ..Self::default()
        }
    }

    fn restore_removals(&mut self) {
        let carried = mem::take(&mut self.in_flight_removed);
        self.pending_removed.extend(carried);
    }
}

/// A change passed the hash filter: remember deletions, then debounce.
///
/// Deletions are recorded here rather than on trigger because the debouncer
/// only keeps the latest event of a burst.
pub fn handle_change_accepted(state: &mut BuildState, change: WatchEvent) -> CoreStep {
    if state.shutting_down {
        return CoreStep::running(Vec::new());
    }
    if let Some(removed) = change.as_removed_path() {
        state.pending_removed.insert(removed);
    }
    CoreStep::running(vec![CoreCommand::Schedule(change)])
}

/// The debounce timer fired: start a new generation.
///
/// A build still in flight is superseded: its worker is terminated before
/// the new request is dispatched, and its removals carry over.
pub fn handle_trigger(state: &mut BuildState, change: WatchEvent) -> CoreStep {
    if state.shutting_down {
        return CoreStep::running(Vec::new());
    }

    let mut commands = Vec::new();
    if let Some(old) = state.in_flight.take() {
        info!(generation = old, "superseding running build");
        commands.push(CoreCommand::TerminateActive);
        commands.push(CoreCommand::Report(LifecycleEvent::Cancelled { generation: old }));
        state.restore_removals();
    }

    state.generation += 1;
    let generation = state.generation;
    state.in_flight = Some(generation);
    state.in_flight_removed = mem::take(&mut state.pending_removed).into_iter().collect();

    debug!(
        generation,
        kind = ?change.kind,
        path = ?change.path,
        removed = state.in_flight_removed.len(),
        "dispatching build"
    );

    let mut request = BuildRequest::new(generation);
    request.targets = state.targets.clone();
    request.removed = state.in_flight_removed.clone();
    commands.push(CoreCommand::Dispatch(request));

    CoreStep::running(commands)
}

/// Fold a worker message into the lifecycle. Messages for any generation
/// other than the in-flight one are stale and dropped.
pub fn handle_worker_message(
    state: &mut BuildState,
    progress: &mut ProgressAggregator,
    msg: WorkerMessage,
) -> CoreStep {
    let generation = msg.generation;
    if state.in_flight != Some(generation) {
        debug!(generation, in_flight = ?state.in_flight, "dropping stale worker message");
        return CoreStep::running(Vec::new());
    }

    let mut commands = Vec::new();
    match msg.kind {
        WorkerMessageKind::Started { targets, total } => {
            progress.reset(&targets, total);
            commands.push(CoreCommand::Report(LifecycleEvent::Started { generation }));
        }
        WorkerMessageKind::Progress {
            target, completed, ..
        } => {
            if let Some(value) = progress.report(target, completed) {
                commands.push(CoreCommand::Report(LifecycleEvent::Progress {
                    target: progress.slowest(),
                    completed: value,
                    total: progress.total(),
                }));
            }
        }
        WorkerMessageKind::Completed { files, elapsed } => {
            state.in_flight = None;
            state.in_flight_removed.clear();
            let total = progress.complete();
            debug!(generation, files, "build completed");
            commands.push(CoreCommand::Report(LifecycleEvent::Progress {
                target: progress.slowest(),
                completed: total,
                total,
            }));
            commands.push(CoreCommand::Report(LifecycleEvent::Completed {
                generation,
                elapsed,
            }));
        }
        WorkerMessageKind::Cancelled => {
            state.in_flight = None;
            state.restore_removals();
            commands.push(CoreCommand::Report(LifecycleEvent::Cancelled { generation }));
        }
        WorkerMessageKind::Error {
            message,
            stack,
            fatal,
        } => {
            state.in_flight = None;
            state.restore_removals();
            commands.push(CoreCommand::Report(LifecycleEvent::Error { message, stack }));
            if fatal {
                warn!(generation, "fatal build error; stopping");
                state.shutting_down = true;
                return CoreStep::exit(commands, 1);
            }
        }
    }

    CoreStep::running(commands)
}

/// The active worker died on its own. The build it was running is lost;
/// the next trigger recovers the pool.
pub fn handle_worker_crash(state: &mut BuildState, message: String) -> CoreStep {
    if let Some(generation) = state.in_flight.take() {
        warn!(generation, "worker crashed during build");
        state.restore_removals();
    }
    CoreStep::running(vec![CoreCommand::Report(LifecycleEvent::Error {
        message,
        stack: None,
    })])
}

pub fn handle_shutdown(state: &mut BuildState) -> CoreStep {
    state.shutting_down = true;
    if let Some(generation) = state.in_flight.take() {
        debug!(generation, "shutting down with a build in flight");
    }
    CoreStep::exit(Vec::new(), 0)
}
