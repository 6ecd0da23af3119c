// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`CoreEvent`]s and produces:
//! - an updated core state (generation counter, in-flight build, pending
//!   removals, aggregate progress)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - filtering filesystem events through the change hash cache
//! - running the debounce timer
//! - driving the worker backend and the reporter
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or threads.

use crate::build::ProgressAggregator;
use crate::engine::event_handlers::{
    handle_change_accepted, handle_shutdown, handle_trigger, handle_worker_crash,
    handle_worker_message, BuildState, CoreStep,
};
use crate::types::{BuildTarget, RemovedPath, WatchEvent};
use crate::worker::WorkerMessage;

/// Input to the core, already filtered by the shell.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A filesystem change that passed the content hash filter.
    ChangeAccepted(WatchEvent),
    /// The debounce timer fired.
    Trigger(WatchEvent),
    /// A message from the attached active worker.
    Worker(WorkerMessage),
    /// The active worker exited while it was not being terminated.
    WorkerCrashed { message: String },
    ShutdownRequested,
}

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    state: BuildState,
    progress: ProgressAggregator,
}

impl CoreRuntime {
    /// `targets` is copied into every build request; empty means every
    /// configured target.
    pub fn new(targets: Vec<BuildTarget>) -> Self {
        Self {
            state: BuildState::new(targets),
            progress: ProgressAggregator::new(),
        }
    }

    /// Latest generation handed out (0 before the first build).
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// Generation currently being built, if any.
    pub fn in_flight(&self) -> Option<u64> {
        self.state.in_flight
    }

    /// Removals not yet confirmed by a completed build, in dispatch order.
    pub fn pending_removed(&self) -> Vec<RemovedPath> {
        self.state
            .in_flight_removed
            .iter()
            .chain(self.state.pending_removed.iter())
            .cloned()
            .collect()
    }

    pub fn progress(&self) -> &ProgressAggregator {
        &self.progress
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::ChangeAccepted(change) => handle_change_accepted(&mut self.state, change),
            CoreEvent::Trigger(change) => handle_trigger(&mut self.state, change),
            CoreEvent::Worker(msg) => {
                handle_worker_message(&mut self.state, &mut self.progress, msg)
            }
            CoreEvent::WorkerCrashed { message } => {
                handle_worker_crash(&mut self.state, message)
            }
            CoreEvent::ShutdownRequested => handle_shutdown(&mut self.state),
        }
    }
}
