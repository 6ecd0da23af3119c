// src/worker/backend.rs

//! Pluggable build backend abstraction.
//!
//! The runtime talks to a `BuildBackend` instead of the worker pool
//! directly. Production code uses [`WorkerPool`]; tests can provide a fake
//! that records requests and emits `RuntimeEvent`s itself.

use std::future::Future;
use std::pin::Pin;

use crate::build::BuildRequest;
use crate::errors::Result;
use crate::worker::pool::WorkerPool;
use crate::worker::protocol::{SlotId, WorkerExit, WorkerMessage};

/// Trait abstracting where builds are executed.
pub trait BuildBackend: Send {
    /// A build is in progress on the active execution context.
    fn is_running(&self) -> bool;

    /// The active execution context exists and is idle.
    fn is_ready(&self) -> bool;

    /// Start `request`. Only valid when [`is_ready`](Self::is_ready).
    fn run(&mut self, request: BuildRequest) -> Result<()>;

    /// Stop whatever the active context is doing and make the backend
    /// ready again.
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Whether a message from `slot` belongs to the current context.
    fn observe(&mut self, slot: SlotId, msg: &WorkerMessage) -> bool;

    /// A context ended. `Some(message)` when that was unexpected.
    fn handle_exit(&mut self, slot: SlotId, exit: &WorkerExit) -> Result<Option<String>>;

    /// Release all execution contexts.
    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl BuildBackend for WorkerPool {
    fn is_running(&self) -> bool {
        WorkerPool::is_running(self)
    }

    fn is_ready(&self) -> bool {
        WorkerPool::is_ready(self)
    }

    fn run(&mut self, request: BuildRequest) -> Result<()> {
        WorkerPool::run(self, request)
    }

    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(WorkerPool::terminate(self))
    }

    fn observe(&mut self, slot: SlotId, msg: &WorkerMessage) -> bool {
        WorkerPool::observe(self, slot, msg)
    }

    fn handle_exit(&mut self, slot: SlotId, exit: &WorkerExit) -> Result<Option<String>> {
        WorkerPool::handle_exit(self, slot, exit)
    }

    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(WorkerPool::shutdown(self))
    }
}
