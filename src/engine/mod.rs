// src/engine/mod.rs

//! Watch-mode orchestration engine for libpack.
//!
//! This module ties together:
//! - the change hash filter and the debounced trigger
//! - generation bookkeeping (which build is current, what was deleted)
//! - the main runtime event loop that reacts to:
//!   - filesystem changes
//!   - debounced rebuild triggers
//!   - worker lifecycle messages and exits
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use crate::types::{BuildTarget, WatchEvent};
use crate::worker::{SlotId, WorkerExit, WorkerMessage};

/// Events flowing into the runtime from the watcher, the debouncer and the
/// worker slots.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Raw change reported by the filesystem watcher.
    FsChanged(WatchEvent),
    /// The debounce quiet period elapsed; `WatchEvent` is the latest change.
    Trigger(WatchEvent),
    /// A message from worker slot `slot`.
    Worker { slot: SlotId, msg: WorkerMessage },
    /// The thread of worker slot `slot` ended.
    WorkerExited { slot: SlotId, exit: WorkerExit },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Build lifecycle as exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started {
        generation: u64,
    },
    /// Aggregate progress; never decreases within one generation.
    /// `target` is the slowest target, whose count the aggregate follows.
    Progress {
        target: Option<BuildTarget>,
        completed: u64,
        total: u64,
    },
    Completed {
        generation: u64,
        elapsed: Duration,
    },
    /// Superseded by a newer generation. Not an error.
    Cancelled {
        generation: u64,
    },
    Error {
        message: String,
        stack: Option<String>,
    },
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::{CoreEvent, CoreRuntime};
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
