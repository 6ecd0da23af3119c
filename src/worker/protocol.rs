// src/worker/protocol.rs

//! Messages exchanged between the controller and a worker thread.
//!
//! Both directions are one-way channels; the worker never touches
//! controller-owned state.

use std::time::Duration;

use crate::build::{BuildRequest, PipelineEvent};
use crate::types::BuildTarget;

/// Identity of a worker slot. Never reused within a process.
pub type SlotId = u64;

/// Controller → worker.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    Build(BuildRequest),
    /// Cancel the running build (if any) and exit the thread.
    Shutdown,
}

/// Worker → controller, always tagged with the generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerMessage {
    pub generation: u64,
    pub kind: WorkerMessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessageKind {
    Started {
        targets: Vec<BuildTarget>,
        total: u64,
    },
    Progress {
        target: BuildTarget,
        completed: u64,
        total: u64,
    },
    Completed {
        files: u64,
        elapsed: Duration,
    },
    Cancelled,
    Error {
        message: String,
        stack: Option<String>,
        /// The error leaves the tool in a guaranteed-to-fail state.
        fatal: bool,
    },
}

impl WorkerMessageKind {
    /// The build this message belongs to has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerMessageKind::Completed { .. }
                | WorkerMessageKind::Cancelled
                | WorkerMessageKind::Error { .. }
        )
    }
}

impl WorkerMessage {
    pub fn new(generation: u64, kind: WorkerMessageKind) -> Self {
        Self { generation, kind }
    }

    pub fn from_pipeline(generation: u64, event: PipelineEvent) -> Self {
        let kind = match event {
            PipelineEvent::Started { targets, total } => WorkerMessageKind::Started { targets, total },
            PipelineEvent::FileDone {
                target,
                completed,
                total,
            } => WorkerMessageKind::Progress {
                target,
                completed,
                total,
            },
        };
        Self { generation, kind }
    }
}

/// How a worker thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Left its command loop normally.
    Clean,
    /// Panicked or failed to start.
    Abnormal(String),
}

impl WorkerExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerExit::Clean)
    }
}
