// src/build/mod.rs

//! One end-to-end build: enumerate sources, transform them per target,
//! optionally emit types, then package.
//!
//! The pipeline itself is runtime-agnostic: watch mode runs it inside an
//! isolated worker (see [`crate::worker`]), the one-shot `build` command
//! runs it directly.

use std::sync::Arc;
use std::time::Duration;

use crate::types::{BuildTarget, RemovedPath};

pub mod cancel;
pub mod clean;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod transform;
pub mod types;

pub use cancel::GenerationToken;
pub use package::{DefaultPackager, PackageReport, Packager};
pub use pipeline::{output_rel_path, BuildPipeline};
pub use progress::ProgressAggregator;
pub use transform::{CommandTransform, CopyTransform, Transform, TransformOptions, TransformOutput};
pub use types::{Diagnostic, Diagnostics, TscTypeEmitter, TypeEmitter, TypesMode};

/// A request to build, tagged with its generation.
///
/// Exactly one request is current at a time; work tagged with an older
/// generation is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub generation: u64,
    /// Targets to build. Empty means every configured target.
    pub targets: Vec<BuildTarget>,
    /// Sources deleted since the last completed build.
    pub removed: Vec<RemovedPath>,
    /// Run the type emission step before packaging.
    pub with_types: bool,
}

impl BuildRequest {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            targets: Vec::new(),
            removed: Vec::new(),
            with_types: false,
        }
    }
}

/// Progress notifications emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Sources were enumerated; each target will process `total` files.
    Started {
        targets: Vec<BuildTarget>,
        total: u64,
    },
    /// `target` has finished `completed` of `total` files.
    FileDone {
        target: BuildTarget,
        completed: u64,
        total: u64,
    },
}

/// Receives [`PipelineEvent`]s. Called from concurrently running target
/// tasks, so it must be cheap and non-blocking.
pub type EventSink = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// How a pipeline run ended, other than with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { files: u64, elapsed: Duration },
    Cancelled,
}
