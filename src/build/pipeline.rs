// src/build/pipeline.rs

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::build::cancel::GenerationToken;
use crate::build::package::{DefaultPackager, Packager};
use crate::build::transform::{transform_from_config, Transform, TransformOptions, TransformOutput};
use crate::build::types::{TscTypeEmitter, TypeEmitter, TypesMode};
use crate::build::{BuildRequest, EventSink, PipelineEvent, PipelineOutcome};
use crate::config::{ConfigFile, ModuleOptions};
use crate::errors::{LibpackError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{BuildTarget, RemovedPath};
use crate::watch::SourceMatcher;

/// Map a source path (relative to the source root) to its output path.
///
/// `.ts`, `.tsx`, `.js`, `.jsx` become `.js`; `.mts` becomes `.mjs` and
/// `.cts` becomes `.cjs`. Anything else keeps its extension.
pub fn output_rel_path(rel: &Path) -> PathBuf {
    let ext = rel.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let new_ext = match ext {
        "ts" | "tsx" | "js" | "jsx" => "js",
        "mts" | "mjs" => "mjs",
        "cts" | "cjs" => "cjs",
        _ => return rel.to_path_buf(),
    };
    rel.with_extension(new_ext)
}

fn map_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

/// One file every target has to process.
#[derive(Debug, Clone)]
struct WorkItem {
    source: PathBuf,
    rel: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetOutcome {
    Done,
    Cancelled,
}

/// Runs one build generation.
///
/// Collaborators are injected so tests can substitute in-memory
/// filesystems and fake transforms.
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    config: Arc<ConfigFile>,
    fs: Arc<dyn FileSystem>,
    transform: Arc<dyn Transform>,
    packager: Option<Arc<dyn Packager>>,
    type_emitter: Option<Arc<dyn TypeEmitter>>,
}

impl BuildPipeline {
    /// A pipeline with no packaging or type emission step.
    pub fn new(
        config: Arc<ConfigFile>,
        fs: Arc<dyn FileSystem>,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            config,
            fs,
            transform,
            packager: None,
            type_emitter: None,
        }
    }

    /// Production wiring: real filesystem, configured transform, default
    /// packager and `tsc` type emitter.
    pub fn from_config(config: Arc<ConfigFile>) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let transform = transform_from_config(&config, Arc::clone(&fs));
        Self::new(config, Arc::clone(&fs), transform)
            .with_packager(Arc::new(DefaultPackager::new(Arc::clone(&fs))))
            .with_type_emitter(Arc::new(TscTypeEmitter::new(fs)))
    }

    pub fn with_packager(mut self, packager: Arc<dyn Packager>) -> Self {
        self.packager = Some(packager);
        self
    }

    pub fn with_type_emitter(mut self, emitter: Arc<dyn TypeEmitter>) -> Self {
        self.type_emitter = Some(emitter);
        self
    }

    pub fn config(&self) -> &Arc<ConfigFile> {
        &self.config
    }

    /// Targets a request resolves to.
    pub fn effective_targets(&self, request: &BuildRequest) -> Vec<BuildTarget> {
        if request.targets.is_empty() {
            self.config.targets.clone()
        } else {
            request.targets.clone()
        }
    }

    /// Execute `request` until it completes, is cancelled via `token`, or
    /// fails.
    pub async fn run(
        &self,
        request: &BuildRequest,
        token: &GenerationToken,
        events: EventSink,
    ) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let targets = self.effective_targets(request);
        debug!(generation = request.generation, ?targets, "pipeline init");

        if token.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        // Enumerating
        let work = {
            let this = self.clone();
            let removed = request.removed.clone();
            let targets = targets.clone();
            tokio::task::spawn_blocking(move || this.enumerate(&removed, &targets))
                .await
                .map_err(|e| {
                    LibpackError::WorkerError(format!("enumeration failed: {}", join_error_message(e)))
                })??
        };
        let total = work.len() as u64;
        events(PipelineEvent::Started {
            targets: targets.clone(),
            total,
        });
        info!(generation = request.generation, files = total, ?targets, "transpiling");

        // Transpiling
        let work = Arc::new(work);
        let mut jobs = JoinSet::new();
        for target in &targets {
            let job = TargetJob {
                target: *target,
                out_dir: self.config.output_dir(*target).to_path_buf(),
                options: self.config.module_options(*target),
                work: Arc::clone(&work),
                fs: Arc::clone(&self.fs),
                transform: Arc::clone(&self.transform),
                token: token.clone(),
                events: Arc::clone(&events),
                progress: self.config.watch.progress,
                batch_size: self.config.watch.batch_size,
            };
            jobs.spawn(job.run());
        }

        let mut cancelled = false;
        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok(Ok(TargetOutcome::Done)) => {}
                Ok(Ok(TargetOutcome::Cancelled)) => cancelled = true,
                Ok(Err(err)) => {
                    jobs.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    jobs.abort_all();
                    return Err(LibpackError::WorkerError(format!(
                        "target task failed: {}",
                        join_error_message(join_err)
                    )));
                }
            }
        }
        if cancelled || token.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        // TypeEmit
        if request.with_types {
            if let Some(ref emitter) = self.type_emitter {
                tokio::select! {
                    res = emitter.emit(&self.config, TypesMode::Emit) => res?,
                    _ = token.cancelled() => return Ok(PipelineOutcome::Cancelled),
                }
            }
        }
        if token.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        // Packaging
        if let Some(ref packager) = self.packager {
            let packager = Arc::clone(packager);
            let config = Arc::clone(&self.config);
            let pkg_targets = targets.clone();
            tokio::task::spawn_blocking(move || packager.package(&config, &pkg_targets))
                .await
                .map_err(|e| LibpackError::PackagingError(join_error_message(e)))?
                .map_err(|e| LibpackError::PackagingError(format!("{e:#}")))?;
        }

        let elapsed = started.elapsed();
        info!(generation = request.generation, ?elapsed, "build completed");
        Ok(PipelineOutcome::Completed {
            files: total,
            elapsed,
        })
    }

    /// Walk the source tree and plan the work. Blocking.
    fn enumerate(&self, removed: &[RemovedPath], targets: &[BuildTarget]) -> Result<Vec<WorkItem>> {
        let matcher = SourceMatcher::from_config(&self.config)?;
        let sources = matcher.collect_sources(self.fs.as_ref(), &self.config.src_dir)?;
        if sources.is_empty() {
            return Err(LibpackError::NoSourceFiles {
                src_dir: self.config.src_dir.clone(),
                extensions: self.config.extensions.clone(),
            });
        }
        self.plan_work(&matcher, sources, removed, targets)
    }

    /// Delete outputs of removed directories and list every file each target
    /// must process: current sources plus removed source files whose stale
    /// outputs must go.
    fn plan_work(
        &self,
        matcher: &SourceMatcher,
        sources: Vec<PathBuf>,
        removed: &[RemovedPath],
        targets: &[BuildTarget],
    ) -> Result<Vec<WorkItem>> {
        let src_dir = &self.config.src_dir;
        let present: HashSet<&PathBuf> = sources.iter().collect();
        let mut extra = Vec::new();

        for entry in removed {
            let Ok(rel) = entry.path.strip_prefix(src_dir) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }

            if entry.is_dir {
                self.remove_output_dirs(rel, targets)?;
                continue;
            }

            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if matcher.matches(&rel_str) && !present.contains(&entry.path) {
                extra.push(WorkItem {
                    source: entry.path.clone(),
                    rel: rel.to_path_buf(),
                });
            }
        }

        let mut work: Vec<WorkItem> = sources
            .iter()
            .map(|source| WorkItem {
                source: source.clone(),
                rel: source.strip_prefix(src_dir).unwrap_or(source).to_path_buf(),
            })
            .collect();
        work.extend(extra);
        Ok(work)
    }

    fn remove_output_dirs(&self, rel: &Path, targets: &[BuildTarget]) -> Result<()> {
        for target in targets {
            let dir = self.config.output_dir(*target).join(rel);
            // Never delete a directory that holds a target's whole output.
            let shadows_target = BuildTarget::ALL
                .iter()
                .any(|t| self.config.output_dir(*t).starts_with(&dir));
            if shadows_target || !self.fs.is_dir(&dir) {
                continue;
            }
            self.fs.remove_dir_all(&dir)?;
            debug!(target = %target, ?dir, "removed output directory of deleted source dir");
        }
        Ok(())
    }
}

/// Per-target transpile loop.
struct TargetJob {
    target: BuildTarget,
    out_dir: PathBuf,
    options: ModuleOptions,
    work: Arc<Vec<WorkItem>>,
    fs: Arc<dyn FileSystem>,
    transform: Arc<dyn Transform>,
    token: GenerationToken,
    events: EventSink,
    progress: bool,
    batch_size: usize,
}

impl TargetJob {
    async fn run(self) -> Result<TargetOutcome> {
        if self.token.is_cancelled() {
            return Ok(TargetOutcome::Cancelled);
        }

        let total = self.work.len() as u64;
        let mut completed = 0u64;

        if self.progress {
            for item in self.work.iter() {
                if self.token.is_cancelled() {
                    return Ok(TargetOutcome::Cancelled);
                }
                let result = self.transform_item(item).await?;
                if self.token.is_cancelled() {
                    debug!(target = %self.target, source = ?item.source, "discarding result of cancelled build");
                    return Ok(TargetOutcome::Cancelled);
                }
                self.commit(item, result).await?;
                completed += 1;
                self.report(completed, total);
            }
        } else {
            for batch in self.work.chunks(self.batch_size.max(1)) {
                if self.token.is_cancelled() {
                    return Ok(TargetOutcome::Cancelled);
                }

                let mut set = JoinSet::new();
                let mut sources = HashMap::with_capacity(batch.len());
                for (idx, item) in batch.iter().enumerate() {
                    let owned = item.clone();
                    let fs = Arc::clone(&self.fs);
                    let transform = Arc::clone(&self.transform);
                    let options = self.transform_options();
                    let handle = set.spawn(async move {
                        (idx, transform_source(fs.as_ref(), transform.as_ref(), &owned, options).await)
                    });
                    sources.insert(handle.id(), &item.source);
                }

                let mut results: Vec<Option<Option<TransformOutput>>> = vec![None; batch.len()];
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok((idx, res)) => results[idx] = Some(res?),
                        Err(join_err) => {
                            let path = sources
                                .get(&join_err.id())
                                .map(|p| p.to_path_buf())
                                .unwrap_or_else(|| self.out_dir.clone());
                            return Err(LibpackError::TransformError {
                                path,
                                message: join_error_message(join_err),
                            });
                        }
                    }
                }

                if self.token.is_cancelled() {
                    debug!(target = %self.target, "discarding batch of cancelled build");
                    return Ok(TargetOutcome::Cancelled);
                }

                for (item, result) in batch.iter().zip(results) {
                    self.commit(item, result.flatten()).await?;
                }
                completed += batch.len() as u64;
                self.report(completed, total);
            }
        }

        Ok(TargetOutcome::Done)
    }

    fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            target: self.target,
            source_maps: self.options.source_map,
            comments: self.options.comments,
        }
    }

    /// Transform one file on its own task so a panicking transform turns
    /// into an error instead of tearing down the target loop.
    async fn transform_item(&self, item: &WorkItem) -> Result<Option<TransformOutput>> {
        let owned = item.clone();
        let fs = Arc::clone(&self.fs);
        let transform = Arc::clone(&self.transform);
        let options = self.transform_options();
        tokio::spawn(async move {
            transform_source(fs.as_ref(), transform.as_ref(), &owned, options).await
        })
        .await
        .map_err(|join_err| LibpackError::TransformError {
            path: item.source.clone(),
            message: join_error_message(join_err),
        })?
    }

    /// Write the transform result, or remove stale outputs when the source
    /// is gone (`None`). Runs on the blocking pool.
    async fn commit(&self, item: &WorkItem, result: Option<TransformOutput>) -> Result<()> {
        let fs = Arc::clone(&self.fs);
        let target = self.target;
        let output = self.out_dir.join(output_rel_path(&item.rel));
        tokio::task::spawn_blocking(move || commit_output(fs.as_ref(), target, &output, result))
            .await
            .map_err(|join_err| LibpackError::TransformError {
                path: item.source.clone(),
                message: join_error_message(join_err),
            })?
    }

    fn report(&self, completed: u64, total: u64) {
        (self.events)(PipelineEvent::FileDone {
            target: self.target,
            completed,
            total,
        });
    }
}

fn commit_output(
    fs: &dyn FileSystem,
    target: BuildTarget,
    output: &Path,
    result: Option<TransformOutput>,
) -> Result<()> {
    let map_file = map_path(output);

    let Some(TransformOutput { mut code, map }) = result else {
        let removed = fs.remove_file(output)?;
        fs.remove_file(&map_file)?;
        if removed {
            debug!(target = %target, ?output, "removed output of deleted source");
        }
        return Ok(());
    };

    match map {
        Some(map) => {
            fs.write(&map_file, map.as_bytes())?;
            let name = map_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !code.is_empty() && !code.ends_with('\n') {
                code.push('\n');
            }
            code.push_str(&format!("//# sourceMappingURL={name}\n"));
        }
        None => {
            fs.remove_file(&map_file)?;
        }
    }

    fs.write(output, code.as_bytes())?;
    Ok(())
}

/// `Ok(None)` when the source vanished and its outputs should be removed.
async fn transform_source(
    fs: &dyn FileSystem,
    transform: &dyn Transform,
    item: &WorkItem,
    options: TransformOptions,
) -> Result<Option<TransformOutput>> {
    if !fs.is_file(&item.source) {
        return Ok(None);
    }
    match transform.transform(&item.source, options).await {
        Ok(output) => Ok(Some(output)),
        Err(err) => {
            if !fs.is_file(&item.source) {
                // Deleted while being transformed.
                warn!(source = ?item.source, "source vanished during transform");
                return Ok(None);
            }
            Err(LibpackError::TransformError {
                path: item.source.clone(),
                message: format!("{err:#}"),
            })
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
