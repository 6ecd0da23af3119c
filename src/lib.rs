// src/lib.rs

pub mod build;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod init;
pub mod logging;
pub mod types;
pub mod ui;
pub mod watch;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::build::{
    clean::clean_outputs, BuildPipeline, BuildRequest, EventSink, GenerationToken,
    PipelineEvent, PipelineOutcome, ProgressAggregator, TscTypeEmitter, TypeEmitter, TypesMode,
};
use crate::cli::{BuildArgs, CliArgs, Command};
use crate::config::{load_for_root, ConfigFile, ConfigOverrides};
use crate::engine::{CoreRuntime, LifecycleEvent, Runtime, RuntimeEvent};
use crate::errors::{LibpackError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::WatchEvent;
use crate::ui::{Reporter, TerminalReporter};
use crate::watch::{ChangeHashCache, SourceMatcher};
use crate::worker::WorkerPool;

/// Exit status of a build interrupted with Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Init => {
            let root = resolve_root(args.root.as_deref())?;
            let path = init::write_sample_config(&root)?;
            println!("libpack: wrote {}", path.display());
            Ok(0)
        }
        Command::Types { check } => {
            let cfg = load_for_root(
                args.root.as_deref(),
                args.config.as_deref(),
                &ConfigOverrides::default(),
            )?;
            let mode = if check {
                TypesMode::Check
            } else {
                TypesMode::Emit
            };
            let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
            TscTypeEmitter::new(fs).emit(&cfg, mode).await?;
            if !args.quiet {
                println!("libpack: types {}", if check { "checked" } else { "emitted" });
            }
            Ok(0)
        }
        Command::Build(ref build) => {
            let cfg = load_config(&args, build)?;
            if build.dry_run {
                print_dry_run(&cfg)?;
                return Ok(0);
            }
            run_build(cfg, build.types, args.quiet).await
        }
        Command::Watch(ref build) => {
            let cfg = load_config(&args, build)?;
            if build.dry_run {
                print_dry_run(&cfg)?;
                return Ok(0);
            }
            if build.types {
                warn!("--types is ignored in watch mode; run `libpack types` separately");
            }
            run_watch(cfg, args.quiet).await
        }
    }
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    match root {
        Some(r) => Ok(r.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

fn load_config(args: &CliArgs, build: &BuildArgs) -> Result<ConfigFile> {
    let overrides = ConfigOverrides {
        targets: build.targets.clone(),
        src_dir: build.src_dir.clone(),
        out_dir: build.out_dir.clone(),
        source_maps: build.source_maps,
        progress: build.progress_override(),
    };
    load_for_root(args.root.as_deref(), args.config.as_deref(), &overrides)
}

/// One-shot build: clean, then run the pipeline on the current runtime.
///
/// Ctrl-C cancels the build token; the pipeline stops at its next
/// checkpoint.
async fn run_build(cfg: ConfigFile, with_types: bool, quiet: bool) -> Result<i32> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    clean_outputs(fs.as_ref(), &cfg)?;

    let pipeline = BuildPipeline::from_config(Arc::new(cfg));
    let mut request = BuildRequest::new(1);
    request.with_types = with_types;

    let token = GenerationToken::new(request.generation);
    {
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                return;
            }
            token.cancel();
        });
    }

    let mut reporter = TerminalReporter::new(quiet);
    let outcome = run_reported(&pipeline, request, &token, &mut reporter).await;
    match outcome {
        Ok(PipelineOutcome::Completed { .. }) => Ok(0),
        Ok(PipelineOutcome::Cancelled) => {
            reporter.report(&LifecycleEvent::Cancelled {
                generation: token.generation(),
            });
            Ok(INTERRUPTED_EXIT_CODE)
        }
        Err(err) => {
            drop(reporter);
            Err(err)
        }
    }
}

/// Run `pipeline` and render its progress through `reporter` while it runs.
pub async fn run_reported(
    pipeline: &BuildPipeline,
    request: BuildRequest,
    token: &GenerationToken,
    reporter: &mut dyn Reporter,
) -> Result<PipelineOutcome> {
    let generation = request.generation;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink: EventSink = Arc::new(move |event| {
        let _ = tx.send(event);
    });

    let task = {
        let pipeline = pipeline.clone();
        let token = token.clone();
        tokio::spawn(async move { pipeline.run(&request, &token, sink).await })
    };

    // The channel closes once the pipeline (and every target task holding
    // a sink clone) is gone.
    let mut progress = ProgressAggregator::new();
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Started { targets, total } => {
                progress.reset(&targets, total);
                reporter.report(&LifecycleEvent::Started { generation });
            }
            PipelineEvent::FileDone {
                target, completed, ..
            } => {
                if let Some(value) = progress.report(target, completed) {
                    reporter.report(&LifecycleEvent::Progress {
                        target: progress.slowest(),
                        completed: value,
                        total: progress.total(),
                    });
                }
            }
        }
    }

    let outcome = task
        .await
        .map_err(|e| LibpackError::WorkerError(format!("build task failed: {e}")))??;
    if let PipelineOutcome::Completed { elapsed, .. } = outcome {
        let total = progress.complete();
        reporter.report(&LifecycleEvent::Progress {
            target: progress.slowest(),
            completed: total,
            total,
        });
        reporter.report(&LifecycleEvent::Completed {
            generation,
            elapsed,
        });
    }
    Ok(outcome)
}

/// Watch mode: initial build, then rebuild on every real source change.
async fn run_watch(cfg: ConfigFile, quiet: bool) -> Result<i32> {
    let cfg = Arc::new(cfg);
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(256);

    let pipeline = BuildPipeline::from_config(Arc::clone(&cfg));
    let pool = WorkerPool::new(pipeline, rt_tx.clone())?;

    // Native watchers don't report files that already exist.
    let matcher = SourceMatcher::from_config(&cfg)?;
    let mut hashes = ChangeHashCache::new(Arc::clone(&fs));
    hashes.prime(matcher.collect_sources(fs.as_ref(), &cfg.src_dir)?);

    let _watcher = crate::watch::spawn_watcher(&cfg.src_dir, matcher, rt_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // Initial build, bypassing the debounce.
    info!(src_dir = ?cfg.src_dir, "starting initial build");
    rt_tx
        .send(RuntimeEvent::Trigger(WatchEvent::dir_added(&cfg.src_dir)))
        .await
        .map_err(|_| LibpackError::WorkerError("runtime channel closed".to_string()))?;

    let core = CoreRuntime::new(cfg.targets.clone());
    let runtime = Runtime::new(
        core,
        rt_rx,
        rt_tx,
        pool,
        hashes,
        cfg.watch.debounce,
        Box::new(TerminalReporter::new(quiet)),
    );
    runtime.run().await
}

/// Print the resolved configuration and source list without building.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let fs = RealFileSystem;
    let matcher = SourceMatcher::from_config(cfg)?;
    let sources = matcher.collect_sources(&fs, &cfg.src_dir)?;

    println!("libpack dry-run");
    println!("  root     = {}", cfg.root.display());
    println!("  src_dir  = {}", cfg.src_dir.display());
    println!("  out_dir  = {}", cfg.out_dir.display());
    println!("  extensions = {:?}", cfg.extensions);
    if let Some(ref tsconfig) = cfg.tsconfig {
        println!("  tsconfig = {}", tsconfig.display());
    }
    match cfg.transform_command {
        Some(ref cmd) => println!("  transform = {cmd}"),
        None => println!("  transform = (copy)"),
    }
    println!();

    println!("targets ({}):", cfg.targets.len());
    for target in &cfg.targets {
        let options = cfg.module_options(*target);
        println!("  - {target} -> {}", cfg.output_dir(*target).display());
        println!(
            "      comments: {}, source_map: {}",
            options.comments, options.source_map
        );
    }
    if !cfg.assets.is_empty() {
        println!("assets: {:?}", cfg.assets);
    }
    println!();

    println!("sources ({}):", sources.len());
    for source in &sources {
        let rel = source.strip_prefix(&cfg.src_dir).unwrap_or(source);
        println!("  {}", rel.display());
    }

    debug!("dry-run complete (no build)");
    Ok(())
}
