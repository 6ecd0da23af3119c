// src/watch/watcher.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::WatchEvent;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::SourceMatcher;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher on `src_dir` (recursive) that sends a
/// `RuntimeEvent::FsChanged` for every add/change/unlink of a file or
/// directory not excluded by `matcher`'s ignore list.
///
/// Content filtering and debouncing happen downstream in the runtime.
pub fn spawn_watcher(
    src_dir: impl Into<PathBuf>,
    matcher: SourceMatcher,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let src_dir = src_dir.into();
    // Canonicalize once so we have a stable base path.
    let root = src_dir.canonicalize().unwrap_or_else(|_| src_dir.clone());

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // We can't log via tracing here easily, so fallback to stderr.
                    eprintln!("libpack: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("libpack: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!("file watcher started on {:?}", root);

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            trace!(?event, "received notify event");

            for change in translate_event(&event, &root, &matcher, fs.as_ref()) {
                debug!(kind = ?change.kind, path = ?change.path, "filesystem change");
                if runtime_tx.send(RuntimeEvent::FsChanged(change)).await.is_err() {
                    debug!("runtime channel closed; stopping watcher loop");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// Map one raw notify event onto zero or more [`WatchEvent`]s.
///
/// Paths outside `root`, the root itself and ignored paths are dropped.
/// When the backend doesn't say whether a path is a file or a directory,
/// the current filesystem state decides; for paths that no longer exist a
/// name with a source extension is taken to be a file.
pub fn translate_event(
    event: &Event,
    root: &Path,
    matcher: &SourceMatcher,
    fs: &dyn FileSystem,
) -> Vec<WatchEvent> {
    let mut out = Vec::new();

    let kinds: Vec<(&PathBuf, Change)> = match event.kind {
        EventKind::Create(CreateKind::Folder) => tag(&event.paths, Change::DirAdded),
        EventKind::Create(CreateKind::File) => tag(&event.paths, Change::Added),
        EventKind::Create(_) => tag(&event.paths, Change::Appeared),
        EventKind::Remove(RemoveKind::Folder) => tag(&event.paths, Change::DirRemoved),
        EventKind::Remove(RemoveKind::File) => tag(&event.paths, Change::Removed),
        EventKind::Remove(_) => tag(&event.paths, Change::Vanished),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            tag(&event.paths, Change::Vanished)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            tag(&event.paths, Change::Appeared)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut v = Vec::new();
            if let Some(from) = event.paths.first() {
                v.push((from, Change::Vanished));
            }
            if let Some(to) = event.paths.get(1) {
                v.push((to, Change::Appeared));
            }
            v
        }
        EventKind::Modify(ModifyKind::Name(_)) => tag(&event.paths, Change::Unknown),
        EventKind::Modify(_) => tag(&event.paths, Change::Modified),
        EventKind::Any | EventKind::Other => tag(&event.paths, Change::Unknown),
        EventKind::Access(_) => Vec::new(),
    };

    for (path, change) in kinds {
        let Some(rel) = relative_str(root, path) else {
            continue;
        };
        if rel.is_empty() || matcher.is_ignored(&rel) {
            continue;
        }

        let watch_event = match change {
            Change::Added => WatchEvent::added(path.clone()),
            Change::DirAdded => WatchEvent::dir_added(path.clone()),
            Change::Removed => WatchEvent::removed(path.clone()),
            Change::DirRemoved => WatchEvent::dir_removed(path.clone()),
            Change::Modified => {
                if fs.is_dir(path) {
                    continue;
                }
                WatchEvent::modified(path.clone())
            }
            Change::Appeared => {
                if fs.is_dir(path) {
                    WatchEvent::dir_added(path.clone())
                } else {
                    WatchEvent::added(path.clone())
                }
            }
            Change::Vanished => vanished(path, &rel, matcher),
            Change::Unknown => {
                if fs.is_dir(path) {
                    WatchEvent::dir_added(path.clone())
                } else if fs.is_file(path) {
                    WatchEvent::modified(path.clone())
                } else {
                    vanished(path, &rel, matcher)
                }
            }
        };
        out.push(watch_event);
    }

    out
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Added,
    DirAdded,
    Modified,
    Removed,
    DirRemoved,
    /// Created, kind unknown.
    Appeared,
    /// Removed, kind unknown.
    Vanished,
    Unknown,
}

fn tag(paths: &[PathBuf], change: Change) -> Vec<(&PathBuf, Change)> {
    paths.iter().map(|p| (p, change)).collect()
}

fn vanished(path: &Path, rel: &str, matcher: &SourceMatcher) -> WatchEvent {
    if matcher.has_source_extension(rel) {
        WatchEvent::removed(path)
    } else {
        WatchEvent::dir_removed(path)
    }
}
