// src/types.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

/// Output module format produced by a build.
///
/// The set is closed: every configured target maps to exactly one output
/// directory and one set of [`ModuleOptions`](crate::config::ModuleOptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    /// ECMAScript modules.
    Esm,
    /// CommonJS modules.
    Cjs,
}

impl BuildTarget {
    pub const ALL: [BuildTarget; 2] = [BuildTarget::Esm, BuildTarget::Cjs];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTarget::Esm => "esm",
            BuildTarget::Cjs => "cjs",
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "esm" | "modern" => Ok(BuildTarget::Esm),
            "cjs" | "common" | "commonjs" => Ok(BuildTarget::Cjs),
            other => Err(format!(
                "invalid target: {other} (expected \"esm\" or \"cjs\")"
            )),
        }
    }
}

/// Kind of a filesystem change as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Added,
    Modified,
    Removed,
    DirAdded,
    DirRemoved,
}

/// A single filesystem change under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(WatchEventKind::Added, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(WatchEventKind::Modified, path)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(WatchEventKind::Removed, path)
    }

    pub fn dir_added(path: impl Into<PathBuf>) -> Self {
        Self::new(WatchEventKind::DirAdded, path)
    }

    pub fn dir_removed(path: impl Into<PathBuf>) -> Self {
        Self::new(WatchEventKind::DirRemoved, path)
    }

    /// Convert a removal event into the form carried by a build request.
    pub fn as_removed_path(&self) -> Option<RemovedPath> {
        match self.kind {
            WatchEventKind::Removed => Some(RemovedPath::file(&self.path)),
            WatchEventKind::DirRemoved => Some(RemovedPath::dir(&self.path)),
            _ => None,
        }
    }
}

/// A source path deleted since the last completed build.
///
/// The pipeline uses these to delete stale outputs, since whole-tree
/// enumeration can no longer see deleted sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemovedPath {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl RemovedPath {
    pub fn file(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            is_dir: false,
        }
    }

    pub fn dir(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            is_dir: true,
        }
    }
}
