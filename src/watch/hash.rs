// src/watch/hash.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake3::Hasher;
use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::types::{WatchEvent, WatchEventKind};

/// Compute the content fingerprint of a byte slice.
pub fn compute_hash(bytes: &[u8]) -> blake3::Hash {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Content fingerprints of every watched file the orchestrator has seen.
///
/// Used to suppress rebuilds for filesystem events that don't change file
/// contents (editor atomic saves, `touch`, metadata-only updates).
///
/// Invariant: an entry exists only for a path whose last observed content
/// was successfully read. Removal events drop the entry, so the cache never
/// holds a hash for a deleted file.
#[derive(Debug)]
pub struct ChangeHashCache {
    fs: Arc<dyn FileSystem>,
    hashes: HashMap<PathBuf, blake3::Hash>,
}

impl ChangeHashCache {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            hashes: HashMap::new(),
        }
    }

    /// Decide whether `event` represents a real change.
    ///
    /// - `Added` / `Modified`: hash the file; `false` only when the hash
    ///   equals the cached one. A file that can't be read counts as changed.
    /// - `Removed`: drop the entry, always `true`.
    /// - `DirAdded`: always `true`.
    /// - `DirRemoved`: drop every entry nested under the directory, `true`.
    pub fn should_rebuild(&mut self, event: &WatchEvent) -> bool {
        match event.kind {
            WatchEventKind::Added | WatchEventKind::Modified => self.check_file(&event.path),
            WatchEventKind::Removed => {
                if self.hashes.remove(&event.path).is_none() {
                    // Some backends report a directory removal as a plain
                    // removal; the path no longer exists to tell them apart.
                    self.purge_under(&event.path);
                }
                true
            }
            WatchEventKind::DirAdded => true,
            WatchEventKind::DirRemoved => {
                self.purge_under(&event.path);
                true
            }
        }
    }

    /// Record the current content of `paths` without reporting anything.
    ///
    /// Native watchers don't report files that already exist when watching
    /// starts, so the initial tree is fed in here. Unreadable files are
    /// skipped. Returns the number of fingerprints stored.
    pub fn prime<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut stored = 0;
        for path in paths {
            if let Ok(bytes) = self.fs.read(&path) {
                self.hashes.insert(path, compute_hash(&bytes));
                stored += 1;
            }
        }
        debug!(stored, "primed change hash cache");
        stored
    }

    /// Last known fingerprint for `path`.
    pub fn get(&self, path: &Path) -> Option<&blake3::Hash> {
        self.hashes.get(path)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn check_file(&mut self, path: &Path) -> bool {
        let bytes = match self.fs.read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Vanished between the event and the read. The build step
                // removes stale output for missing sources.
                trace!(?path, %err, "could not read changed file; treating as changed");
                return true;
            }
        };

        let hash = compute_hash(&bytes);
        if self.hashes.get(path) == Some(&hash) {
            debug!(?path, "content unchanged; suppressing rebuild");
            return false;
        }

        self.hashes.insert(path.to_path_buf(), hash);
        true
    }

    fn purge_under(&mut self, dir: &Path) {
        let before = self.hashes.len();
        self.hashes.retain(|p, _| !p.starts_with(dir));
        let removed = before - self.hashes.len();
        if removed > 0 {
            debug!(?dir, removed, "dropped fingerprints under removed path");
        }
    }
}
