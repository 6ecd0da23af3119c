// src/build/clean.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::fs::FileSystem;

/// Remove the output root and stale `*.tsbuildinfo` files before a full
/// build. Watch mode never calls this; it overwrites outputs in place.
pub fn clean_outputs(fs: &dyn FileSystem, cfg: &ConfigFile) -> Result<()> {
    if fs.remove_dir_all(&cfg.out_dir)? {
        info!(out_dir = ?cfg.out_dir, "removed previous build output");
    }
    remove_build_info_files(fs, &cfg.root)?;
    Ok(())
}

/// Delete every `*.tsbuildinfo` under `root`, skipping `node_modules`.
///
/// Returns the removed paths.
pub fn remove_build_info_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !fs.is_dir(root) {
        return Ok(removed);
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if fs.is_dir(&path) {
                if name != "node_modules" && name != ".git" {
                    stack.push(path);
                }
            } else if name.ends_with(".tsbuildinfo") && fs.remove_file(&path)? {
                debug!(?path, "removed build info file");
                removed.push(path);
            }
        }
    }

    Ok(removed)
}
