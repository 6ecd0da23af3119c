// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::ConfigFile;
use crate::fs::{walk_files, FileSystem};

/// Declaration files are never transpiled, whatever `ignore` says.
const ALWAYS_IGNORED: &str = "**/*.d.ts";

/// Decides which files under the source root are build inputs.
///
/// Patterns are relative to the source root; callers pass relative paths
/// with forward slashes (e.g. `"components/button.tsx"`) into `matches`.
#[derive(Clone)]
pub struct SourceMatcher {
    extensions: Vec<String>,
    ignore_set: GlobSet,
}

impl fmt::Debug for SourceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMatcher")
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl SourceMatcher {
    pub fn new(extensions: &[String], ignore: &[String]) -> Result<Self> {
        let mut patterns = ignore.to_vec();
        patterns.push(ALWAYS_IGNORED.to_string());
        let ignore_set = build_globset(&patterns).context("building ignore globset")?;

        Ok(Self {
            extensions: extensions.to_vec(),
            ignore_set,
        })
    }

    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::new(&cfg.extensions, &cfg.ignore)
    }

    /// True if `rel_path` has a configured extension and is not ignored.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.has_source_extension(rel_path) && !self.is_ignored(rel_path)
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.ignore_set.is_match(rel_path)
    }

    pub fn has_source_extension(&self, rel_path: &str) -> bool {
        self.extensions.iter().any(|ext| rel_path.ends_with(ext.as_str()))
    }

    /// Every source file under `src_dir`, sorted.
    pub fn collect_sources(&self, fs: &dyn FileSystem, src_dir: &Path) -> Result<Vec<PathBuf>> {
        walk_files(fs, src_dir, |rel| self.matches(rel))
            .with_context(|| format!("enumerating sources under {:?}", src_dir))
    }
}

/// Compiled `assets` globs, matched against paths relative to the source root.
#[derive(Clone)]
pub struct AssetMatcher {
    set: GlobSet,
    empty: bool,
}

impl fmt::Debug for AssetMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetMatcher")
            .field("empty", &self.empty)
            .finish_non_exhaustive()
    }
}

impl AssetMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            set: build_globset(patterns).context("building assets globset")?,
            empty: patterns.is_empty(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        !self.empty && self.set.is_match(rel_path)
    }

    pub fn collect_assets(&self, fs: &dyn FileSystem, src_dir: &Path) -> Result<Vec<PathBuf>> {
        if self.empty {
            return Ok(Vec::new());
        }
        walk_files(fs, src_dir, |rel| self.matches(rel))
            .with_context(|| format!("collecting assets under {:?}", src_dir))
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
