#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use libpack::config::{ConfigFile, RawConfigFile};
use libpack::errors::Result;
use libpack::types::BuildTarget;
use tempfile::TempDir;

/// A package root in a temporary directory, removed on drop.
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Canonical root path (matches what the config loader resolves).
    pub fn root(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .expect("failed to canonicalize temp dir")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, contents).expect("failed to write file");
        path
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel))
            .unwrap_or_else(|e| panic!("failed to read {rel}: {e}"))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    pub fn remove(&self, rel: &str) {
        let path = self.path(rel);
        if path.is_dir() {
            fs::remove_dir_all(path).expect("failed to remove dir");
        } else {
            fs::remove_file(path).expect("failed to remove file");
        }
    }

    /// Minimal manifest the packager can work with.
    pub fn with_package_json(self) -> Self {
        self.write(
            "package.json",
            r#"{
  "name": "demo-lib",
  "version": "1.2.3",
  "private": true,
  "scripts": { "build": "libpack build" },
  "devDependencies": { "typescript": "^5.0.0" },
  "dependencies": { "left-pad": "^1.3.0" }
}
"#,
        );
        self
    }

    /// Config builder rooted here, with `.ts` sources.
    pub fn config(&self) -> ConfigFileBuilder {
        ConfigFileBuilder::new(&self.root()).extensions(&[".ts", ".tsx"])
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            config: RawConfigFile {
                root: Some(root.to_path_buf()),
                ..RawConfigFile::default()
            },
        }
    }

    pub fn src_dir(mut self, dir: &str) -> Self {
        self.config.src_dir = Some(PathBuf::from(dir));
        self
    }

    pub fn out_dir(mut self, dir: &str) -> Self {
        self.config.out_dir = Some(PathBuf::from(dir));
        self
    }

    pub fn workspace(mut self, dir: &str) -> Self {
        self.config.workspace = Some(PathBuf::from(dir));
        self
    }

    pub fn targets(mut self, targets: &[BuildTarget]) -> Self {
        self.config.targets = Some(targets.to_vec());
        self
    }

    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.config.extensions = Some(extensions.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn ignore(mut self, patterns: &[&str]) -> Self {
        self.config.ignore = Some(patterns.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn asset(mut self, pattern: &str) -> Self {
        self.config.assets.push(pattern.to_string());
        self
    }

    pub fn target_path(mut self, target: BuildTarget, path: &str) -> Self {
        self.config.lib.get_mut(target).path = Some(PathBuf::from(path));
        self
    }

    pub fn source_maps(mut self, target: BuildTarget) -> Self {
        self.config.lib.get_mut(target).source_map = Some(true);
        self
    }

    pub fn transform_command(mut self, cmd: &str) -> Self {
        self.config.transform.command = Some(cmd.to_string());
        self
    }

    pub fn types_command(mut self, cmd: &str) -> Self {
        self.config.types.command = cmd.to_string();
        self
    }

    pub fn progress(mut self, enabled: bool) -> Self {
        self.config.watch.progress = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.watch.batch_size = size;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}
