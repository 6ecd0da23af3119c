// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, ConfigOverrides, RawConfigFile};
use crate::errors::{LibpackError, Result};

/// File name looked up in the package root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "libpack.toml";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** normalize paths
/// or validate anything. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and normalize it against its own directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;
    raw_config.root = Some(config_root_dir(path));
    ConfigFile::try_from(raw_config)
}

/// Resolve the configuration used by the CLI.
///
/// - `root` defaults to the current working directory.
/// - `config_path` defaults to `<root>/libpack.toml`; when that default file
///   does not exist, all defaults apply. An explicit path that does not exist
///   is a configuration error.
/// - `overrides` (CLI flags) win over values from the file.
pub fn load_for_root(
    root: Option<&Path>,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ConfigFile> {
    let root = match root {
        Some(r) => r.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let mut raw = match config_path {
        Some(path) => {
            let path = root.join(path);
            if !path.is_file() {
                return Err(LibpackError::ConfigError(format!(
                    "config file {:?} does not exist",
                    path
                )));
            }
            load_from_path(&path)?
        }
        None => {
            let path = default_config_path(&root);
            if path.is_file() {
                load_from_path(&path)?
            } else {
                debug!(?path, "no config file found; using defaults");
                RawConfigFile::default()
            }
        }
    };

    raw.root = Some(root);
    overrides.apply(&mut raw);
    ConfigFile::try_from(raw)
}

/// `<root>/libpack.toml`.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(DEFAULT_CONFIG_FILE)
}

/// Directory a config file lives in; a bare file name means the current
/// working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
