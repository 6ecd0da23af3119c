// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::build::types::Diagnostics;

#[derive(Error, Debug)]
pub enum LibpackError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    GlobError(#[from] globset::Error),

    #[error("File watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("No source files matching {extensions:?} found in {src_dir:?}")]
    NoSourceFiles {
        src_dir: PathBuf,
        extensions: Vec<String>,
    },

    #[error("Transform failed for {path:?}: {message}")]
    TransformError { path: PathBuf, message: String },

    #[error("{0}")]
    TypeCheckError(Diagnostics),

    #[error("Packaging failed: {0}")]
    PackagingError(String),

    #[error("Worker error: {0}")]
    WorkerError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LibpackError {
    /// Errors that leave the tool in a guaranteed-to-fail state.
    ///
    /// These terminate the whole process instead of just the current build.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LibpackError::ConfigError(_) | LibpackError::NoSourceFiles { .. }
        )
    }

    /// Render the chain of underlying causes, if any, one per line.
    pub fn cause_chain(&self) -> Option<String> {
        let mut lines = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            lines.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LibpackError>;
