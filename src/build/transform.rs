// src/build/transform.rs

//! Pluggable source-to-output transform.
//!
//! The pipeline only depends on the [`Transform`] contract:
//! `(absolute source path, options) -> {code, map?}`. Two implementations
//! ship with the tool:
//!
//! - [`CommandTransform`] runs a user-configured shell command per file.
//! - [`CopyTransform`] passes the source through unchanged (used when no
//!   command is configured, e.g. for plain ES module sources).

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::types::BuildTarget;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-file options derived from the target's module options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub target: BuildTarget,
    pub source_maps: bool,
    pub comments: bool,
}

/// Result of transforming one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<String>,
}

impl TransformOutput {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// A source-to-output compiler for a single file.
///
/// Errors are fatal for the build generation that requested the file.
pub trait Transform: Send + Sync + std::fmt::Debug {
    fn transform<'a>(
        &'a self,
        source: &'a Path,
        options: TransformOptions,
    ) -> BoxFuture<'a, Result<TransformOutput>>;
}

/// Returns the file content unchanged.
#[derive(Debug, Clone)]
pub struct CopyTransform {
    fs: Arc<dyn FileSystem>,
}

impl CopyTransform {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl Transform for CopyTransform {
    fn transform<'a>(
        &'a self,
        source: &'a Path,
        _options: TransformOptions,
    ) -> BoxFuture<'a, Result<TransformOutput>> {
        Box::pin(async move {
            let code = self.fs.read_to_string(source)?;
            Ok(TransformOutput::code(code))
        })
    }
}

/// Runs a shell command per file and takes its stdout as the output code.
///
/// The template may use these placeholders:
///
/// - `{input}`: absolute source path
/// - `{target}`: `esm` or `cjs`
/// - `{map}`: path the command should write a source map to (only
///   substituted when source maps are enabled; empty otherwise)
///
/// The same values are exported as `LIBPACK_TARGET`, `LIBPACK_SOURCE_MAPS`
/// and `LIBPACK_COMMENTS` for commands that prefer the environment.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    template: String,
    cwd: Option<std::path::PathBuf>,
}

impl CommandTransform {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            cwd: None,
        }
    }

    /// Run the command from `dir` (normally the package root).
    pub fn with_cwd(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    fn render(&self, source: &Path, target: BuildTarget, map_path: Option<&Path>) -> String {
        let map = map_path
            .map(|p| shell_quote(&p.to_string_lossy()))
            .unwrap_or_default();
        self.template
            .replace("{input}", &shell_quote(&source.to_string_lossy()))
            .replace("{target}", target.as_str())
            .replace("{map}", &map)
    }

    async fn run(&self, source: &Path, options: TransformOptions) -> Result<TransformOutput> {
        let wants_map = options.source_maps && self.template.contains("{map}");
        let map_file = if wants_map {
            Some(
                tempfile::Builder::new()
                    .prefix("libpack-")
                    .suffix(".map")
                    .tempfile()
                    .context("creating temporary source map file")?,
            )
        } else {
            None
        };

        let command_line = self.render(source, options.target, map_file.as_ref().map(|f| f.path()));
        trace!(cmd = %command_line, "running transform command");

        let mut cmd = shell_command(&command_line);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }

        cmd.env("LIBPACK_TARGET", options.target.as_str())
            .env("LIBPACK_SOURCE_MAPS", bool_env(options.source_maps))
            .env("LIBPACK_COMMENTS", bool_env(options.comments))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("spawning transform command for {:?}", source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "transform command exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let code = String::from_utf8(output.stdout)
            .map_err(|e| anyhow!("transform output is not valid UTF-8: {e}"))?;

        let map = match map_file {
            Some(file) => {
                let contents = tokio::fs::read_to_string(file.path())
                    .await
                    .context("reading source map written by transform command")?;
                if contents.trim().is_empty() {
                    debug!(?source, "transform command wrote no source map");
                    None
                } else {
                    Some(contents)
                }
            }
            None => None,
        };

        Ok(TransformOutput { code, map })
    }
}

impl Transform for CommandTransform {
    fn transform<'a>(
        &'a self,
        source: &'a Path,
        options: TransformOptions,
    ) -> BoxFuture<'a, Result<TransformOutput>> {
        Box::pin(self.run(source, options))
    }
}

fn bool_env(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// Quote `s` for the platform shell.
pub(crate) fn shell_quote(s: &str) -> String {
    if cfg!(windows) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Build the transform described by the configuration.
pub fn transform_from_config(
    cfg: &crate::config::ConfigFile,
    fs: Arc<dyn FileSystem>,
) -> Arc<dyn Transform> {
    match cfg.transform_command {
        Some(ref command) => Arc::new(CommandTransform::new(command.clone()).with_cwd(&cfg.root)),
        None => Arc::new(CopyTransform::new(fs)),
    }
}
