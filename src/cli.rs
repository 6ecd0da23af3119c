// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::BuildTarget;

/// Command-line arguments for `libpack`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "libpack",
    version,
    about = "Build ESM and CommonJS distribution bundles for a JavaScript/TypeScript library.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `libpack.toml` in the package root. A missing file means
    /// "use defaults".
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Package root directory.
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LIBPACK_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Suppress status lines and the progress bar.
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Clean the output directory and build every target once.
    Build(BuildArgs),

    /// Build, then rebuild whenever sources change.
    #[command(alias = "dev")]
    Watch(BuildArgs),

    /// Generate (or only check) type declarations.
    Types {
        /// Type check only, without writing declaration files.
        #[arg(long)]
        check: bool,
    },

    /// Write a sample `libpack.toml` into the current directory.
    Init,
}

/// Options shared by `build` and `watch`.
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Build only these targets (repeatable). Default: all configured.
    #[arg(long = "target", value_name = "TARGET", value_parser = parse_target)]
    pub targets: Vec<BuildTarget>,

    /// Source directory, relative to the package root.
    #[arg(long, value_name = "DIR")]
    pub src_dir: Option<PathBuf>,

    /// Output directory, relative to the package root.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Emit source maps for every target.
    #[arg(long)]
    pub source_maps: bool,

    /// Also emit type declarations (`build` only).
    #[arg(long)]
    pub types: bool,

    /// Show a progress bar (serializes work within a target).
    #[arg(long)]
    pub progress: bool,

    /// Disable the progress bar and transpile files in parallel batches.
    #[arg(long, conflicts_with = "progress")]
    pub no_progress: bool,

    /// Parse + validate config, print the plan, but don't build anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl BuildArgs {
    /// `Some(true|false)` when the user chose explicitly, `None` otherwise.
    pub fn progress_override(&self) -> Option<bool> {
        if self.progress {
            Some(true)
        } else if self.no_progress {
            Some(false)
        } else {
            None
        }
    }
}

fn parse_target(s: &str) -> Result<BuildTarget, String> {
    s.parse()
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
