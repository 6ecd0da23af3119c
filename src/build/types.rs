// src/build/types.rs

//! Type declaration emission through an external type checker.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::build::clean::remove_build_info_files;
use crate::build::transform::{shell_command, shell_quote, BoxFuture};
use crate::config::ConfigFile;
use crate::errors::{LibpackError, Result};
use crate::fs::{walk_files, FileSystem};

/// Whether declarations are written or only checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypesMode {
    Emit,
    Check,
}

/// One type checker error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// `None` for project-level errors (bad tsconfig, missing lib, ...).
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            Some(ref file) => write!(
                f,
                "{}:{}:{} - error {}: {}",
                file.display(),
                self.line,
                self.column,
                self.code,
                self.message
            ),
            None => write!(f, "error {}: {}", self.code, self.message),
        }
    }
}

/// Every diagnostic from one type checker run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
}

static DIAGNOSTIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\((\d+),(\d+)\): error (TS\d+): (.*)$").expect("invalid diagnostic regex")
});

static GLOBAL_DIAGNOSTIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^error (TS\d+): (.*)$").expect("invalid diagnostic regex"));

impl Diagnostics {
    /// Parse `tsc --pretty false` output. Lines that don't start a
    /// diagnostic are appended to the previous message.
    pub fn parse(output: &str) -> Self {
        let mut items: Vec<Diagnostic> = Vec::new();

        for line in output.lines() {
            let trimmed = line.trim_end();
            if let Some(caps) = DIAGNOSTIC_RE.captures(trimmed) {
                items.push(Diagnostic {
                    file: Some(PathBuf::from(&caps[1])),
                    line: caps[2].parse().unwrap_or(0),
                    column: caps[3].parse().unwrap_or(0),
                    code: caps[4].to_string(),
                    message: caps[5].to_string(),
                });
            } else if let Some(caps) = GLOBAL_DIAGNOSTIC_RE.captures(trimmed) {
                items.push(Diagnostic {
                    file: None,
                    line: 0,
                    column: 0,
                    code: caps[1].to_string(),
                    message: caps[2].to_string(),
                });
            } else if !trimmed.trim().is_empty() {
                if let Some(last) = items.last_mut() {
                    last.message.push('\n');
                    last.message.push_str(trimmed.trim());
                }
            }
        }

        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Error count per file, in file order. Project-level errors are not
    /// attributed to any file.
    pub fn per_file(&self) -> BTreeMap<&Path, (usize, u32)> {
        let mut map: BTreeMap<&Path, (usize, u32)> = BTreeMap::new();
        for d in &self.items {
            if let Some(ref file) = d.file {
                let entry = map.entry(file.as_path()).or_insert((0, d.line));
                entry.0 += 1;
            }
        }
        map
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Build halted due to type errors. Fix the issues below to continue."
        )?;
        writeln!(f)?;
        for d in &self.items {
            writeln!(f, "{d}")?;
        }

        let per_file = self.per_file();
        writeln!(f)?;
        writeln!(
            f,
            "Found {} errors in {} files.",
            self.items.len(),
            per_file.len()
        )?;
        if !per_file.is_empty() {
            writeln!(f)?;
            writeln!(f, "Errors  Files")?;
            for (file, (count, first_line)) in per_file {
                writeln!(f, "{count:>6}  {}:{first_line}", file.display())?;
            }
        }
        Ok(())
    }
}

/// Produces (or checks) `.d.ts` declarations for the package.
///
/// Any diagnostic is fatal for the types step.
pub trait TypeEmitter: Send + Sync + fmt::Debug {
    fn emit<'a>(&'a self, cfg: &'a ConfigFile, mode: TypesMode) -> BoxFuture<'a, Result<()>>;
}

/// Runs the configured `tsc`-compatible command.
#[derive(Debug, Clone)]
pub struct TscTypeEmitter {
    fs: Arc<dyn FileSystem>,
}

impl TscTypeEmitter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Full command line for `mode`.
    pub fn command_line(cfg: &ConfigFile, tsconfig: &Path, mode: TypesMode) -> String {
        let mut line = format!(
            "{} -p {} --pretty false",
            cfg.types_command,
            shell_quote(&tsconfig.to_string_lossy())
        );
        match mode {
            TypesMode::Check => line.push_str(" --noEmit"),
            TypesMode::Emit => {
                line.push_str(&format!(
                    " --declaration --emitDeclarationOnly --outDir {} --rootDir {}",
                    shell_quote(&cfg.types_dir().to_string_lossy()),
                    shell_quote(&cfg.src_dir.to_string_lossy())
                ));
            }
        }
        line
    }

    async fn run(&self, cfg: &ConfigFile, mode: TypesMode) -> Result<()> {
        let Some(ref tsconfig) = cfg.tsconfig else {
            return Err(LibpackError::ConfigError(format!(
                "no tsconfig.json found in {:?}; types can't be generated without one",
                cfg.root
            )));
        };

        match mode {
            TypesMode::Emit => info!("generating types"),
            TypesMode::Check => info!("type checking"),
        }

        let command_line = Self::command_line(cfg, tsconfig, mode);
        debug!(cmd = %command_line, "running type checker");

        let mut cmd = shell_command(&command_line);
        cmd.current_dir(&cfg.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let diagnostics = Diagnostics::parse(&stdout);
        if !diagnostics.is_empty() {
            return Err(LibpackError::TypeCheckError(diagnostics));
        }
        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(LibpackError::TypeCheckError(Diagnostics {
                items: vec![Diagnostic {
                    file: None,
                    line: 0,
                    column: 0,
                    code: format!("exit {}", output.status),
                    message: detail,
                }],
            }));
        }

        if mode == TypesMode::Emit {
            let fs = Arc::clone(&self.fs);
            let types_dir = cfg.types_dir().to_path_buf();
            let root = cfg.root.clone();
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                post_process_declarations(fs.as_ref(), &types_dir)?;
                remove_build_info_files(fs.as_ref(), &root)?;
                Ok(())
            })
            .await
            .map_err(|e| LibpackError::Other(e.into()))??;
        }

        Ok(())
    }
}

impl TypeEmitter for TscTypeEmitter {
    fn emit<'a>(&'a self, cfg: &'a ConfigFile, mode: TypesMode) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(cfg, mode))
    }
}

const ASSET_IMPORT_EXTENSIONS: &[&str] = &[
    // styles and images
    "css", "svg", "jpg", "jpeg", "png", "webp", "gif", "ico", "bmp", "tiff",
    // fonts
    "woff", "woff2", "ttf", "eot", "otf",
    // media
    "mp4", "mp3", "wav", "avi", "mov", "webm",
    // other files
    "pdf", "zip", "rar", "tar", "gz", "json", "txt", "md", "yaml", "yml", "xml", "csv",
];

static ASSET_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r#"(?i)import\s+['"][^'"\n]+\.({})['"];?"#,
        ASSET_IMPORT_EXTENSIONS.join("|")
    );
    Regex::new(&pattern).expect("invalid asset import regex")
});

static BLANK_RUNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("invalid blank line regex"));

/// Remove side-effect imports of asset files from a declaration file.
///
/// Such imports are meaningful to a bundler but break consumers' type
/// checking. Runs of newlines left behind are collapsed.
pub fn strip_asset_imports(code: &str) -> String {
    let without = ASSET_IMPORT_RE.replace_all(code, "");
    BLANK_RUNS_RE.replace_all(&without, "\n").into_owned()
}

/// Apply [`strip_asset_imports`] to every `.d.ts` under `dir`.
pub fn post_process_declarations(fs: &dyn FileSystem, dir: &Path) -> anyhow::Result<usize> {
    let files = walk_files(fs, dir, |rel| rel.ends_with(".d.ts"))?;
    let mut changed = 0;
    for file in files {
        let code = fs.read_to_string(&file)?;
        let stripped = strip_asset_imports(&code);
        if stripped != code {
            fs.write(&file, stripped.as_bytes())?;
            changed += 1;
        }
    }
    debug!(changed, "post-processed declaration files");
    Ok(changed)
}
