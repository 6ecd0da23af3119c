// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use globset::Glob;

use crate::config::model::{
    ConfigFile, ModuleOptions, RawConfigFile, TargetConfig, WatchSettings,
};
use crate::errors::{LibpackError, Result};
use crate::types::BuildTarget;

/// Ignore globs applied when the config does not provide its own list.
pub const DEFAULT_IGNORE: &[&str] = &[
    "**/*.test.js",
    "**/*.test.ts",
    "**/*.test.tsx",
    "**/*.spec.ts",
    "**/*.spec.tsx",
    "**/*.d.ts",
];

const TSCONFIG_CANDIDATES: &[&str] = &["tsconfig.build.json", "tsconfig.json"];

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LibpackError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let root = match raw.root {
            Some(ref root) => root.clone(),
            None => std::env::current_dir()?,
        };
        if !root.is_dir() {
            return Err(LibpackError::ConfigError(format!(
                "package root {:?} does not exist",
                root
            )));
        }
        // Watcher events carry resolved paths; keep every configured path
        // comparable with them.
        let root = root.canonicalize()?;

        let workspace = resolve_workspace(&root, raw.workspace.as_deref())?;
        let tsconfig = resolve_tsconfig(&root, &workspace, raw.tsconfig.as_deref())?;
        let extensions = resolve_extensions(raw.extensions.clone(), tsconfig.is_some())?;
        let targets = resolve_targets(raw.targets.clone())?;

        let ignore = raw
            .ignore
            .clone()
            .unwrap_or_else(|| DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect());
        validate_globs("ignore", &ignore)?;
        validate_globs("assets", &raw.assets)?;

        let src_dir = normalize(&root.join(raw.src_dir.as_deref().unwrap_or(Path::new("src"))));
        let out_dir = normalize(&root.join(raw.out_dir.as_deref().unwrap_or(Path::new("dist"))));

        let mut lib = BTreeMap::new();
        for target in BuildTarget::ALL {
            let section = raw.lib.get(target);
            let default_path = match target {
                BuildTarget::Esm => Path::new("."),
                BuildTarget::Cjs => Path::new("cjs"),
            };
            let sub = section.path.as_deref().unwrap_or(default_path);
            lib.insert(
                target,
                TargetConfig {
                    out_dir: normalize(&out_dir.join(sub)),
                    options: ModuleOptions {
                        comments: section.comments.unwrap_or(true),
                        source_map: section.source_map.unwrap_or(false),
                    },
                },
            );
        }
        validate_output_root(&root, &src_dir, &out_dir)?;
        for target in &targets {
            validate_output_root(&root, &src_dir, &lib[target].out_dir)?;
        }
        validate_output_dirs(&targets, &lib)?;

        let watch = validate_watch(&raw)?;

        Ok(ConfigFile {
            root,
            workspace,
            src_dir,
            out_dir,
            targets,
            extensions,
            ignore,
            assets: raw.assets,
            tsconfig,
            lib,
            transform_command: raw.transform.command.filter(|c| !c.trim().is_empty()),
            types_command: raw.types.command,
            watch,
        })
    }
}

/// Monorepo root; defaults to the package root.
fn resolve_workspace(root: &Path, configured: Option<&Path>) -> Result<PathBuf> {
    let Some(path) = configured else {
        return Ok(root.to_path_buf());
    };
    let path = root.join(path);
    if !path.is_dir() {
        return Err(LibpackError::ConfigError(format!(
            "provided workspace path {:?} does not exist",
            path
        )));
    }
    Ok(path.canonicalize()?)
}

/// An explicit path wins; otherwise the package root is searched, then the
/// workspace.
fn resolve_tsconfig(
    root: &Path,
    workspace: &Path,
    explicit: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        let path = root.join(path);
        if !path.is_file() {
            return Err(LibpackError::ConfigError(format!(
                "provided tsconfig path {:?} does not exist",
                path
            )));
        }
        return Ok(Some(path));
    }

    let find_in = |dir: &Path| {
        TSCONFIG_CANDIDATES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
    };
    Ok(find_in(root).or_else(|| {
        if workspace == root {
            None
        } else {
            find_in(workspace)
        }
    }))
}

fn resolve_extensions(configured: Option<Vec<String>>, has_tsconfig: bool) -> Result<Vec<String>> {
    let extensions = match configured {
        Some(exts) if exts.is_empty() => {
            return Err(LibpackError::ConfigError(
                "`extensions` can't be an empty list; remove it or list at least one extension"
                    .to_string(),
            ));
        }
        Some(exts) => exts,
        None if has_tsconfig => vec![".ts".to_string(), ".tsx".to_string()],
        None => vec![".js".to_string(), ".jsx".to_string()],
    };

    Ok(extensions
        .into_iter()
        .map(|e| {
            let e = e.trim();
            if e.starts_with('.') {
                e.to_string()
            } else {
                format!(".{e}")
            }
        })
        .collect())
}

fn resolve_targets(configured: Option<Vec<BuildTarget>>) -> Result<Vec<BuildTarget>> {
    let targets = configured.unwrap_or_else(|| BuildTarget::ALL.to_vec());
    if targets.is_empty() {
        return Err(LibpackError::ConfigError(
            "`targets` must list at least one of \"esm\", \"cjs\"".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for t in &targets {
        if !seen.insert(*t) {
            return Err(LibpackError::ConfigError(format!(
                "target '{t}' is listed more than once in `targets`"
            )));
        }
    }
    Ok(targets)
}

fn validate_globs(field: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        Glob::new(pattern).map_err(|e| {
            LibpackError::ConfigError(format!("invalid glob in `{field}`: {pattern:?} ({e})"))
        })?;
    }
    Ok(())
}

/// The output tree is wiped before every `build`, and anything written under
/// `src_dir` would be picked up as a source on the next run.
fn validate_output_root(root: &Path, src_dir: &Path, out_dir: &Path) -> Result<()> {
    let problem = if root.starts_with(out_dir) {
        Some("contains the package root")
    } else if src_dir.starts_with(out_dir) {
        Some("contains the source directory")
    } else if out_dir.starts_with(src_dir) {
        Some("is inside the source directory")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(LibpackError::ConfigError(format!(
            "output directory {:?} {problem}; point `out_dir` (or `lib.<target>.path`) somewhere else",
            out_dir
        ))),
        None => Ok(()),
    }
}

/// Two enabled targets writing into the same directory would silently
/// overwrite each other's files. Nested directories are fine (the default
/// layout puts CommonJS under the ESM root).
fn validate_output_dirs(
    targets: &[BuildTarget],
    lib: &BTreeMap<BuildTarget, TargetConfig>,
) -> Result<()> {
    for (i, a) in targets.iter().enumerate() {
        for b in targets.iter().skip(i + 1) {
            if lib[a].out_dir == lib[b].out_dir {
                return Err(LibpackError::ConfigError(format!(
                    "targets '{a}' and '{b}' share the output directory {:?}; give each target its own `lib.<target>.path`",
                    lib[a].out_dir
                )));
            }
        }
    }
    Ok(())
}

fn validate_watch(raw: &RawConfigFile) -> Result<WatchSettings> {
    if raw.watch.batch_size == 0 {
        return Err(LibpackError::ConfigError(
            "[watch].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.watch.debounce_ms == 0 {
        return Err(LibpackError::ConfigError(
            "[watch].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(WatchSettings {
        debounce: Duration::from_millis(raw.watch.debounce_ms),
        progress: raw.watch.progress,
        batch_size: raw.watch.batch_size,
    })
}

/// Lexically resolve `.` and `..` so that equal directories compare equal.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
