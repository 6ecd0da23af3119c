// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::BuildTarget;

/// Top-level configuration as read from `libpack.toml`.
///
/// ```toml
/// src_dir = "src"
/// out_dir = "dist"
/// targets = ["esm", "cjs"]
/// extensions = [".ts", ".tsx"]
/// ignore = ["**/*.test.ts"]
/// assets = ["**/*.css"]
///
/// [lib.cjs]
/// source_map = true
/// path = "cjs"
///
/// [watch]
/// debounce_ms = 400
/// ```
///
/// All fields are optional; a missing file is equivalent to an empty one.
/// This raw form is what `serde` produces. It only becomes usable after
/// normalization into [`ConfigFile`] (see `validate.rs`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Package root. Never read from TOML; set by the loader.
    #[serde(skip)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub src_dir: Option<PathBuf>,

    #[serde(default)]
    pub out_dir: Option<PathBuf>,

    #[serde(default)]
    pub targets: Option<Vec<BuildTarget>>,

    #[serde(default)]
    pub extensions: Option<Vec<String>>,

    #[serde(default)]
    pub ignore: Option<Vec<String>>,

    /// Globs (relative to `src_dir`) copied verbatim into every target dir.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Explicit tsconfig path. If absent, `tsconfig.build.json` then
    /// `tsconfig.json` are looked up in the root.
    #[serde(default)]
    pub tsconfig: Option<PathBuf>,

    /// Monorepo root, relative to the package root. Searched for a tsconfig
    /// when the package has none of its own.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    #[serde(default)]
    pub lib: LibSection,

    #[serde(default)]
    pub transform: TransformSection,

    #[serde(default)]
    pub types: TypesSection,

    #[serde(default)]
    pub watch: WatchSection,
}

/// `[lib]` section: per-target module options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibSection {
    #[serde(default)]
    pub esm: ModuleSection,

    #[serde(default)]
    pub cjs: ModuleSection,
}

impl LibSection {
    pub fn get(&self, target: BuildTarget) -> &ModuleSection {
        match target {
            BuildTarget::Esm => &self.esm,
            BuildTarget::Cjs => &self.cjs,
        }
    }

    pub fn get_mut(&mut self, target: BuildTarget) -> &mut ModuleSection {
        match target {
            BuildTarget::Esm => &mut self.esm,
            BuildTarget::Cjs => &mut self.cjs,
        }
    }
}

/// `[lib.esm]` / `[lib.cjs]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSection {
    /// Keep comments in the emitted code (default `true`).
    #[serde(default)]
    pub comments: Option<bool>,

    /// Emit a `.map` file next to each output (default `false`).
    #[serde(default)]
    pub source_map: Option<bool>,

    /// Output subpath relative to `out_dir`.
    ///
    /// Defaults: `"."` for ESM (so `import x from 'lib/x'` resolves), `"cjs"`
    /// for CommonJS.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[transform]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSection {
    /// Shell command used to transpile one file. Placeholders: `{input}`,
    /// `{target}`, `{map}`. When absent, sources are copied verbatim.
    #[serde(default)]
    pub command: Option<String>,
}

/// `[types]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypesSection {
    /// Type checker invocation; `-p <tsconfig>` etc. are appended.
    #[serde(default = "default_types_command")]
    pub command: String,
}

fn default_types_command() -> String {
    "npx tsc".to_string()
}

impl Default for TypesSection {
    fn default() -> Self {
        Self {
            command: default_types_command(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Quiet period used to coalesce bursts of filesystem events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Report per-file progress. Disabling it lets files within one target
    /// be transpiled in parallel batches.
    #[serde(default = "default_progress")]
    pub progress: bool,

    /// Batch size used when progress reporting is disabled.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_progress() -> bool {
    true
}

fn default_batch_size() -> usize {
    16
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            progress: default_progress(),
            batch_size: default_batch_size(),
        }
    }
}

/// Per-target output options handed to the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleOptions {
    pub comments: bool,
    pub source_map: bool,
}

/// Fully resolved settings for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub out_dir: PathBuf,
    pub options: ModuleOptions,
}

/// Resolved `[watch]` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub debounce: Duration,
    pub progress: bool,
    pub batch_size: usize,
}

/// Normalized, validated configuration.
///
/// Every path is absolute. Construct it with `ConfigFile::try_from(raw)`
/// (which validates) or through [`crate::config::load_and_validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub root: PathBuf,
    /// Same as `root` unless a workspace is configured.
    pub workspace: PathBuf,
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    pub targets: Vec<BuildTarget>,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
    pub assets: Vec<String>,
    pub tsconfig: Option<PathBuf>,
    pub lib: BTreeMap<BuildTarget, TargetConfig>,
    pub transform_command: Option<String>,
    pub types_command: String,
    pub watch: WatchSettings,
}

impl ConfigFile {
    /// Settings for `target`. Every target in [`BuildTarget::ALL`] is
    /// resolved, enabled or not.
    pub fn target(&self, target: BuildTarget) -> &TargetConfig {
        &self.lib[&target]
    }

    pub fn output_dir(&self, target: BuildTarget) -> &Path {
        &self.target(target).out_dir
    }

    pub fn module_options(&self, target: BuildTarget) -> ModuleOptions {
        self.target(target).options
    }

    pub fn has_target(&self, target: BuildTarget) -> bool {
        self.targets.contains(&target)
    }

    /// Directory that receives generated `.d.ts` files: the ESM output when
    /// ESM is built, otherwise the CommonJS output.
    pub fn types_dir(&self) -> &Path {
        if self.has_target(BuildTarget::Esm) || !self.has_target(BuildTarget::Cjs) {
            self.output_dir(BuildTarget::Esm)
        } else {
            self.output_dir(BuildTarget::Cjs)
        }
    }
}

/// CLI-level overrides applied on top of the file before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub targets: Vec<BuildTarget>,
    pub src_dir: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub source_maps: bool,
    pub progress: Option<bool>,
}

impl ConfigOverrides {
    pub fn apply(&self, raw: &mut RawConfigFile) {
        if !self.targets.is_empty() {
            raw.targets = Some(self.targets.clone());
        }
        if let Some(ref src) = self.src_dir {
            raw.src_dir = Some(src.clone());
        }
        if let Some(ref out) = self.out_dir {
            raw.out_dir = Some(out.clone());
        }
        if self.source_maps {
            for target in BuildTarget::ALL {
                raw.lib.get_mut(target).source_map = Some(true);
            }
        }
        if let Some(progress) = self.progress {
            raw.watch.progress = progress;
        }
    }
}
